use async_trait::async_trait;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::{ForecastRefiner, Outcome, RefinementRequest};
use crate::config::Config;
use crate::langbase::{LangbaseClient, Message, PipeRequest};
use crate::market::LlmForecast;
use crate::pipeline::smoothing::format_usd;
use crate::prompts::FORECAST_REFINEMENT_PROMPT;

/// Forecast refinement through a Langbase pipe.
pub struct LangbaseForecastRefiner {
    langbase: LangbaseClient,
    pipe_name: String,
}

impl LangbaseForecastRefiner {
    pub fn new(langbase: LangbaseClient, config: &Config) -> Self {
        Self {
            langbase,
            pipe_name: config.pipes.forecast_refinement.clone(),
        }
    }

    fn build_messages(&self, request: &RefinementRequest) -> Vec<Message> {
        let query = &request.query;
        let stat = &request.stat_forecast;
        let market = &request.market_context;

        vec![
            Message::system(FORECAST_REFINEMENT_PROMPT),
            Message::user(format!(
                "Vehicle: {}\n\
                 Details: {} miles | {} condition | {}\n\
                 Current fair value: {}\n\
                 Statistical forecast: 30 days {}, 90 days {} ({})\n\
                 Trend: {} ({:+.1}% over 30 days)\n\
                 Inventory: {} | Price vs market median: {:+.1}%",
                query.display_name(),
                query.mileage,
                query.condition,
                query.region,
                format_usd(request.current_price),
                format_usd(stat.forecast_30d),
                format_usd(stat.forecast_90d),
                stat.method,
                stat.trend_direction,
                stat.trend_pct_change,
                market.inventory_trend,
                market.price_vs_median_pct,
            )),
        ]
    }
}

#[async_trait]
impl ForecastRefiner for LangbaseForecastRefiner {
    async fn refine(&self, request: &RefinementRequest) -> Outcome<LlmForecast> {
        let start = Instant::now();
        debug!(pipe = %self.pipe_name, vehicle = %request.query.display_name(), "Refining forecast");

        let pipe_request = PipeRequest::new(&self.pipe_name, self.build_messages(request));
        let response = match self.langbase.call_pipe(pipe_request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(pipe = %self.pipe_name, error = %e, "Forecast refinement unavailable");
                return Outcome::fallback(e.to_string());
            }
        };

        let value: serde_json::Value = match response.parse_completion() {
            Ok(value) => value,
            Err(e) => {
                warn!(pipe = %self.pipe_name, error = %e, "Malformed forecast refinement");
                return Outcome::fallback(e);
            }
        };

        if !value.is_object() {
            warn!(pipe = %self.pipe_name, "Forecast refinement is not a JSON object");
            return Outcome::fallback("completion is not a JSON object");
        }

        let forecast = LlmForecast::from_untrusted(&value);
        info!(
            pipe = %self.pipe_name,
            has_30d = forecast.forecast_30d.is_some(),
            has_90d = forecast.forecast_90d.is_some(),
            latency_ms = start.elapsed().as_millis(),
            "Forecast refinement completed"
        );
        Outcome::Success(forecast)
    }
}
