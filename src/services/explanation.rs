use async_trait::async_trait;
use serde::Deserialize;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::{ExplanationRequest, ExplanationWriter, Outcome};
use crate::config::Config;
use crate::langbase::{LangbaseClient, Message, PipeRequest};
use crate::pipeline::smoothing::format_usd;
use crate::prompts::EXPLANATION_PROMPT;

/// Number of sentences in a reasoning summary.
pub const SUMMARY_SENTENCES: usize = 3;

#[derive(Debug, Deserialize)]
struct ReasoningResponse {
    #[serde(default)]
    reasoning: Vec<serde_json::Value>,
}

/// Deterministic summary built only from already-validated decision fields.
pub fn fallback_summary(request: &ExplanationRequest) -> Vec<String> {
    let change = request.predicted_90_day_change;
    let direction = if change > 0.0 { "rise" } else { "fall" };
    vec![
        format!(
            "Fair market value for this {} is {}.",
            request.vehicle_name,
            format_usd(request.predicted_price)
        ),
        format!(
            "Prices are forecast to {} {:.1}% over 90 days with {}% confidence.",
            direction,
            change.abs(),
            request.confidence_score
        ),
        request.decision_rationale.clone(),
    ]
}

/// Reasoning summaries written by a Langbase pipe.
pub struct LangbaseExplanationWriter {
    langbase: LangbaseClient,
    pipe_name: String,
}

impl LangbaseExplanationWriter {
    pub fn new(langbase: LangbaseClient, config: &Config) -> Self {
        Self {
            langbase,
            pipe_name: config.pipes.explanation.clone(),
        }
    }

    fn build_messages(&self, request: &ExplanationRequest) -> Vec<Message> {
        let insight = if request.key_insight.is_empty() {
            &request.decision_rationale
        } else {
            &request.key_insight
        };

        vec![
            Message::system(EXPLANATION_PROMPT),
            Message::user(format!(
                "Vehicle: {}\n\
                 Details: {} miles | {} condition | {}\n\
                 Prediction: {} fair value\n\
                 90-day forecast: {:+.1}% change\n\
                 Confidence: {}% | Volatility: {}\n\
                 Market trend: {} | Inventory: {}\n\
                 Recommendation: {}\n\
                 Key insight: {}",
                request.vehicle_name,
                request.query.mileage,
                request.query.condition,
                request.query.region,
                format_usd(request.predicted_price),
                request.predicted_90_day_change,
                request.confidence_score,
                request.volatility_index,
                request.trend_direction,
                request.inventory_trend,
                request.final_recommendation,
                insight,
            )),
        ]
    }
}

/// Take the first three sentences of a reasoning reply.
fn summary_from_reply(reply: ReasoningResponse) -> Result<Vec<String>, String> {
    if reply.reasoning.len() < SUMMARY_SENTENCES {
        return Err(format!(
            "expected {} reasoning sentences, got {}",
            SUMMARY_SENTENCES,
            reply.reasoning.len()
        ));
    }

    Ok(reply
        .reasoning
        .into_iter()
        .take(SUMMARY_SENTENCES)
        .map(|sentence| match sentence {
            serde_json::Value::String(s) => s.trim().to_string(),
            other => other.to_string(),
        })
        .collect())
}

#[async_trait]
impl ExplanationWriter for LangbaseExplanationWriter {
    async fn explain(&self, request: &ExplanationRequest) -> Outcome<Vec<String>> {
        let start = Instant::now();
        debug!(pipe = %self.pipe_name, vehicle = %request.vehicle_name, "Writing explanation");

        let pipe_request = PipeRequest::new(&self.pipe_name, self.build_messages(request));
        let response = match self.langbase.call_pipe(pipe_request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(pipe = %self.pipe_name, error = %e, "Explanation unavailable");
                return Outcome::fallback(e.to_string());
            }
        };

        let summary = response
            .parse_completion::<ReasoningResponse>()
            .and_then(summary_from_reply);

        match summary {
            Ok(summary) => {
                info!(
                    pipe = %self.pipe_name,
                    latency_ms = start.elapsed().as_millis(),
                    "Explanation completed"
                );
                Outcome::Success(summary)
            }
            Err(e) => {
                warn!(pipe = %self.pipe_name, error = %e, "Malformed explanation");
                Outcome::fallback(e)
            }
        }
    }
}
