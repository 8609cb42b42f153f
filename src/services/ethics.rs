use async_trait::async_trait;

use super::{EthicsAdvisor, EthicsDisclosure, EthicsRequest, Outcome};
use crate::market::{ForecastMethod, InventoryTrend};

/// Disclaimer attached to every report.
pub const ETHICS_DISCLAIMER: &str = "This report is informational and is not financial advice. \
Forecasts are estimates from historical market data and can be wrong. Confirm prices against \
local listings and get an independent inspection before buying.";

fn method_description(method: ForecastMethod) -> &'static str {
    match method {
        ForecastMethod::Prophet => "a Prophet time-series model",
        ForecastMethod::LlmBlended => "a statistical forecast blended with an LLM market review",
        ForecastMethod::Linear => "a linear trend over monthly price history",
        ForecastMethod::Statistical => "a statistical time-series model",
        ForecastMethod::MarketAvg => "the market-wide average price trend",
        ForecastMethod::IndustryDefault => "an industry-standard depreciation curve",
        ForecastMethod::Unknown => "an unrecognised forecasting method",
    }
}

/// Rule-based disclosure built from the report's own signals.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardEthicsAdvisor;

impl StandardEthicsAdvisor {
    pub fn disclosure(&self, request: &EthicsRequest) -> EthicsDisclosure {
        let transparency_note = format!(
            "Forecast for the {} uses {}. Confidence is {}% with {} volatility.",
            request.query.display_name(),
            method_description(request.forecast_method),
            request.confidence_score,
            request.volatility_index.as_str().to_lowercase(),
        );

        let history = if request.has_history {
            "The forecast draws on this vehicle's own monthly price history."
        } else {
            "No price history exists for this vehicle, so the forecast relies on market-wide \
             data and may miss model-specific demand."
        };
        let inventory = match request.inventory_trend {
            InventoryTrend::Unknown => {
                " Inventory signals are unavailable, so supply shifts may not be reflected."
                    .to_string()
            }
            trend => format!(" Listed inventory is currently {}.", trend),
        };

        EthicsDisclosure {
            transparency_note,
            bias_statement: format!("{}{}", history, inventory),
            disclaimer: ETHICS_DISCLAIMER.to_string(),
        }
    }
}

#[async_trait]
impl EthicsAdvisor for StandardEthicsAdvisor {
    async fn disclose(&self, request: &EthicsRequest) -> Outcome<EthicsDisclosure> {
        Outcome::Success(self.disclosure(request))
    }
}
