use serde::{Deserialize, Serialize};

use super::smoothing::round2;
use crate::market::{ForecastMethod, LlmForecast, PricePrediction, StatForecast};

/// Weight of the statistical forecast in the blended 30-day value.
pub const STAT_WEIGHT_30D: f64 = 0.4;
/// Weight of the statistical forecast in the blended 90-day value.
pub const STAT_WEIGHT_90D: f64 = 0.3;

/// Confidence shift when the LLM agrees (or disagrees) with the trend direction.
const AGREEMENT_ADJUSTMENT: i32 = 5;
/// Confidence bonus for a near-term buy window.
const NEAR_TERM_BONUS: i32 = 3;

pub const MIN_CONFIDENCE: u8 = 10;
pub const MAX_CONFIDENCE: u8 = 99;

/// Base confidence for each statistical method.
pub fn base_confidence(method: ForecastMethod) -> i32 {
    match method {
        ForecastMethod::Prophet => 80,
        ForecastMethod::LlmBlended => 78,
        ForecastMethod::Statistical => 75,
        ForecastMethod::Linear => 72,
        ForecastMethod::MarketAvg => 68,
        ForecastMethod::IndustryDefault => 58,
        ForecastMethod::Unknown => 65,
    }
}

/// Clamp a signed confidence value into the reportable range.
pub fn clamp_confidence(value: i32) -> u8 {
    value.clamp(MIN_CONFIDENCE as i32, MAX_CONFIDENCE as i32) as u8
}

/// Combined statistical + LLM forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlendedForecast {
    pub predicted_price: f64,
    pub forecast_30d: f64,
    pub forecast_90d: f64,
    pub method: ForecastMethod,
    pub confidence_base: u8,
}

/// Blends the statistical forecast with the LLM refinement.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForecastBlender;

impl ForecastBlender {
    pub fn blend(
        &self,
        prediction: &PricePrediction,
        stat: &StatForecast,
        llm: &LlmForecast,
    ) -> BlendedForecast {
        let (forecast_30d, forecast_90d, method) = match llm.forecast_30d {
            Some(llm_30d) if stat.forecast_30d > 0.0 => {
                let llm_90d = llm.forecast_90d.unwrap_or(stat.forecast_90d);
                (
                    STAT_WEIGHT_30D * stat.forecast_30d + (1.0 - STAT_WEIGHT_30D) * llm_30d,
                    STAT_WEIGHT_90D * stat.forecast_90d + (1.0 - STAT_WEIGHT_90D) * llm_90d,
                    ForecastMethod::LlmBlended,
                )
            }
            _ => (stat.forecast_30d, stat.forecast_90d, stat.method),
        };

        BlendedForecast {
            predicted_price: round2(prediction.predicted_price),
            forecast_30d: round2(forecast_30d),
            forecast_90d: round2(forecast_90d),
            method,
            confidence_base: blended_confidence(stat, llm),
        }
    }
}

/// Base confidence of the statistical method, adjusted by LLM agreement.
///
/// A refinement without a direction counts as agreeing.
pub fn blended_confidence(stat: &StatForecast, llm: &LlmForecast) -> u8 {
    let mut confidence = base_confidence(stat.method);

    let llm_direction = llm.trend_direction.unwrap_or(stat.trend_direction);
    if llm_direction == stat.trend_direction {
        confidence += AGREEMENT_ADJUSTMENT;
    } else {
        confidence -= AGREEMENT_ADJUSTMENT;
    }

    if llm.best_time_to_buy.is_near_term() {
        confidence += NEAR_TERM_BONUS;
    }

    clamp_confidence(confidence)
}
