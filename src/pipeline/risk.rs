use serde::{Deserialize, Serialize};

use super::smoothing::round2;
use super::{BlendedForecast, UncertaintyRange, Volatility};
use crate::market::InventoryTrend;

/// Absolute 90-day change (percent) above which volatility is High.
pub const HIGH_VOLATILITY_PCT: f64 = 5.0;
/// Absolute 90-day change (percent) above which volatility is Moderate.
pub const MODERATE_VOLATILITY_PCT: f64 = 2.0;

/// Largest reduction a confident forecast applies to the risk score.
const MAX_CONFIDENCE_REDUCTION: f64 = 15.0;

pub const MIN_RISK_SCORE: i32 = 5;
pub const MAX_RISK_SCORE: i32 = 95;

/// Output of the risk stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub volatility_index: Volatility,
    pub risk_score: u8,
    pub uncertainty_range: UncertaintyRange,
    pub predicted_90_day_change: f64,
}

/// Classifies volatility and derives the risk score and uncertainty band.
#[derive(Debug, Clone, Copy, Default)]
pub struct RiskClassifier;

impl RiskClassifier {
    pub fn assess(
        &self,
        blended: &BlendedForecast,
        inventory_trend: InventoryTrend,
        has_history: bool,
    ) -> RiskAssessment {
        let change_pct = change_pct(blended.predicted_price, blended.forecast_90d);
        let volatility = classify_volatility(change_pct, inventory_trend, has_history);

        let projected = if blended.forecast_90d > 0.0 {
            blended.forecast_90d
        } else {
            blended.predicted_price.max(0.0)
        };

        RiskAssessment {
            volatility_index: volatility,
            risk_score: risk_score(volatility, blended.confidence_base),
            uncertainty_range: UncertaintyRange::around(projected, volatility),
            predicted_90_day_change: change_pct,
        }
    }
}

/// Percentage change from `predicted_price` to `forecast_90d`, 0 without a price.
pub fn change_pct(predicted_price: f64, forecast_90d: f64) -> f64 {
    if predicted_price > 0.0 {
        round2((forecast_90d - predicted_price) / predicted_price * 100.0)
    } else {
        0.0
    }
}

/// Volatility tier. Checks run in order: missing history and large moves
/// force High before the Moderate conditions are considered.
pub fn classify_volatility(
    change_pct: f64,
    inventory_trend: InventoryTrend,
    has_history: bool,
) -> Volatility {
    let abs_change = change_pct.abs();
    if !has_history || abs_change > HIGH_VOLATILITY_PCT {
        Volatility::High
    } else if abs_change > MODERATE_VOLATILITY_PCT || inventory_trend == InventoryTrend::Unknown {
        Volatility::Moderate
    } else {
        Volatility::Low
    }
}

/// Tier base minus up to fifteen points for confidence above 50.
pub fn risk_score(volatility: Volatility, confidence: u8) -> u8 {
    let reduction =
        ((f64::from(confidence) - 50.0) / 50.0 * MAX_CONFIDENCE_REDUCTION).round_ties_even() as i32;
    (volatility.risk_base() - reduction).clamp(MIN_RISK_SCORE, MAX_RISK_SCORE) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::ForecastMethod;

    fn blended(predicted: f64, f90: f64, confidence: u8) -> BlendedForecast {
        BlendedForecast {
            predicted_price: predicted,
            forecast_30d: predicted,
            forecast_90d: f90,
            method: ForecastMethod::Linear,
            confidence_base: confidence,
        }
    }

    #[test]
    fn test_change_pct() {
        assert_eq!(change_pct(20000.0, 20500.0), 2.5);
        assert_eq!(change_pct(20000.0, 19160.0), -4.2);
        assert_eq!(change_pct(0.0, 20000.0), 0.0);
        assert_eq!(change_pct(-10.0, 20000.0), 0.0);
    }

    #[test]
    fn test_volatility_boundaries_are_strict() {
        let known = InventoryTrend::Stable;
        assert_eq!(classify_volatility(5.0, known, true), Volatility::Moderate);
        assert_eq!(classify_volatility(-5.01, known, true), Volatility::High);
        assert_eq!(classify_volatility(2.0, known, true), Volatility::Low);
        assert_eq!(classify_volatility(-2.01, known, true), Volatility::Moderate);
    }

    #[test]
    fn test_volatility_missing_signals() {
        assert_eq!(
            classify_volatility(0.0, InventoryTrend::Stable, false),
            Volatility::High
        );
        assert_eq!(
            classify_volatility(0.5, InventoryTrend::Unknown, true),
            Volatility::Moderate
        );
    }

    #[test]
    fn test_risk_score() {
        // reduction round(24/50*15) = round(7.2) = 7
        assert_eq!(risk_score(Volatility::Moderate, 74), 43);
        // reduction round(-40/50*15) = -12
        assert_eq!(risk_score(Volatility::High, 10), 87);
        // reduction 14.7 rounds to 15
        assert_eq!(risk_score(Volatility::Low, 99), 5);
        assert_eq!(risk_score(Volatility::Low, 50), 20);
    }

    #[test]
    fn test_risk_score_rounds_halves_to_even() {
        // (55 - 50) / 50 * 15 = 1.5
        assert_eq!(risk_score(Volatility::Moderate, 55), 48);
        // (65 - 50) / 50 * 15 = 4.5
        assert_eq!(risk_score(Volatility::Moderate, 65), 46);
    }

    #[test]
    fn test_uncertainty_band_uses_forecast_when_positive() {
        let risk = RiskClassifier.assess(
            &blended(20000.0, 20300.0, 80),
            InventoryTrend::Stable,
            true,
        );
        assert_eq!(risk.volatility_index, Volatility::Low);
        assert_eq!(risk.uncertainty_range.low, 19488.0);
        assert_eq!(risk.uncertainty_range.high, 21112.0);
    }

    #[test]
    fn test_uncertainty_band_falls_back_to_predicted_price() {
        let risk = RiskClassifier.assess(
            &blended(20000.0, 0.0, 70),
            InventoryTrend::Rising,
            true,
        );
        // 0 forecast is a -100% move
        assert_eq!(risk.volatility_index, Volatility::High);
        assert_eq!(risk.uncertainty_range.low, 17200.0);
        assert_eq!(risk.uncertainty_range.high, 22800.0);
    }

    #[test]
    fn test_bounds_hold_across_inputs() {
        for confidence in [10u8, 40, 55, 75, 99] {
            for (predicted, f90) in [(20000.0, 26000.0), (0.0, 0.0), (15000.0, 14000.0)] {
                for has_history in [true, false] {
                    let risk = RiskClassifier.assess(
                        &blended(predicted, f90, confidence),
                        InventoryTrend::Unknown,
                        has_history,
                    );
                    assert!((5..=95).contains(&risk.risk_score));
                    assert!(risk.uncertainty_range.low <= risk.uncertainty_range.high);
                }
            }
        }
    }
}
