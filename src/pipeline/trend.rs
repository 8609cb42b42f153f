use serde::{Deserialize, Serialize};

use super::smoothing::{bound, moving_average, round2, round_to};
use crate::market::{history_prices, PriceHistoryPoint, StatForecast, TrendDirection};

/// Absolute 30-day change (percent) at or above which a trend is strong.
pub const STRONG_TREND_PCT: f64 = 3.0;
/// Absolute 30-day change (percent) at or above which a trend is moderate.
pub const MODERATE_TREND_PCT: f64 = 1.0;

/// Short moving-average window, in months.
const SHORT_WINDOW: usize = 3;
/// Long moving-average window, in months.
const LONG_WINDOW: usize = 9;

/// How pronounced the 30-day trend is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendStrength {
    Strong,
    Moderate,
    Weak,
}

impl TrendStrength {
    /// Classify an absolute 30-day percentage change.
    pub fn classify(trend_pct_change: f64) -> Self {
        let abs_pct = trend_pct_change.abs();
        if abs_pct >= STRONG_TREND_PCT {
            TrendStrength::Strong
        } else if abs_pct >= MODERATE_TREND_PCT {
            TrendStrength::Moderate
        } else {
            TrendStrength::Weak
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TrendStrength::Strong => "strong",
            TrendStrength::Moderate => "moderate",
            TrendStrength::Weak => "weak",
        }
    }
}

/// Trend classification reported to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendData {
    pub direction: TrendDirection,
    pub strength: TrendStrength,
    /// 0-100, 50 for a flat market.
    pub momentum_score: f64,
}

/// Smoothed features of the price history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFeatures {
    pub ma_30: f64,
    pub ma_90: f64,
    /// Annualised depreciation in percent; positive means prices fell.
    pub depreciation_rate: f64,
    /// Latest price relative to the long moving average.
    pub seasonal_factor: f64,
}

/// Output of the trend stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendAnalysis {
    pub trend: TrendData,
    pub features: DataFeatures,
}

/// Converts a statistical forecast and price history into trend metrics.
///
/// Never fails: a missing history degrades every feature to a value
/// derived from the forecast itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrendDeriver;

impl TrendDeriver {
    pub fn derive(&self, stat: &StatForecast, history: &[PriceHistoryPoint]) -> TrendAnalysis {
        let trend = TrendData {
            direction: stat.trend_direction,
            strength: TrendStrength::classify(stat.trend_pct_change),
            momentum_score: momentum_score(stat.trend_pct_change),
        };

        let prices = history_prices(history);
        let latest = stat.last_known_price;

        let (ma_30, ma_90) = if prices.len() >= SHORT_WINDOW {
            let short = moving_average(&prices, SHORT_WINDOW);
            let long = moving_average(&prices, LONG_WINDOW.min(prices.len()));
            (
                round2(short.last().copied().unwrap_or_default()),
                round2(long.last().copied().unwrap_or_default()),
            )
        } else {
            (round2(stat.forecast_30d), round2(stat.forecast_90d))
        };

        let depreciation_rate = match prices.first() {
            Some(&oldest) if latest > 0.0 && prices.len() >= 2 => {
                let elapsed_years = (prices.len() as f64 / 12.0).max(1.0);
                round2((oldest - latest) / oldest / elapsed_years * 100.0)
            }
            _ => 0.0,
        };

        let seasonal_factor = if ma_90 > 0.0 {
            round_to(latest / ma_90, 3)
        } else {
            1.0
        };

        TrendAnalysis {
            trend,
            features: DataFeatures {
                ma_30,
                ma_90,
                depreciation_rate,
                seasonal_factor,
            },
        }
    }
}

/// Momentum on a 0-100 scale: five points per percent of 30-day change.
pub fn momentum_score(trend_pct_change: f64) -> f64 {
    round_to(bound(50.0 + trend_pct_change * 5.0, 0.0, 100.0), 1)
}
