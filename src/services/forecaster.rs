use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::{MarketDataSource, StatisticalForecaster};
use crate::error::AppResult;
use crate::market::{history_prices, ForecastMethod, StatForecast, TrendDirection, VehicleQuery};
use crate::pipeline::smoothing::{linear_slope, round2};

/// Vehicle history needed for a per-vehicle trend line.
const MIN_VEHICLE_POINTS: usize = 3;
/// Market-wide history needed for a market trend line.
const MIN_MARKET_POINTS: usize = 2;
/// Monthly depreciation assumed when no data exists, as a fraction.
const INDUSTRY_MONTHLY_CHANGE: f64 = -0.01;
/// Absolute 30-day change (percent) within which the trend is stable.
const STABLE_BAND_PCT: f64 = 0.5;
/// Forecasts never drop below this price.
const PRICE_FLOOR: f64 = 1.0;

/// Trend-line forecaster over stored monthly prices.
///
/// Falls back from the vehicle's own history to the market-wide series,
/// then to a fixed industry depreciation from the reference price.
pub struct HistoryForecaster {
    market_data: Arc<dyn MarketDataSource>,
    reference_price: f64,
}

impl HistoryForecaster {
    pub fn new(market_data: Arc<dyn MarketDataSource>, reference_price: f64) -> Self {
        Self {
            market_data,
            reference_price,
        }
    }
}

#[async_trait]
impl StatisticalForecaster for HistoryForecaster {
    async fn forecast(&self, query: &VehicleQuery) -> AppResult<StatForecast> {
        let history = self
            .market_data
            .price_history(&query.make, &query.model, query.year)
            .await?;
        let prices = history_prices(&history);
        let last_known = prices.last().copied();

        if prices.len() >= MIN_VEHICLE_POINTS {
            let latest = last_known.unwrap_or_default();
            debug!(points = prices.len(), "Forecasting from vehicle history");
            return Ok(project(
                latest,
                linear_slope(&prices),
                ForecastMethod::Linear,
                latest,
            ));
        }

        let market: Vec<f64> = self
            .market_data
            .market_wide_history()
            .await?
            .into_iter()
            .filter_map(|p| p.avg_price)
            .filter(|p| p.is_finite() && *p > 0.0)
            .collect();

        match market.last() {
            Some(&market_latest) if market.len() >= MIN_MARKET_POINTS => {
                let base = last_known.unwrap_or(market_latest);
                let monthly_change = linear_slope(&market) / market_latest;
                debug!(points = market.len(), "Forecasting from market-wide history");
                Ok(project(
                    base,
                    base * monthly_change,
                    ForecastMethod::MarketAvg,
                    last_known.unwrap_or_default(),
                ))
            }
            _ => {
                let base = last_known.unwrap_or(self.reference_price);
                debug!(base, "Forecasting with industry default depreciation");
                Ok(project(
                    base,
                    base * INDUSTRY_MONTHLY_CHANGE,
                    ForecastMethod::IndustryDefault,
                    last_known.unwrap_or_default(),
                ))
            }
        }
    }
}

/// Extend a monthly slope one and three months past `base`.
fn project(base: f64, monthly_slope: f64, method: ForecastMethod, last_known: f64) -> StatForecast {
    let forecast_30d = (base + monthly_slope).max(PRICE_FLOOR);
    let forecast_90d = (base + 3.0 * monthly_slope).max(PRICE_FLOOR);

    let pct = |target: f64| {
        if base > 0.0 {
            round2((target - base) / base * 100.0)
        } else {
            0.0
        }
    };
    let trend_pct_change = pct(forecast_30d);

    let trend_direction = if trend_pct_change > STABLE_BAND_PCT {
        TrendDirection::Rising
    } else if trend_pct_change < -STABLE_BAND_PCT {
        TrendDirection::Falling
    } else {
        TrendDirection::Stable
    };

    StatForecast {
        forecast_30d: round2(forecast_30d),
        forecast_90d: round2(forecast_90d),
        trend_direction,
        trend_pct_change,
        trend_pct_90d: pct(forecast_90d),
        method,
        last_known_price: round2(last_known),
    }
}
