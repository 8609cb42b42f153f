use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error};

use super::{MarketDataSource, PricePredictor};
use crate::error::{AppResult, PipelineError};
use crate::market::{history_prices, PriceFactor, PricePrediction, VehicleQuery, DEFAULT_MILEAGE};
use crate::pipeline::smoothing::{bound, round2};

/// Percent of value gained or lost per 10,000 miles from the baseline.
const MILEAGE_PCT_PER_10K: f64 = 1.0;
/// Largest mileage adjustment, in percent.
const MAX_MILEAGE_PCT: f64 = 20.0;

/// Price multiplier for a condition label. Unrecognised labels count as good.
pub fn condition_multiplier(condition: &str) -> f64 {
    match condition.trim().to_lowercase().as_str() {
        "excellent" | "like new" | "new" => 1.08,
        "fair" => 0.90,
        "poor" => 0.78,
        "salvage" => 0.55,
        _ => 1.0,
    }
}

/// Signed mileage adjustment in percent, capped at twenty either way.
pub fn mileage_adjustment_pct(mileage: u32) -> f64 {
    let deviation = f64::from(mileage) - f64::from(DEFAULT_MILEAGE);
    bound(
        -deviation / 10_000.0 * MILEAGE_PCT_PER_10K,
        -MAX_MILEAGE_PCT,
        MAX_MILEAGE_PCT,
    )
}

/// Fair value from the latest comparable average price.
///
/// Uses the vehicle's own latest monthly average, else the latest
/// market-wide average, adjusted for condition and mileage.
pub struct ComparablesPredictor {
    market_data: Arc<dyn MarketDataSource>,
}

impl ComparablesPredictor {
    pub fn new(market_data: Arc<dyn MarketDataSource>) -> Self {
        Self { market_data }
    }

    async fn baseline(&self, query: &VehicleQuery) -> AppResult<Option<(f64, &'static str)>> {
        let history = self
            .market_data
            .price_history(&query.make, &query.model, query.year)
            .await?;
        if let Some(&price) = history_prices(&history).last() {
            return Ok(Some((price, "vehicle_history")));
        }

        let market = self.market_data.market_wide_history().await?;
        Ok(market
            .iter()
            .rev()
            .filter_map(|p| p.avg_price)
            .find(|p| p.is_finite() && *p > 0.0)
            .map(|price| (price, "market_average")))
    }
}

#[async_trait]
impl PricePredictor for ComparablesPredictor {
    async fn predict(&self, query: &VehicleQuery) -> AppResult<PricePrediction> {
        let Some((base, source)) = self.baseline(query).await? else {
            error!(vehicle = %query.display_name(), "No comparable prices for valuation");
            return Err(PipelineError::upstream(
                "price_prediction",
                format!("no comparable prices for {}", query.display_name()),
            )
            .into());
        };

        let condition_impact = base * (condition_multiplier(&query.condition) - 1.0);
        let mileage_impact = base * mileage_adjustment_pct(query.mileage) / 100.0;
        let predicted_price = round2(base + condition_impact + mileage_impact);

        debug!(
            base,
            source,
            predicted_price,
            "Comparable valuation completed"
        );

        Ok(PricePrediction {
            predicted_price,
            explanatory_factors: vec![
                PriceFactor {
                    feature: format!("condition: {}", query.condition.trim().to_lowercase()),
                    impact: round2(condition_impact),
                },
                PriceFactor {
                    feature: format!("mileage: {}", query.mileage),
                    impact: round2(mileage_impact),
                },
            ],
        })
    }
}
