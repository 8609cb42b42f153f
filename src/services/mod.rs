//! External collaborators consumed by the pipeline.
//!
//! Each collaborator is a trait object so the orchestrator can be driven by
//! the SQLite store and Langbase pipes in production, and by stubs in tests.
//! LLM-backed collaborators return an [`Outcome`] instead of an error: a
//! failed call is a fallback for the pipeline, never a fault.

mod ethics;
mod explanation;
mod forecaster;
mod pricing;
mod refinement;

pub use ethics::{StandardEthicsAdvisor, ETHICS_DISCLAIMER};
pub use explanation::{fallback_summary, LangbaseExplanationWriter, SUMMARY_SENTENCES};
pub use forecaster::HistoryForecaster;
pub use pricing::ComparablesPredictor;
pub use refinement::LangbaseForecastRefiner;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::Config;
use crate::error::{AppResult, StorageResult};
use crate::langbase::LangbaseClient;
use crate::market::{
    ForecastMethod, InventoryTrend, LlmForecast, MarketContext, PriceHistoryPoint, PricePoint,
    PricePrediction, StatForecast, TrendDirection, VehicleQuery,
};
use crate::pipeline::{Recommendation, Volatility};
use crate::storage::SqliteStorage;

/// Result of an LLM-backed collaborator call.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    /// The collaborator produced a usable payload.
    Success(T),
    /// The collaborator failed or replied with something unusable.
    Fallback { reason: String },
}

impl<T> Outcome<T> {
    pub fn fallback(reason: impl Into<String>) -> Self {
        Outcome::Fallback {
            reason: reason.into(),
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Outcome::Fallback { .. })
    }
}

/// Historical price and market lookups.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Monthly price history for a vehicle, oldest first.
    async fn price_history(
        &self,
        make: &str,
        model: &str,
        year: i32,
    ) -> StorageResult<Vec<PriceHistoryPoint>>;

    /// Latest market snapshot for a vehicle.
    async fn market_context(&self, make: &str, model: &str, year: i32)
        -> StorageResult<MarketContext>;

    /// Monthly average price across every vehicle, oldest first.
    async fn market_wide_history(&self) -> StorageResult<Vec<PricePoint>>;
}

/// Statistical time-series forecaster.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StatisticalForecaster: Send + Sync {
    async fn forecast(&self, query: &VehicleQuery) -> AppResult<StatForecast>;
}

/// Price model for the vehicle's current fair value.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PricePredictor: Send + Sync {
    async fn predict(&self, query: &VehicleQuery) -> AppResult<PricePrediction>;
}

/// Everything the forecast refinement sees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementRequest {
    pub query: VehicleQuery,
    pub current_price: f64,
    pub stat_forecast: StatForecast,
    pub market_context: MarketContext,
}

/// LLM review of the statistical forecast.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ForecastRefiner: Send + Sync {
    async fn refine(&self, request: &RefinementRequest) -> Outcome<LlmForecast>;
}

/// Decision fields summarised by the explanation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplanationRequest {
    pub query: VehicleQuery,
    pub vehicle_name: String,
    pub predicted_price: f64,
    pub predicted_90_day_change: f64,
    pub confidence_score: u8,
    pub volatility_index: Volatility,
    pub final_recommendation: Recommendation,
    pub decision_rationale: String,
    pub key_insight: String,
    pub trend_direction: TrendDirection,
    pub inventory_trend: InventoryTrend,
}

/// Three-sentence reasoning summary writer.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExplanationWriter: Send + Sync {
    async fn explain(&self, request: &ExplanationRequest) -> Outcome<Vec<String>>;
}

/// Inputs of the ethics disclosure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EthicsRequest {
    pub query: VehicleQuery,
    pub forecast_method: ForecastMethod,
    pub confidence_score: u8,
    pub volatility_index: Volatility,
    pub has_history: bool,
    pub inventory_trend: InventoryTrend,
}

/// Transparency and bias statements attached to every report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EthicsDisclosure {
    pub transparency_note: String,
    pub bias_statement: String,
    pub disclaimer: String,
}

/// Ethics disclosure writer.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EthicsAdvisor: Send + Sync {
    async fn disclose(&self, request: &EthicsRequest) -> Outcome<EthicsDisclosure>;
}

/// The full set of collaborators injected into the orchestrator.
#[derive(Clone)]
pub struct Collaborators {
    pub market_data: Arc<dyn MarketDataSource>,
    pub forecaster: Arc<dyn StatisticalForecaster>,
    pub predictor: Arc<dyn PricePredictor>,
    pub refiner: Arc<dyn ForecastRefiner>,
    pub explainer: Arc<dyn ExplanationWriter>,
    pub ethics: Arc<dyn EthicsAdvisor>,
}

impl Collaborators {
    /// Production wiring: SQLite-backed data, forecaster and price model,
    /// Langbase-backed refinement and explanation.
    pub fn production(storage: SqliteStorage, langbase: LangbaseClient, config: &Config) -> Self {
        let market_data: Arc<dyn MarketDataSource> = Arc::new(storage);
        let reference_price = config.pipeline.override_reference_price;

        Self {
            forecaster: Arc::new(HistoryForecaster::new(
                Arc::clone(&market_data),
                reference_price,
            )),
            predictor: Arc::new(ComparablesPredictor::new(Arc::clone(&market_data))),
            refiner: Arc::new(LangbaseForecastRefiner::new(langbase.clone(), config)),
            explainer: Arc::new(LangbaseExplanationWriter::new(langbase, config)),
            ethics: Arc::new(StandardEthicsAdvisor),
            market_data,
        }
    }
}
