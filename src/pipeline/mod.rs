//! The recommendation pipeline.
//!
//! Stages run strictly in order, each a pure function of the previous
//! stage's output and the original query:
//! - [`TrendDeriver`]: trend classification and smoothed data features
//! - [`ForecastBlender`]: statistical + LLM blend and base confidence
//! - [`RiskClassifier`]: volatility tier, risk score and uncertainty band
//! - [`DecisionEngine`]: first-match rule table producing the recommendation
//!
//! [`Orchestrator`] sequences them around the external collaborators,
//! applies the [`OverrideTable`] and assembles the [`IntelligenceReport`].

mod blend;
mod decision;
mod orchestrator;
mod overrides;
mod report;
mod risk;
mod scenario;
pub mod smoothing;
mod trend;

pub use blend::*;
pub use decision::*;
pub use orchestrator::*;
pub use overrides::*;
pub use report::*;
pub use risk::*;
pub use scenario::*;
pub use trend::*;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Serialize a value to JSON for the agent log, with warning on failure.
pub(crate) fn serialize_for_log<T: Serialize>(value: &T, context: &str) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        warn!(
            error = %e,
            context = %context,
            "Failed to serialize value for agent log"
        );
        serde_json::json!({
            "serialization_error": e.to_string(),
            "context": context
        })
    })
}

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Orchestrator,
    DataLookup,
    Trend,
    Forecast,
    Risk,
    Decision,
    Explanation,
    Ethics,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Orchestrator => "orchestrator",
            PipelineStage::DataLookup => "data_lookup",
            PipelineStage::Trend => "trend",
            PipelineStage::Forecast => "forecast",
            PipelineStage::Risk => "risk",
            PipelineStage::Decision => "decision",
            PipelineStage::Explanation => "explanation",
            PipelineStage::Ethics => "ethics",
        }
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether a stage ran on live data or degraded to its default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Ok,
    Fallback,
}

/// One audit-trail record. The report carries one per stage, in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentLogEntry {
    pub stage_name: PipelineStage,
    pub status: StageStatus,
    pub message: String,
    pub structured_output: serde_json::Value,
}

impl AgentLogEntry {
    pub fn ok(stage: PipelineStage, message: impl Into<String>, output: serde_json::Value) -> Self {
        Self {
            stage_name: stage,
            status: StageStatus::Ok,
            message: message.into(),
            structured_output: output,
        }
    }

    pub fn fallback(
        stage: PipelineStage,
        message: impl Into<String>,
        output: serde_json::Value,
    ) -> Self {
        Self {
            stage_name: stage,
            status: StageStatus::Fallback,
            message: message.into(),
            structured_output: output,
        }
    }
}

/// Coarse forecast-stability tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Volatility {
    Low,
    Moderate,
    High,
}

impl Volatility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Volatility::Low => "Low",
            Volatility::Moderate => "Moderate",
            Volatility::High => "High",
        }
    }

    /// Relative half-width of the uncertainty band.
    pub fn sigma(&self) -> f64 {
        match self {
            Volatility::Low => 0.04,
            Volatility::Moderate => 0.08,
            Volatility::High => 0.14,
        }
    }

    /// Risk score before the confidence adjustment.
    pub fn risk_base(&self) -> i32 {
        match self {
            Volatility::Low => 20,
            Volatility::Moderate => 50,
            Volatility::High => 75,
        }
    }
}

impl std::fmt::Display for Volatility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Final buy/wait/monitor decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recommendation {
    #[serde(rename = "BUY NOW")]
    BuyNow,
    #[serde(rename = "WAIT")]
    Wait,
    #[serde(rename = "MONITOR")]
    Monitor,
}

impl Recommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::BuyNow => "BUY NOW",
            Recommendation::Wait => "WAIT",
            Recommendation::Monitor => "MONITOR",
        }
    }
}

impl std::fmt::Display for Recommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Symmetric price band around the projected price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UncertaintyRange {
    pub low: f64,
    pub high: f64,
}

impl UncertaintyRange {
    /// Band of `price * (1 ± sigma)`, rounded to cents.
    pub fn around(price: f64, volatility: Volatility) -> Self {
        let sigma = volatility.sigma();
        Self {
            low: smoothing::round2(price * (1.0 - sigma)),
            high: smoothing::round2(price * (1.0 + sigma)),
        }
    }
}
