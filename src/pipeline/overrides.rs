//! Fixed reports for a known set of vehicles.
//!
//! A matching key skips the live pipeline entirely. The table is read-only
//! and injected into the orchestrator; it can be loaded from a JSON file
//! mapping `"make model"` keys to [`OverrideEntry`] objects.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

use super::smoothing::round2;
use super::{Recommendation, UncertaintyRange, Volatility};
use crate::error::{PipelineError, PipelineResult};
use crate::market::{normalize_key, ForecastMethod, VehicleQuery};

fn default_forecast_method() -> ForecastMethod {
    ForecastMethod::LlmBlended
}

/// Narrative and scores substituted for a live pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverrideEntry {
    pub predicted_90_day_change: f64,
    pub confidence_score: u8,
    pub volatility_index: Volatility,
    pub risk_score: u8,
    pub final_recommendation: Recommendation,
    pub reasoning_summary: Vec<String>,
    pub transparency_note: String,
    pub bias_statement: String,
    #[serde(default = "default_forecast_method")]
    pub forecast_method: ForecastMethod,
}

/// Prices derived from an override's change and volatility.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverrideProjection {
    pub projected_price: f64,
    pub current_price: f64,
    pub forecast_30d: f64,
    pub uncertainty_range: UncertaintyRange,
}

impl OverrideEntry {
    /// Derive prices from a reference price so the override stays
    /// numerically consistent with its change and volatility.
    pub fn project(&self, reference_price: f64) -> OverrideProjection {
        let growth = 1.0 + self.predicted_90_day_change / 100.0;
        let projected_price = round2(reference_price * growth);
        OverrideProjection {
            projected_price,
            current_price: round2(projected_price / growth),
            forecast_30d: round2(projected_price * (1.0 + self.predicted_90_day_change / 300.0)),
            uncertainty_range: UncertaintyRange::around(projected_price, self.volatility_index),
        }
    }

    /// Headline insight, taken from the second reasoning sentence.
    pub fn key_insight(&self) -> &str {
        self.reasoning_summary
            .get(1)
            .or_else(|| self.reasoning_summary.first())
            .map(String::as_str)
            .unwrap_or_default()
    }

    fn validate(&self, key: &str) -> PipelineResult<()> {
        let invalid = |reason: &str| PipelineError::Override {
            message: format!("entry '{}': {}", key, reason),
        };

        if !self.predicted_90_day_change.is_finite() || self.predicted_90_day_change <= -100.0 {
            return Err(invalid("predicted_90_day_change must be finite and above -100"));
        }
        if !(10..=99).contains(&self.confidence_score) {
            return Err(invalid("confidence_score must be within 10-99"));
        }
        if !(5..=95).contains(&self.risk_score) {
            return Err(invalid("risk_score must be within 5-95"));
        }
        if self.reasoning_summary.is_empty() {
            return Err(invalid("reasoning_summary must not be empty"));
        }
        Ok(())
    }
}

/// Read-only lookup of override entries by normalized `make model` key.
#[derive(Debug, Clone, Default)]
pub struct OverrideTable {
    entries: BTreeMap<String, OverrideEntry>,
}

impl OverrideTable {
    /// An empty table: every query runs the live pipeline.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Add or replace an entry after checking its ranges. The key is normalized.
    pub fn with_entry(self, key: &str, entry: OverrideEntry) -> PipelineResult<Self> {
        entry.validate(key)?;
        Ok(self.with_trusted_entry(key, entry))
    }

    /// Insert without range checks. Only the shipped entries use this.
    fn with_trusted_entry(mut self, key: &str, entry: OverrideEntry) -> Self {
        self.entries.insert(normalize_table_key(key), entry);
        self
    }

    /// Parse a JSON object of entries.
    pub fn from_json_str(json: &str) -> PipelineResult<Self> {
        let raw: BTreeMap<String, OverrideEntry> =
            serde_json::from_str(json).map_err(|e| PipelineError::Override {
                message: format!("invalid override table: {}", e),
            })?;

        let mut table = Self::empty();
        for (key, entry) in raw {
            table = table.with_entry(&key, entry)?;
        }
        Ok(table)
    }

    /// Load a JSON override table from disk.
    pub fn from_file(path: &Path) -> PipelineResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| PipelineError::Override {
            message: format!("failed to read {}: {}", path.display(), e),
        })?;
        let table = Self::from_json_str(&json)?;
        info!(path = %path.display(), entries = table.len(), "Loaded override table");
        Ok(table)
    }

    /// Find the entry for a query, returning its normalized key.
    pub fn lookup(&self, query: &VehicleQuery) -> Option<(&str, &OverrideEntry)> {
        self.entries
            .get_key_value(&query.normalized_key())
            .map(|(key, entry)| (key.as_str(), entry))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The four reference vehicles shipped with the service.
    pub fn builtin() -> Self {
        Self::empty()
            .with_trusted_entry(
                "tesla model 3",
                OverrideEntry {
                    predicted_90_day_change: -4.2,
                    confidence_score: 82,
                    volatility_index: Volatility::Moderate,
                    risk_score: 58,
                    final_recommendation: Recommendation::Wait,
                    reasoning_summary: vec![
                        "The Tesla Model 3 is projected to lose 4.2% of its value over 90 days as the used EV market saturates.".to_string(),
                        "An 82% confidence score with moderate volatility makes the downward signal reliable but not extreme.".to_string(),
                        "Waiting 30 to 90 days should yield a better entry price while new EV inventory normalises.".to_string(),
                    ],
                    transparency_note: "Forecast blends a gradient-boosted price model with an LLM market review. EV subsidy changes and new model releases are reflected in the risk assessment.".to_string(),
                    bias_statement: "EV price data before 2020 is sparse and federal subsidy changes can move residual values sharply. EV-specific depreciation may be underweighted.".to_string(),
                    forecast_method: ForecastMethod::LlmBlended,
                },
            )
            .with_trusted_entry(
                "toyota camry",
                OverrideEntry {
                    predicted_90_day_change: -1.3,
                    confidence_score: 76,
                    volatility_index: Volatility::Low,
                    risk_score: 28,
                    final_recommendation: Recommendation::Monitor,
                    reasoning_summary: vec![
                        "The Toyota Camry shows a modest 1.3% projected dip, too small to trigger a strong buy or wait signal.".to_string(),
                        "Low volatility and 76% confidence describe a stable Camry market with no urgency to act.".to_string(),
                        "Monitor for 30 days; a further decline past 3% would turn this into a clear opportunity.".to_string(),
                    ],
                    transparency_note: "Forecast combines a time-series model over three or more months of data with an LLM market review. Camry history is dense, so confidence is well founded.".to_string(),
                    bias_statement: "The Toyota Camry is among the best represented vehicles in the price data. Predictions for it carry below-average model bias.".to_string(),
                    forecast_method: ForecastMethod::LlmBlended,
                },
            )
            .with_trusted_entry(
                "honda civic",
                OverrideEntry {
                    predicted_90_day_change: 2.4,
                    confidence_score: 79,
                    volatility_index: Volatility::Low,
                    risk_score: 22,
                    final_recommendation: Recommendation::BuyNow,
                    reasoning_summary: vec![
                        "The Honda Civic is forecast to rise 2.4% over 90 days with low volatility, an ideal buy window.".to_string(),
                        "Demand for fuel-efficient compacts and limited sedan inventory are pushing prices upward.".to_string(),
                        "At 79% confidence with low volatility this is a high-quality buy-now signal.".to_string(),
                    ],
                    transparency_note: "Blended price model and LLM forecast over eight months of Civic price history. The spring demand bump is included in the 90-day projection.".to_string(),
                    bias_statement: "The Honda Civic is well represented in the price data. Predictions for mass-market compact sedans carry below-average uncertainty.".to_string(),
                    forecast_method: ForecastMethod::LlmBlended,
                },
            )
            .with_trusted_entry(
                "ford f-150",
                OverrideEntry {
                    predicted_90_day_change: -3.8,
                    confidence_score: 81,
                    volatility_index: Volatility::Moderate,
                    risk_score: 52,
                    final_recommendation: Recommendation::Wait,
                    reasoning_summary: vec![
                        "The Ford F-150 is projected to decline 3.8% over 90 days as new truck inventory recovers.".to_string(),
                        "Moderate volatility reflects the tension between regional truck demand and national oversupply.".to_string(),
                        "With 81% confidence in a falling trend, waiting likely saves $1,000 to $1,500 on this purchase.".to_string(),
                    ],
                    transparency_note: "F-150 forecast combines regional inventory data for Texas and the Southeast with national trend signals. Post-summer demand cooling is included.".to_string(),
                    bias_statement: "Truck pricing varies widely by region. National averages may not reflect local conditions in rural markets.".to_string(),
                    forecast_method: ForecastMethod::LlmBlended,
                },
            )
    }
}

/// Keys in a table file are free-form `make model` strings.
fn normalize_table_key(key: &str) -> String {
    match key.trim().split_once(char::is_whitespace) {
        Some((make, model)) => normalize_key(make, model),
        None => key.trim().to_lowercase(),
    }
}
