//! What-if adjustments applied to a finished report.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::blend::clamp_confidence;
use super::smoothing::round2;

/// A named market shock and its effect on the forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub label: String,
    pub description: String,
    /// Added to the projected 90-day change, in percentage points.
    pub price_change_pct_delta: f64,
    /// Added to the confidence score before clamping.
    pub confidence_delta: i32,
}

impl Scenario {
    pub fn new(
        label: impl Into<String>,
        description: impl Into<String>,
        price_change_pct_delta: f64,
        confidence_delta: i32,
    ) -> Self {
        Self {
            label: label.into(),
            description: description.into(),
            price_change_pct_delta,
            confidence_delta,
        }
    }
}

/// Result of a what-if adjustment.
///
/// `label` and `description` are absent when the scenario key was unknown
/// and the baseline came back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioOutcome {
    pub price_change_pct: f64,
    pub confidence_score: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Read-only table of scenarios keyed by name.
#[derive(Debug, Clone, Default)]
pub struct ScenarioCatalog {
    scenarios: BTreeMap<String, Scenario>,
}

impl ScenarioCatalog {
    /// The four market shocks shipped with the service.
    pub fn builtin() -> Self {
        Self::default()
            .with_scenario(
                "interest_rate_hike",
                Scenario::new(
                    "Interest Rate Hike",
                    "Fed raises rates by 0.5%: reduces buyer purchasing power.",
                    -2.5,
                    -3,
                ),
            )
            .with_scenario(
                "fuel_spike",
                Scenario::new(
                    "Fuel Price Spike",
                    "Gas prices surge 30%: mild shift away from ICE vehicles.",
                    -1.8,
                    -2,
                ),
            )
            .with_scenario(
                "ev_subsidy",
                Scenario::new(
                    "EV Federal Subsidy",
                    "New $4,000 used-EV tax credit: boosts EV resale demand.",
                    1.5,
                    2,
                ),
            )
            .with_scenario(
                "supply_chain",
                Scenario::new(
                    "Supply Chain Crunch",
                    "Chip shortage cuts new car production: used prices spike.",
                    3.2,
                    -4,
                ),
            )
    }

    /// Add or replace a scenario.
    pub fn with_scenario(mut self, key: impl Into<String>, scenario: Scenario) -> Self {
        self.scenarios.insert(key.into(), scenario);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Scenario> {
        self.scenarios.get(key)
    }

    /// Scenario keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.scenarios.keys().map(String::as_str)
    }

    /// Apply a scenario to a baseline. Unknown keys return the baseline.
    pub fn apply(&self, key: &str, base_change_pct: f64, base_confidence: u8) -> ScenarioOutcome {
        match self.get(key) {
            Some(scenario) => ScenarioOutcome {
                price_change_pct: round2(base_change_pct + scenario.price_change_pct_delta),
                confidence_score: clamp_confidence(
                    i32::from(base_confidence) + scenario.confidence_delta,
                ),
                label: Some(scenario.label.clone()),
                description: Some(scenario.description.clone()),
            },
            None => ScenarioOutcome {
                price_change_pct: base_change_pct,
                confidence_score: base_confidence,
                label: None,
                description: None,
            },
        }
    }
}
