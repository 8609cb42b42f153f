//! The intelligence report and its legacy-compatible projection.
//!
//! [`IntelligenceReport`] is the single source of truth. Consumers written
//! against the older schema read [`LegacyView`], which is derived from the
//! report in one place and never computed independently.

use serde::{Deserialize, Serialize};

use super::{
    AgentLogEntry, DataFeatures, DecisionRule, Recommendation, ScenarioCatalog, ScenarioOutcome,
    TrendData, UncertaintyRange, Volatility,
};
use crate::market::{
    ForecastMethod, LlmForecast, MarketContext, PriceFactor, PriceHistoryPoint, PricePrediction,
    StatForecast,
};

/// Confidence at or above which the legacy label is HIGH.
pub const HIGH_CONFIDENCE: u8 = 75;
/// Confidence at or above which the legacy label is MODERATE.
pub const MODERATE_CONFIDENCE: u8 = 55;

/// Forecast values the report was built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastDetails {
    pub forecast_30d: f64,
    pub forecast_90d: f64,
    pub method: ForecastMethod,
    /// Headline insight of the LLM refinement, empty when unavailable.
    pub key_insight: String,
}

/// Raw collaborator outputs behind a live report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub price_history: Vec<PriceHistoryPoint>,
    pub stat_forecast: StatForecast,
    pub market_context: MarketContext,
    pub prediction: PricePrediction,
    pub llm_forecast: LlmForecast,
}

/// Structured buy/wait/monitor recommendation for one vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntelligenceReport {
    pub vehicle_name: String,
    pub predicted_90_day_change: f64,
    pub projected_price: f64,
    pub current_price: f64,
    pub confidence_score: u8,
    pub volatility_index: Volatility,
    pub risk_score: u8,
    pub final_recommendation: Recommendation,
    /// Rule that fired; absent for override reports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision_rule: Option<DecisionRule>,
    pub decision_rationale: String,
    pub reasoning_summary: Vec<String>,
    pub uncertainty_range: UncertaintyRange,
    pub transparency_note: String,
    pub bias_statement: String,
    pub ethics_disclaimer: String,
    pub trend_data: TrendData,
    pub data_features: DataFeatures,
    pub forecast: ForecastDetails,
    pub explanatory_factors: Vec<PriceFactor>,
    /// Present for live reports only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<Evidence>,
    pub agent_log: Vec<AgentLogEntry>,
}

impl IntelligenceReport {
    /// Legacy-named projection of this report.
    pub fn legacy(&self) -> LegacyView {
        LegacyView::from_report(self)
    }

    /// Current and legacy fields as one flat JSON object.
    pub fn to_wire(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(WireReport {
            current: self,
            legacy: self.legacy(),
        })
    }

    /// Apply a what-if scenario to this report's change and confidence.
    pub fn what_if(&self, catalog: &ScenarioCatalog, key: &str) -> ScenarioOutcome {
        catalog.apply(key, self.predicted_90_day_change, self.confidence_score)
    }
}

#[derive(Serialize)]
struct WireReport<'a> {
    #[serde(flatten)]
    current: &'a IntelligenceReport,
    #[serde(flatten)]
    legacy: LegacyView,
}

/// Three-way legacy recommendation vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LegacyRecommendation {
    Buy,
    Wait,
    Neutral,
}

impl From<Recommendation> for LegacyRecommendation {
    fn from(recommendation: Recommendation) -> Self {
        match recommendation {
            Recommendation::BuyNow => LegacyRecommendation::Buy,
            Recommendation::Wait => LegacyRecommendation::Wait,
            Recommendation::Monitor => LegacyRecommendation::Neutral,
        }
    }
}

/// Three-tier legacy confidence label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConfidenceTier {
    High,
    Moderate,
    Low,
}

impl ConfidenceTier {
    pub fn from_score(confidence: u8) -> Self {
        if confidence >= HIGH_CONFIDENCE {
            ConfidenceTier::High
        } else if confidence >= MODERATE_CONFIDENCE {
            ConfidenceTier::Moderate
        } else {
            ConfidenceTier::Low
        }
    }
}

/// Price model output under its legacy name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyPrediction {
    pub predicted_price: f64,
    pub shap_factors: Vec<PriceFactor>,
}

/// Final decision under legacy names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesizedRecommendation {
    pub recommendation: LegacyRecommendation,
    pub confidence: ConfidenceTier,
    pub rationale: String,
    pub predicted_price: f64,
    pub forecast_30d: f64,
    pub forecast_90d: f64,
}

/// Collaborator outputs keyed by their legacy tool names. Empty for
/// override reports.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolOutputs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub get_price_history: Option<Vec<PriceHistoryPoint>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_forecast: Option<StatForecast>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub get_market_context: Option<MarketContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_price_prediction: Option<LegacyPrediction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_llm_price_analysis: Option<LlmForecast>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synthesize_recommendation: Option<SynthesizedRecommendation>,
}

/// Fields of the older report schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyView {
    pub recommendation: LegacyRecommendation,
    pub confidence: ConfidenceTier,
    pub explanation: String,
    pub predicted_price: f64,
    pub forecast_30d: f64,
    pub forecast_90d: f64,
    pub forecast_method: ForecastMethod,
    pub llm_key_insight: String,
    pub tool_outputs: ToolOutputs,
    pub shap_factors: Vec<PriceFactor>,
}

impl LegacyView {
    /// The only mapping from the canonical report to legacy names.
    pub fn from_report(report: &IntelligenceReport) -> Self {
        let recommendation = LegacyRecommendation::from(report.final_recommendation);
        let confidence = ConfidenceTier::from_score(report.confidence_score);

        let tool_outputs = match &report.evidence {
            Some(evidence) => ToolOutputs {
                get_price_history: Some(evidence.price_history.clone()),
                run_forecast: Some(evidence.stat_forecast.clone()),
                get_market_context: Some(evidence.market_context.clone()),
                run_price_prediction: Some(LegacyPrediction {
                    predicted_price: report.current_price,
                    shap_factors: evidence.prediction.explanatory_factors.clone(),
                }),
                run_llm_price_analysis: Some(evidence.llm_forecast.clone()),
                synthesize_recommendation: Some(SynthesizedRecommendation {
                    recommendation,
                    confidence,
                    rationale: report.decision_rationale.clone(),
                    predicted_price: report.current_price,
                    forecast_30d: report.forecast.forecast_30d,
                    forecast_90d: report.projected_price,
                }),
            },
            None => ToolOutputs::default(),
        };

        Self {
            recommendation,
            confidence,
            explanation: report.reasoning_summary.join(" "),
            predicted_price: report.current_price,
            forecast_30d: report.forecast.forecast_30d,
            forecast_90d: report.projected_price,
            forecast_method: report.forecast.method,
            llm_key_insight: report.forecast.key_insight.clone(),
            tool_outputs,
            shap_factors: report.explanatory_factors.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{InventoryTrend, TrendDirection};
    use crate::pipeline::{PipelineStage, TrendStrength};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn report(recommendation: Recommendation, confidence: u8) -> IntelligenceReport {
        IntelligenceReport {
            vehicle_name: "2020 Mazda Cx-5".to_string(),
            predicted_90_day_change: -1.5,
            projected_price: 19700.0,
            current_price: 20000.0,
            confidence_score: confidence,
            volatility_index: Volatility::Low,
            risk_score: 12,
            final_recommendation: recommendation,
            decision_rule: Some(DecisionRule::NoSignal),
            decision_rationale: "No strong buy or sell signal.".to_string(),
            reasoning_summary: vec![
                "First.".to_string(),
                "Second.".to_string(),
                "Third.".to_string(),
            ],
            uncertainty_range: UncertaintyRange::around(19700.0, Volatility::Low),
            transparency_note: "note".to_string(),
            bias_statement: "bias".to_string(),
            ethics_disclaimer: "disclaimer".to_string(),
            trend_data: TrendData {
                direction: TrendDirection::Falling,
                strength: TrendStrength::Weak,
                momentum_score: 47.5,
            },
            data_features: DataFeatures {
                ma_30: 20000.0,
                ma_90: 20100.0,
                depreciation_rate: 3.1,
                seasonal_factor: 0.995,
            },
            forecast: ForecastDetails {
                forecast_30d: 19900.0,
                forecast_90d: 19700.0,
                method: ForecastMethod::Linear,
                key_insight: "Inventory is building.".to_string(),
            },
            explanatory_factors: vec![PriceFactor {
                feature: "mileage".to_string(),
                impact: -400.0,
            }],
            evidence: None,
            agent_log: vec![AgentLogEntry::ok(
                PipelineStage::Orchestrator,
                "start",
                json!({}),
            )],
        }
    }

    #[test]
    fn test_legacy_recommendation_mapping() {
        assert_eq!(
            LegacyRecommendation::from(Recommendation::BuyNow),
            LegacyRecommendation::Buy
        );
        assert_eq!(
            LegacyRecommendation::from(Recommendation::Wait),
            LegacyRecommendation::Wait
        );
        assert_eq!(
            LegacyRecommendation::from(Recommendation::Monitor),
            LegacyRecommendation::Neutral
        );
    }

    #[test]
    fn test_confidence_tiers() {
        assert_eq!(ConfidenceTier::from_score(75), ConfidenceTier::High);
        assert_eq!(ConfidenceTier::from_score(74), ConfidenceTier::Moderate);
        assert_eq!(ConfidenceTier::from_score(55), ConfidenceTier::Moderate);
        assert_eq!(ConfidenceTier::from_score(54), ConfidenceTier::Low);
    }

    #[test]
    fn test_legacy_view_reads_canonical_fields() {
        let legacy = report(Recommendation::Monitor, 76).legacy();
        assert_eq!(legacy.recommendation, LegacyRecommendation::Neutral);
        assert_eq!(legacy.confidence, ConfidenceTier::High);
        assert_eq!(legacy.explanation, "First. Second. Third.");
        assert_eq!(legacy.predicted_price, 20000.0);
        assert_eq!(legacy.forecast_90d, 19700.0);
        assert_eq!(legacy.llm_key_insight, "Inventory is building.");
        assert_eq!(legacy.tool_outputs, ToolOutputs::default());
    }

    #[test]
    fn test_tool_outputs_built_from_evidence() {
        let mut r = report(Recommendation::BuyNow, 60);
        r.evidence = Some(Evidence {
            price_history: vec![PriceHistoryPoint::missing("none")],
            stat_forecast: StatForecast {
                forecast_30d: 19900.0,
                forecast_90d: 19700.0,
                trend_direction: TrendDirection::Falling,
                trend_pct_change: -0.5,
                trend_pct_90d: -1.5,
                method: ForecastMethod::Linear,
                last_known_price: 20000.0,
            },
            market_context: MarketContext {
                current_inventory_count: 40,
                inventory_trend: InventoryTrend::Rising,
                price_vs_median_pct: -2.0,
            },
            prediction: PricePrediction {
                predicted_price: 20000.0,
                explanatory_factors: vec![],
            },
            llm_forecast: LlmForecast::default(),
        });

        let legacy = r.legacy();
        let synthesized = legacy.tool_outputs.synthesize_recommendation.unwrap();
        assert_eq!(synthesized.recommendation, LegacyRecommendation::Buy);
        assert_eq!(synthesized.confidence, ConfidenceTier::Moderate);
        assert_eq!(synthesized.forecast_90d, r.projected_price);
        assert!(legacy.tool_outputs.get_price_history.is_some());
    }

    #[test]
    fn test_wire_carries_both_schemas() {
        let wire = report(Recommendation::Wait, 82).to_wire().unwrap();
        assert_eq!(wire["final_recommendation"], "WAIT");
        assert_eq!(wire["recommendation"], "WAIT");
        assert_eq!(wire["confidence_score"], 82);
        assert_eq!(wire["confidence"], "HIGH");
        assert_eq!(wire["current_price"], wire["predicted_price"]);
        assert_eq!(wire["projected_price"], wire["forecast_90d"]);
        assert_eq!(wire["forecast_method"], "linear");
        assert_eq!(wire["tool_outputs"], json!({}));
        assert_eq!(wire["shap_factors"][0]["feature"], "mileage");
        assert!(wire.get("evidence").is_none());
    }

    #[test]
    fn test_what_if_uses_report_baseline() {
        let r = report(Recommendation::Monitor, 76);
        let outcome = r.what_if(&ScenarioCatalog::builtin(), "fuel_spike");
        assert_eq!(outcome.price_change_pct, -3.3);
        assert_eq!(outcome.confidence_score, 74);
    }
}
