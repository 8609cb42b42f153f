use serde_json::json;
use std::fmt::Display;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::{error::Elapsed, timeout};
use tracing::{debug, error, info, warn};

use super::smoothing::{format_usd, round_to};
use super::{
    serialize_for_log, AgentLogEntry, BlendedForecast, DataFeatures, Decision, DecisionEngine,
    DecisionInputs, Evidence, ForecastBlender, ForecastDetails, IntelligenceReport,
    OverrideEntry, OverrideTable, PipelineStage, RiskAssessment, RiskClassifier, TrendAnalysis,
    TrendData, TrendDeriver, TrendStrength,
};
use crate::config::PipelineConfig;
use crate::error::{AppResult, PipelineError};
use crate::market::{
    has_history, history_prices, InventoryTrend, LlmForecast, MarketContext, PriceHistoryPoint,
    StatForecast, TrendDirection, VehicleQuery,
};
use crate::services::{
    fallback_summary, Collaborators, EthicsDisclosure, EthicsRequest, ExplanationRequest,
    Outcome, RefinementRequest, StandardEthicsAdvisor, ETHICS_DISCLAIMER, SUMMARY_SENTENCES,
};

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod orchestrator_tests;

/// Runs the recommendation pipeline for one vehicle.
///
/// Holds no per-request state: every call to [`Orchestrator::evaluate`]
/// builds its report from scratch, so one instance can serve concurrent
/// requests.
pub struct Orchestrator {
    collaborators: Collaborators,
    overrides: OverrideTable,
    collaborator_timeout: Duration,
    reference_price: f64,
}

/// Collaborator outputs gathered before the numeric stages run.
struct MarketInputs {
    history: Vec<PriceHistoryPoint>,
    context: MarketContext,
    stat: StatForecast,
}

impl Orchestrator {
    pub fn new(collaborators: Collaborators, overrides: OverrideTable, config: &PipelineConfig) -> Self {
        Self {
            collaborators,
            overrides,
            collaborator_timeout: Duration::from_millis(config.collaborator_timeout_ms),
            reference_price: config.override_reference_price,
        }
    }

    /// Replace the bound on every collaborator call.
    pub fn with_collaborator_timeout(mut self, timeout: Duration) -> Self {
        self.collaborator_timeout = timeout;
        self
    }

    /// Replace the override table.
    pub fn with_overrides(mut self, overrides: OverrideTable) -> Self {
        self.overrides = overrides;
        self
    }

    /// Produce the intelligence report for a vehicle.
    ///
    /// Fails only on invalid input or an upstream fault without a numeric
    /// default (statistical forecast, price model). A failed run returns no
    /// partial report.
    pub async fn evaluate(&self, query: &VehicleQuery) -> AppResult<IntelligenceReport> {
        let start = Instant::now();
        validate(query)?;

        let vehicle_name = query.display_name();
        let mut log = vec![AgentLogEntry::ok(
            PipelineStage::Orchestrator,
            format!("Starting pipeline for {}.", vehicle_name),
            json!({
                "make": query.make,
                "model": query.model,
                "year": query.year,
                "mileage": query.mileage,
            }),
        )];

        if let Some((key, entry)) = self.overrides.lookup(query) {
            info!(vehicle = %vehicle_name, override_key = %key, "Override applied");
            log.push(AgentLogEntry::ok(
                PipelineStage::Orchestrator,
                format!("Override applied for '{}'. Skipping live pipeline.", key),
                json!({ "override_key": key }),
            ));
            return Ok(self.override_report(vehicle_name, entry, log));
        }

        let report = self.live_report(query, vehicle_name, log).await?;
        info!(
            vehicle = %report.vehicle_name,
            recommendation = %report.final_recommendation,
            confidence = report.confidence_score,
            elapsed_ms = start.elapsed().as_millis(),
            "Pipeline completed"
        );
        Ok(report)
    }

    fn override_report(
        &self,
        vehicle_name: String,
        entry: &OverrideEntry,
        agent_log: Vec<AgentLogEntry>,
    ) -> IntelligenceReport {
        let change = entry.predicted_90_day_change;
        let projection = entry.project(self.reference_price);

        IntelligenceReport {
            vehicle_name,
            predicted_90_day_change: change,
            projected_price: projection.projected_price,
            current_price: projection.current_price,
            confidence_score: entry.confidence_score,
            volatility_index: entry.volatility_index,
            risk_score: entry.risk_score,
            final_recommendation: entry.final_recommendation,
            decision_rule: None,
            decision_rationale: entry
                .reasoning_summary
                .last()
                .cloned()
                .unwrap_or_default(),
            reasoning_summary: entry.reasoning_summary.clone(),
            uncertainty_range: projection.uncertainty_range,
            transparency_note: entry.transparency_note.clone(),
            bias_statement: entry.bias_statement.clone(),
            ethics_disclaimer: ETHICS_DISCLAIMER.to_string(),
            trend_data: TrendData {
                direction: if change < 0.0 {
                    TrendDirection::Falling
                } else {
                    TrendDirection::Rising
                },
                strength: TrendStrength::Moderate,
                momentum_score: round_to(50.0 + change * 2.0, 1),
            },
            data_features: DataFeatures {
                ma_30: projection.projected_price,
                ma_90: projection.projected_price,
                depreciation_rate: 0.0,
                seasonal_factor: 1.0,
            },
            forecast: ForecastDetails {
                forecast_30d: projection.forecast_30d,
                forecast_90d: projection.projected_price,
                method: entry.forecast_method,
                key_insight: entry.key_insight().to_string(),
            },
            explanatory_factors: Vec::new(),
            evidence: None,
            agent_log,
        }
    }

    async fn live_report(
        &self,
        query: &VehicleQuery,
        vehicle_name: String,
        mut log: Vec<AgentLogEntry>,
    ) -> AppResult<IntelligenceReport> {
        // Data lookup and statistical forecast
        let inputs = self.gather(query, &vehicle_name, &mut log).await?;
        let MarketInputs {
            history,
            context,
            stat,
        } = inputs;
        let has_history = has_history(&history);

        // Trend
        let analysis = TrendDeriver.derive(&stat, &history);
        log.push(trend_entry(&stat, &analysis));

        // Forecast
        let prediction = timeout(
            self.collaborator_timeout,
            self.collaborators.predictor.predict(query),
        )
        .await;
        let prediction = self.settle("price prediction", prediction).map_err(|reason| {
            error!(vehicle = %vehicle_name, reason = %reason, "Price model failed");
            PipelineError::upstream("price_prediction", reason)
        })?;
        if !is_usable_price(prediction.predicted_price) {
            error!(
                vehicle = %vehicle_name,
                predicted_price = prediction.predicted_price,
                "Price model returned an unusable price"
            );
            return Err(PipelineError::upstream(
                "price_prediction",
                format!("unusable predicted price {}", prediction.predicted_price),
            )
            .into());
        }

        let refinement_request = RefinementRequest {
            query: query.clone(),
            current_price: prediction.predicted_price,
            stat_forecast: stat.clone(),
            market_context: context.clone(),
        };
        let refinement = self
            .bounded(
                "forecast refinement",
                self.collaborators.refiner.refine(&refinement_request),
            )
            .await;
        let (llm_forecast, refinement_fallback) = match refinement {
            Outcome::Success(forecast) => (forecast, None),
            Outcome::Fallback { reason } => {
                warn!(vehicle = %vehicle_name, reason = %reason, "Forecast refinement fell back");
                (LlmForecast::mirror_of(&stat), Some(reason))
            }
        };

        let blended = ForecastBlender.blend(&prediction, &stat, &llm_forecast);
        log.push(forecast_entry(&blended, refinement_fallback.as_deref()));

        // Risk
        let risk = RiskClassifier.assess(&blended, context.inventory_trend, has_history);
        log.push(risk_entry(&risk));

        // Decision
        let decision = DecisionEngine.decide(&DecisionInputs {
            change_pct: risk.predicted_90_day_change,
            confidence: blended.confidence_base,
            volatility: risk.volatility_index,
            price_vs_median_pct: context.price_vs_median_pct,
        });
        log.push(AgentLogEntry::ok(
            PipelineStage::Decision,
            format!(
                "Decision: {}. {}",
                decision.final_recommendation, decision.rationale
            ),
            serialize_for_log(&decision, "decision"),
        ));

        // Explanation
        let explanation_request = ExplanationRequest {
            query: query.clone(),
            vehicle_name: vehicle_name.clone(),
            predicted_price: blended.predicted_price,
            predicted_90_day_change: risk.predicted_90_day_change,
            confidence_score: blended.confidence_base,
            volatility_index: risk.volatility_index,
            final_recommendation: decision.final_recommendation,
            decision_rationale: decision.rationale.clone(),
            key_insight: llm_forecast.key_insight.clone(),
            trend_direction: analysis.trend.direction,
            inventory_trend: context.inventory_trend,
        };
        let reasoning_summary = self.explain(&explanation_request, &decision, &mut log).await;

        // Ethics
        let ethics_request = EthicsRequest {
            query: query.clone(),
            forecast_method: blended.method,
            confidence_score: blended.confidence_base,
            volatility_index: risk.volatility_index,
            has_history,
            inventory_trend: context.inventory_trend,
        };
        let disclosure = self.disclose(&ethics_request, &mut log).await;

        log.push(AgentLogEntry::ok(
            PipelineStage::Orchestrator,
            format!(
                "Pipeline complete. Final recommendation: {}.",
                decision.final_recommendation
            ),
            json!({
                "final_recommendation": decision.final_recommendation,
                "confidence_score": blended.confidence_base,
            }),
        ));

        Ok(IntelligenceReport {
            vehicle_name,
            predicted_90_day_change: risk.predicted_90_day_change,
            projected_price: blended.forecast_90d,
            current_price: blended.predicted_price,
            confidence_score: blended.confidence_base,
            volatility_index: risk.volatility_index,
            risk_score: risk.risk_score,
            final_recommendation: decision.final_recommendation,
            decision_rule: Some(decision.rule),
            decision_rationale: decision.rationale,
            reasoning_summary,
            uncertainty_range: risk.uncertainty_range,
            transparency_note: disclosure.transparency_note,
            bias_statement: disclosure.bias_statement,
            ethics_disclaimer: disclosure.disclaimer,
            trend_data: analysis.trend,
            data_features: analysis.features,
            forecast: ForecastDetails {
                forecast_30d: blended.forecast_30d,
                forecast_90d: blended.forecast_90d,
                method: blended.method,
                key_insight: llm_forecast.key_insight.clone(),
            },
            explanatory_factors: prediction.explanatory_factors.clone(),
            evidence: Some(Evidence {
                price_history: history,
                stat_forecast: stat,
                market_context: context,
                prediction,
                llm_forecast,
            }),
            agent_log: log,
        })
    }

    /// Issue the independent lookups and the statistical forecast together.
    async fn gather(
        &self,
        query: &VehicleQuery,
        vehicle_name: &str,
        log: &mut Vec<AgentLogEntry>,
    ) -> AppResult<MarketInputs> {
        let market_data = &self.collaborators.market_data;
        let limit = self.collaborator_timeout;
        let (history, context, stat) = tokio::join!(
            timeout(limit, market_data.price_history(&query.make, &query.model, query.year)),
            timeout(limit, market_data.market_context(&query.make, &query.model, query.year)),
            timeout(limit, self.collaborators.forecaster.forecast(query)),
        );

        let stat = self
            .settle("statistical forecast", stat)
            .map_err(|reason| {
                error!(vehicle = %vehicle_name, reason = %reason, "Statistical forecast failed");
                PipelineError::upstream("statistical_forecast", reason)
            })?;
        if !is_usable_price(stat.forecast_30d) || !is_usable_price(stat.forecast_90d) {
            error!(
                vehicle = %vehicle_name,
                forecast_30d = stat.forecast_30d,
                forecast_90d = stat.forecast_90d,
                "Statistical forecast returned an unusable price"
            );
            return Err(PipelineError::upstream(
                "statistical_forecast",
                format!(
                    "unusable forecast prices {} / {}",
                    stat.forecast_30d, stat.forecast_90d
                ),
            )
            .into());
        }

        let history = self
            .settle("price history lookup", history)
            .unwrap_or_else(|reason| {
                warn!(vehicle = %vehicle_name, reason = %reason, "Price history lookup failed");
                vec![PriceHistoryPoint::missing(reason)]
            });
        let (context, context_gap) = match self.settle("market context lookup", context) {
            Ok(context) if context.inventory_trend == InventoryTrend::Unknown => {
                (context, Some("no inventory signal"))
            }
            Ok(context) => (context, None),
            Err(reason) => {
                warn!(vehicle = %vehicle_name, reason = %reason, "Market context lookup failed");
                (MarketContext::default(), Some("market context unavailable"))
            }
        };

        let months = history_prices(&history).len();
        let output = json!({
            "n_months": months,
            "inventory_count": context.current_inventory_count,
            "inventory_trend": context.inventory_trend,
            "price_vs_median": context.price_vs_median_pct,
        });
        let entry = if !has_history(&history) {
            AgentLogEntry::fallback(
                PipelineStage::DataLookup,
                format!(
                    "No price history found for {}; using market-wide fallback.",
                    vehicle_name
                ),
                output,
            )
        } else if let Some(gap) = context_gap {
            AgentLogEntry::fallback(
                PipelineStage::DataLookup,
                format!(
                    "Retrieved {} months of price history for {}; {}.",
                    months, vehicle_name, gap
                ),
                output,
            )
        } else {
            AgentLogEntry::ok(
                PipelineStage::DataLookup,
                format!(
                    "Retrieved {} months of price history for {}.",
                    months, vehicle_name
                ),
                output,
            )
        };
        debug!(vehicle = %vehicle_name, months, status = ?entry.status, "Data lookup completed");
        log.push(entry);

        Ok(MarketInputs {
            history,
            context,
            stat,
        })
    }

    async fn explain(
        &self,
        request: &ExplanationRequest,
        decision: &Decision,
        log: &mut Vec<AgentLogEntry>,
    ) -> Vec<String> {
        let outcome = match self
            .bounded("explanation", self.collaborators.explainer.explain(request))
            .await
        {
            Outcome::Success(summary) if !is_complete_summary(&summary) => {
                Outcome::fallback(format!(
                    "expected {} non-empty reasoning sentences, got {}",
                    SUMMARY_SENTENCES,
                    summary.iter().filter(|s| !s.trim().is_empty()).count()
                ))
            }
            outcome => outcome,
        };

        match outcome {
            Outcome::Success(summary) => {
                log.push(AgentLogEntry::ok(
                    PipelineStage::Explanation,
                    format!(
                        "Generated {}-sentence reasoning for {} recommendation.",
                        summary.len(),
                        decision.final_recommendation
                    ),
                    json!({ "reasoning_summary": summary }),
                ));
                summary
            }
            Outcome::Fallback { reason } => {
                warn!(vehicle = %request.vehicle_name, reason = %reason, "Explanation fell back");
                let summary = fallback_summary(request);
                log.push(AgentLogEntry::fallback(
                    PipelineStage::Explanation,
                    format!(
                        "Explanation unavailable ({}); used template reasoning for {} recommendation.",
                        reason, decision.final_recommendation
                    ),
                    json!({ "reasoning_summary": summary }),
                ));
                summary
            }
        }
    }

    async fn disclose(
        &self,
        request: &EthicsRequest,
        log: &mut Vec<AgentLogEntry>,
    ) -> EthicsDisclosure {
        let outcome = self
            .bounded("ethics disclosure", self.collaborators.ethics.disclose(request))
            .await;

        match outcome {
            Outcome::Success(disclosure) => {
                log.push(AgentLogEntry::ok(
                    PipelineStage::Ethics,
                    format!("Disclosure attached for {} forecast.", request.forecast_method),
                    serialize_for_log(&disclosure, "ethics"),
                ));
                disclosure
            }
            Outcome::Fallback { reason } => {
                warn!(reason = %reason, "Ethics disclosure fell back");
                let disclosure = StandardEthicsAdvisor.disclosure(request);
                log.push(AgentLogEntry::fallback(
                    PipelineStage::Ethics,
                    format!("Disclosure unavailable ({}); used standard statements.", reason),
                    serialize_for_log(&disclosure, "ethics"),
                ));
                disclosure
            }
        }
    }

    /// Await an LLM-backed call, degrading to a fallback once the bound passes.
    async fn bounded<T>(&self, what: &str, call: impl Future<Output = Outcome<T>>) -> Outcome<T> {
        match timeout(self.collaborator_timeout, call).await {
            Ok(outcome) => outcome,
            Err(_) => Outcome::fallback(self.timed_out(what)),
        }
    }

    /// Flatten a bounded fallible call into its value or a failure reason.
    fn settle<T, E: Display>(
        &self,
        what: &str,
        result: Result<Result<T, E>, Elapsed>,
    ) -> Result<T, String> {
        match result {
            Ok(inner) => inner.map_err(|e| e.to_string()),
            Err(_) => Err(self.timed_out(what)),
        }
    }

    fn timed_out(&self, what: &str) -> String {
        format!(
            "{} timed out after {}ms",
            what,
            self.collaborator_timeout.as_millis()
        )
    }
}

fn is_usable_price(price: f64) -> bool {
    price.is_finite() && price >= 0.0
}

fn is_complete_summary(summary: &[String]) -> bool {
    summary.len() == SUMMARY_SENTENCES && summary.iter().all(|s| !s.trim().is_empty())
}

fn validate(query: &VehicleQuery) -> AppResult<()> {
    for (field, value) in [("make", &query.make), ("model", &query.model)] {
        if value.trim().is_empty() {
            return Err(PipelineError::InvalidInput {
                field: field.to_string(),
                reason: "must not be empty".to_string(),
            }
            .into());
        }
    }
    Ok(())
}

fn trend_entry(stat: &StatForecast, analysis: &TrendAnalysis) -> AgentLogEntry {
    AgentLogEntry::ok(
        PipelineStage::Trend,
        format!(
            "Forecast method: {}. Trend: {} ({:+.1}% / 30d). Momentum score: {}/100.",
            stat.method,
            analysis.trend.direction,
            stat.trend_pct_change,
            analysis.trend.momentum_score
        ),
        serialize_for_log(analysis, "trend"),
    )
}

fn forecast_entry(blended: &BlendedForecast, refinement_fallback: Option<&str>) -> AgentLogEntry {
    let message = format!(
        "Price model: {}. Blended 30d: {} / 90d: {} ({}). Base confidence: {}.",
        format_usd(blended.predicted_price),
        format_usd(blended.forecast_30d),
        format_usd(blended.forecast_90d),
        blended.method,
        blended.confidence_base
    );
    let output = serialize_for_log(blended, "forecast");

    match refinement_fallback {
        None => AgentLogEntry::ok(PipelineStage::Forecast, message, output),
        Some(reason) => AgentLogEntry::fallback(
            PipelineStage::Forecast,
            format!("{} Refinement unavailable: {}.", message, reason),
            output,
        ),
    }
}

fn risk_entry(risk: &RiskAssessment) -> AgentLogEntry {
    AgentLogEntry::ok(
        PipelineStage::Risk,
        format!(
            "Volatility: {}. Risk score: {}/100. 90d change: {:+.1}%. Uncertainty range: {} to {}.",
            risk.volatility_index,
            risk.risk_score,
            risk.predicted_90_day_change,
            format_usd(risk.uncertainty_range.low),
            format_usd(risk.uncertainty_range.high)
        ),
        serialize_for_log(risk, "risk"),
    )
}
