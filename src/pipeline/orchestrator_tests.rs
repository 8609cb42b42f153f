//! Unit tests for the pipeline orchestrator.
//!
//! Collaborators are mockall mocks; a mock with no expectations panics
//! when called, which doubles as a "never invoked" assertion.

use super::*;
use crate::error::{AppError, StorageError};
use crate::market::{BestTimeToBuy, ForecastMethod, InventoryTrend, PricePoint, PricePrediction};
use crate::pipeline::{DecisionRule, Recommendation, StageStatus, Volatility};
use crate::services::{
    MockEthicsAdvisor, MockExplanationWriter, MockForecastRefiner, MockMarketDataSource,
    MockPricePredictor, MockStatisticalForecaster,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use std::sync::Arc;

// ============================================================================
// Fixtures
// ============================================================================

fn history() -> Vec<PriceHistoryPoint> {
    [20400.0, 20300.0, 20100.0, 20000.0]
        .iter()
        .enumerate()
        .map(|(i, &price)| {
            PriceHistoryPoint::Month(PricePoint {
                period: NaiveDate::from_ymd_opt(2024, 1 + i as u32, 1).unwrap(),
                avg_price: Some(price),
                listing_count: 30,
            })
        })
        .collect()
}

fn stat_forecast() -> StatForecast {
    StatForecast {
        forecast_30d: 19800.0,
        forecast_90d: 19400.0,
        trend_direction: TrendDirection::Falling,
        trend_pct_change: -1.0,
        trend_pct_90d: -3.0,
        method: ForecastMethod::Linear,
        last_known_price: 20000.0,
    }
}

fn llm_forecast() -> LlmForecast {
    LlmForecast {
        forecast_30d: Some(19600.0),
        forecast_90d: Some(18800.0),
        trend_direction: Some(TrendDirection::Falling),
        key_insight: "Dealer inventory is building.".to_string(),
        best_time_to_buy: BestTimeToBuy::Neutral,
    }
}

fn market_data() -> MockMarketDataSource {
    let mut mock = MockMarketDataSource::new();
    mock.expect_price_history().returning(|_, _, _| Ok(history()));
    mock.expect_market_context().returning(|_, _, _| {
        Ok(MarketContext {
            current_inventory_count: 85,
            inventory_trend: InventoryTrend::Rising,
            price_vs_median_pct: -2.0,
        })
    });
    mock
}

fn forecaster() -> MockStatisticalForecaster {
    let mut mock = MockStatisticalForecaster::new();
    mock.expect_forecast().returning(|_| Ok(stat_forecast()));
    mock
}

fn predictor() -> MockPricePredictor {
    let mut mock = MockPricePredictor::new();
    mock.expect_predict().returning(|_| {
        Ok(PricePrediction {
            predicted_price: 20000.0,
            explanatory_factors: vec![crate::market::PriceFactor {
                feature: "mileage: 50000".to_string(),
                impact: 0.0,
            }],
        })
    });
    mock
}

fn refiner() -> MockForecastRefiner {
    let mut mock = MockForecastRefiner::new();
    mock.expect_refine()
        .returning(|_| Outcome::Success(llm_forecast()));
    mock
}

fn explainer() -> MockExplanationWriter {
    let mut mock = MockExplanationWriter::new();
    mock.expect_explain().returning(|request| {
        Outcome::Success(vec![
            format!("{} is overpriced today.", request.vehicle_name),
            "Inventory keeps building.".to_string(),
            "Waiting should pay off.".to_string(),
        ])
    });
    mock
}

fn live_collaborators() -> Collaborators {
    Collaborators {
        market_data: Arc::new(market_data()),
        forecaster: Arc::new(forecaster()),
        predictor: Arc::new(predictor()),
        refiner: Arc::new(refiner()),
        explainer: Arc::new(explainer()),
        ethics: Arc::new(StandardEthicsAdvisor),
    }
}

fn untouched_collaborators() -> Collaborators {
    Collaborators {
        market_data: Arc::new(MockMarketDataSource::new()),
        forecaster: Arc::new(MockStatisticalForecaster::new()),
        predictor: Arc::new(MockPricePredictor::new()),
        refiner: Arc::new(MockForecastRefiner::new()),
        explainer: Arc::new(MockExplanationWriter::new()),
        ethics: Arc::new(MockEthicsAdvisor::new()),
    }
}

fn orchestrator(collaborators: Collaborators) -> Orchestrator {
    Orchestrator::new(collaborators, OverrideTable::empty(), &PipelineConfig::default())
}

fn query() -> VehicleQuery {
    VehicleQuery::new("mazda", "cx-5", 2020)
}

fn stages(report: &IntelligenceReport) -> Vec<(PipelineStage, StageStatus)> {
    report
        .agent_log
        .iter()
        .map(|entry| (entry.stage_name, entry.status))
        .collect()
}

/// Refiner that never answers within any reasonable bound.
struct StalledRefiner;

#[async_trait]
impl crate::services::ForecastRefiner for StalledRefiner {
    async fn refine(&self, _request: &RefinementRequest) -> Outcome<LlmForecast> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Outcome::Success(llm_forecast())
    }
}

/// Price model that never answers within any reasonable bound.
struct StalledPredictor;

#[async_trait]
impl crate::services::PricePredictor for StalledPredictor {
    async fn predict(&self, _query: &VehicleQuery) -> AppResult<PricePrediction> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(PricePrediction {
            predicted_price: 20000.0,
            explanatory_factors: vec![],
        })
    }
}

// ============================================================================
// Live pipeline
// ============================================================================

#[tokio::test]
async fn test_live_pipeline_runs_every_stage_in_order() {
    let report = orchestrator(live_collaborators())
        .evaluate(&query())
        .await
        .unwrap();

    assert_eq!(
        stages(&report),
        vec![
            (PipelineStage::Orchestrator, StageStatus::Ok),
            (PipelineStage::DataLookup, StageStatus::Ok),
            (PipelineStage::Trend, StageStatus::Ok),
            (PipelineStage::Forecast, StageStatus::Ok),
            (PipelineStage::Risk, StageStatus::Ok),
            (PipelineStage::Decision, StageStatus::Ok),
            (PipelineStage::Explanation, StageStatus::Ok),
            (PipelineStage::Ethics, StageStatus::Ok),
            (PipelineStage::Orchestrator, StageStatus::Ok),
        ]
    );
    assert_eq!(report.agent_log[0].message, "Starting pipeline for 2020 Mazda Cx-5.");
    assert_eq!(
        report.agent_log[8].message,
        "Pipeline complete. Final recommendation: WAIT."
    );
}

#[tokio::test]
async fn test_live_pipeline_numbers() {
    let report = orchestrator(live_collaborators())
        .evaluate(&query())
        .await
        .unwrap();

    // 0.4 * 19800 + 0.6 * 19600 and 0.3 * 19400 + 0.7 * 18800
    assert_eq!(report.forecast.forecast_30d, 19680.0);
    assert_eq!(report.projected_price, 18980.0);
    assert_eq!(report.forecast.method, ForecastMethod::LlmBlended);
    assert_eq!(report.current_price, 20000.0);
    assert_eq!(report.predicted_90_day_change, -5.1);
    // linear base 72, agreeing direction +5
    assert_eq!(report.confidence_score, 77);
    assert_eq!(report.volatility_index, Volatility::High);
    assert_eq!(report.risk_score, 67);
    assert_eq!(report.uncertainty_range.low, 16322.8);
    assert_eq!(report.uncertainty_range.high, 21637.2);
    assert_eq!(report.final_recommendation, Recommendation::Wait);
    assert_eq!(report.decision_rule, Some(DecisionRule::FallingPrices));
    assert_eq!(report.trend_data.momentum_score, 45.0);
    assert_eq!(report.forecast.key_insight, "Dealer inventory is building.");
    assert_eq!(report.ethics_disclaimer, ETHICS_DISCLAIMER);

    let legacy = report.legacy();
    assert_eq!(legacy.predicted_price, report.current_price);
    assert_eq!(legacy.forecast_90d, report.projected_price);
    assert!(legacy.tool_outputs.run_llm_price_analysis.is_some());
}

#[tokio::test]
async fn test_refinement_fallback_mirrors_statistical_trend() {
    let mut refiner = MockForecastRefiner::new();
    refiner
        .expect_refine()
        .returning(|_| Outcome::fallback("pipe unavailable"));
    let collaborators = Collaborators {
        refiner: Arc::new(refiner),
        ..live_collaborators()
    };

    let report = orchestrator(collaborators).evaluate(&query()).await.unwrap();

    assert_eq!(report.forecast.method, ForecastMethod::Linear);
    assert_eq!(report.forecast.forecast_30d, 19800.0);
    assert_eq!(report.projected_price, 19400.0);
    assert_eq!(report.confidence_score, 77);
    assert_eq!(report.predicted_90_day_change, -3.0);
    assert_eq!(report.volatility_index, Volatility::Moderate);
    assert_eq!(report.risk_score, 42);
    assert_eq!(report.final_recommendation, Recommendation::Wait);
    assert_eq!(report.forecast.key_insight, "");

    let forecast = &report.agent_log[3];
    assert_eq!(forecast.stage_name, PipelineStage::Forecast);
    assert_eq!(forecast.status, StageStatus::Fallback);
    assert!(forecast.message.contains("pipe unavailable"));
}

#[tokio::test]
async fn test_stalled_refinement_times_out_to_fallback() {
    let collaborators = Collaborators {
        refiner: Arc::new(StalledRefiner),
        ..live_collaborators()
    };

    let report = orchestrator(collaborators)
        .with_collaborator_timeout(Duration::from_millis(20))
        .evaluate(&query())
        .await
        .unwrap();

    assert_eq!(report.forecast.method, ForecastMethod::Linear);
    assert_eq!(report.agent_log[3].status, StageStatus::Fallback);
    assert!(report.agent_log[3].message.contains("timed out after 20ms"));
}

#[tokio::test]
async fn test_explanation_fallback_uses_template() {
    let mut explainer = MockExplanationWriter::new();
    explainer
        .expect_explain()
        .returning(|_| Outcome::fallback("expected 3 reasoning sentences, got 1"));
    let collaborators = Collaborators {
        explainer: Arc::new(explainer),
        ..live_collaborators()
    };

    let report = orchestrator(collaborators).evaluate(&query()).await.unwrap();

    assert_eq!(report.reasoning_summary.len(), 3);
    assert_eq!(
        report.reasoning_summary[0],
        "Fair market value for this 2020 Mazda Cx-5 is $20,000."
    );
    assert_eq!(
        report.reasoning_summary[1],
        "Prices are forecast to fall 5.1% over 90 days with 77% confidence."
    );
    assert_eq!(report.reasoning_summary[2], report.decision_rationale);
    assert_eq!(report.agent_log[6].stage_name, PipelineStage::Explanation);
    assert_eq!(report.agent_log[6].status, StageStatus::Fallback);
}

#[tokio::test]
async fn test_short_explanation_is_replaced_by_template() {
    let mut explainer = MockExplanationWriter::new();
    explainer
        .expect_explain()
        .returning(|_| Outcome::Success(vec!["Only one sentence.".to_string()]));
    let collaborators = Collaborators {
        explainer: Arc::new(explainer),
        ..live_collaborators()
    };

    let report = orchestrator(collaborators).evaluate(&query()).await.unwrap();

    assert_eq!(report.reasoning_summary.len(), 3);
    assert_eq!(report.reasoning_summary[2], report.decision_rationale);
    assert_eq!(report.agent_log[6].status, StageStatus::Fallback);
    assert!(report.agent_log[6]
        .message
        .contains("expected 3 non-empty reasoning sentences, got 1"));
}

#[tokio::test]
async fn test_blank_explanation_sentence_is_replaced_by_template() {
    let mut explainer = MockExplanationWriter::new();
    explainer.expect_explain().returning(|_| {
        Outcome::Success(vec![
            "Prices are soft.".to_string(),
            "   ".to_string(),
            "Wait.".to_string(),
        ])
    });
    let collaborators = Collaborators {
        explainer: Arc::new(explainer),
        ..live_collaborators()
    };

    let report = orchestrator(collaborators).evaluate(&query()).await.unwrap();

    assert_eq!(
        report.reasoning_summary[0],
        "Fair market value for this 2020 Mazda Cx-5 is $20,000."
    );
    assert_eq!(report.agent_log[6].status, StageStatus::Fallback);
}

#[tokio::test]
async fn test_ethics_fallback_uses_standard_disclosure() {
    let mut ethics = MockEthicsAdvisor::new();
    ethics
        .expect_disclose()
        .returning(|_| Outcome::fallback("service down"));
    let collaborators = Collaborators {
        ethics: Arc::new(ethics),
        ..live_collaborators()
    };

    let report = orchestrator(collaborators).evaluate(&query()).await.unwrap();

    assert_eq!(report.agent_log[7].stage_name, PipelineStage::Ethics);
    assert_eq!(report.agent_log[7].status, StageStatus::Fallback);
    assert!(report.transparency_note.contains("2020 Mazda Cx-5"));
    assert_eq!(report.ethics_disclaimer, ETHICS_DISCLAIMER);
}

#[tokio::test]
async fn test_lookup_failures_degrade_instead_of_failing() {
    let mut market = MockMarketDataSource::new();
    market.expect_price_history().returning(|_, _, _| {
        Err(StorageError::Query {
            message: "database is locked".to_string(),
        })
    });
    market.expect_market_context().returning(|_, _, _| {
        Err(StorageError::Query {
            message: "database is locked".to_string(),
        })
    });
    let collaborators = Collaborators {
        market_data: Arc::new(market),
        ..live_collaborators()
    };

    let report = orchestrator(collaborators).evaluate(&query()).await.unwrap();

    assert_eq!(report.agent_log[1].stage_name, PipelineStage::DataLookup);
    assert_eq!(report.agent_log[1].status, StageStatus::Fallback);
    // No history forces the top volatility tier
    assert_eq!(report.volatility_index, Volatility::High);
    // Without history the features fall back to the statistical forecast
    assert_eq!(report.data_features.ma_30, 19800.0);
    assert_eq!(report.data_features.ma_90, 19400.0);

    let evidence = report.evidence.unwrap();
    assert!(evidence.price_history[0].is_missing());
    assert_eq!(evidence.market_context, MarketContext::default());
}

#[tokio::test]
async fn test_unknown_inventory_signal_marks_lookup_fallback() {
    let mut market = MockMarketDataSource::new();
    market
        .expect_price_history()
        .returning(|_, _, _| Ok(history()));
    market
        .expect_market_context()
        .returning(|_, _, _| Ok(MarketContext::default()));
    let collaborators = Collaborators {
        market_data: Arc::new(market),
        ..live_collaborators()
    };

    let report = orchestrator(collaborators).evaluate(&query()).await.unwrap();

    assert_eq!(report.agent_log[1].stage_name, PipelineStage::DataLookup);
    assert_eq!(report.agent_log[1].status, StageStatus::Fallback);
    assert!(report.agent_log[1].message.ends_with("no inventory signal."));
}

#[tokio::test]
async fn test_price_model_failure_is_fatal() {
    let mut predictor = MockPricePredictor::new();
    predictor.expect_predict().returning(|_| {
        Err(PipelineError::upstream("price_prediction", "model offline").into())
    });
    let collaborators = Collaborators {
        predictor: Arc::new(predictor),
        refiner: Arc::new(MockForecastRefiner::new()),
        explainer: Arc::new(MockExplanationWriter::new()),
        ..live_collaborators()
    };

    let err = orchestrator(collaborators)
        .evaluate(&query())
        .await
        .unwrap_err();
    match err {
        AppError::Pipeline(PipelineError::Upstream { stage, .. }) => {
            assert_eq!(stage, "price_prediction")
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_negative_predicted_price_is_fatal() {
    let mut predictor = MockPricePredictor::new();
    predictor.expect_predict().returning(|_| {
        Ok(PricePrediction {
            predicted_price: -1.0,
            explanatory_factors: vec![],
        })
    });
    let collaborators = Collaborators {
        predictor: Arc::new(predictor),
        ..live_collaborators()
    };

    let err = orchestrator(collaborators)
        .evaluate(&query())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::Pipeline(PipelineError::Upstream { .. })
    ));
}

#[tokio::test]
async fn test_stalled_price_model_times_out_as_fatal() {
    let collaborators = Collaborators {
        predictor: Arc::new(StalledPredictor),
        refiner: Arc::new(MockForecastRefiner::new()),
        explainer: Arc::new(MockExplanationWriter::new()),
        ..live_collaborators()
    };

    let err = orchestrator(collaborators)
        .with_collaborator_timeout(Duration::from_millis(20))
        .evaluate(&query())
        .await
        .unwrap_err();
    match err {
        AppError::Pipeline(PipelineError::Upstream { stage, message }) => {
            assert_eq!(stage, "price_prediction");
            assert!(message.contains("timed out after 20ms"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_non_finite_statistical_forecast_is_fatal() {
    let mut forecaster = MockStatisticalForecaster::new();
    forecaster.expect_forecast().returning(|_| {
        Ok(StatForecast {
            forecast_90d: f64::NAN,
            ..stat_forecast()
        })
    });
    let collaborators = Collaborators {
        forecaster: Arc::new(forecaster),
        predictor: Arc::new(MockPricePredictor::new()),
        ..live_collaborators()
    };

    let err = orchestrator(collaborators)
        .evaluate(&query())
        .await
        .unwrap_err();
    match err {
        AppError::Pipeline(PipelineError::Upstream { stage, .. }) => {
            assert_eq!(stage, "statistical_forecast")
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_statistical_forecast_failure_is_fatal() {
    let mut forecaster = MockStatisticalForecaster::new();
    forecaster.expect_forecast().returning(|_| {
        Err(StorageError::Connection {
            message: "no database".to_string(),
        }
        .into())
    });
    let collaborators = Collaborators {
        forecaster: Arc::new(forecaster),
        predictor: Arc::new(MockPricePredictor::new()),
        ..live_collaborators()
    };

    let err = orchestrator(collaborators)
        .evaluate(&query())
        .await
        .unwrap_err();
    match err {
        AppError::Pipeline(PipelineError::Upstream { stage, .. }) => {
            assert_eq!(stage, "statistical_forecast")
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_empty_make_is_rejected() {
    let err = orchestrator(untouched_collaborators())
        .evaluate(&VehicleQuery::new("  ", "civic", 2020))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::Pipeline(PipelineError::InvalidInput { .. })
    ));
}

#[tokio::test]
async fn test_repeated_evaluation_is_byte_identical() {
    let orchestrator = orchestrator(live_collaborators());
    let first = orchestrator.evaluate(&query()).await.unwrap();
    let second = orchestrator.evaluate(&query()).await.unwrap();

    assert_eq!(
        serde_json::to_string(&first.to_wire().unwrap()).unwrap(),
        serde_json::to_string(&second.to_wire().unwrap()).unwrap()
    );
}

// ============================================================================
// Overrides
// ============================================================================

#[tokio::test]
async fn test_override_skips_live_pipeline() {
    let orchestrator = Orchestrator::new(
        untouched_collaborators(),
        OverrideTable::builtin(),
        &PipelineConfig::default(),
    );

    let report = orchestrator
        .evaluate(&VehicleQuery::new(" Tesla ", "MODEL 3", 2021))
        .await
        .unwrap();

    assert_eq!(report.final_recommendation, Recommendation::Wait);
    assert_eq!(report.confidence_score, 82);
    assert_eq!(report.risk_score, 58);
    assert_eq!(report.projected_price, 17723.0);
    assert_eq!(report.current_price, 18500.0);
    assert_eq!(report.forecast.forecast_30d, 17474.88);
    assert_eq!(report.uncertainty_range.low, 16305.16);
    assert_eq!(report.uncertainty_range.high, 19140.84);
    assert_eq!(report.trend_data.direction, TrendDirection::Falling);
    assert_eq!(report.trend_data.momentum_score, 41.6);
    assert_eq!(report.data_features.depreciation_rate, 0.0);
    assert_eq!(report.decision_rule, None);
    assert!(report.evidence.is_none());
    assert_eq!(report.forecast.key_insight, report.reasoning_summary[1]);

    assert_eq!(report.agent_log.len(), 2);
    assert_eq!(
        report.agent_log[1].message,
        "Override applied for 'tesla model 3'. Skipping live pipeline."
    );
}

#[tokio::test]
async fn test_override_ignores_mileage_condition_and_region() {
    let orchestrator = Orchestrator::new(
        untouched_collaborators(),
        OverrideTable::builtin(),
        &PipelineConfig::default(),
    );

    let baseline = orchestrator
        .evaluate(&VehicleQuery::new("tesla", "model 3", 2021))
        .await
        .unwrap();
    let variant = orchestrator
        .evaluate(
            &VehicleQuery::new("tesla", "model 3", 2021)
                .with_mileage(120_000)
                .with_condition("poor")
                .with_region("texas"),
        )
        .await
        .unwrap();

    assert_eq!(baseline.final_recommendation, variant.final_recommendation);
    assert_eq!(baseline.confidence_score, variant.confidence_score);
    assert_eq!(baseline.reasoning_summary, variant.reasoning_summary);
    assert_eq!(baseline.projected_price, variant.projected_price);
}

#[tokio::test]
async fn test_override_scales_from_configured_reference_price() {
    let config = PipelineConfig {
        override_reference_price: 30000.0,
        ..PipelineConfig::default()
    };
    let orchestrator =
        Orchestrator::new(untouched_collaborators(), OverrideTable::builtin(), &config);

    let report = orchestrator
        .evaluate(&VehicleQuery::new("honda", "civic", 2019))
        .await
        .unwrap();

    assert_eq!(report.final_recommendation, Recommendation::BuyNow);
    assert_eq!(report.projected_price, 30720.0);
    assert_eq!(report.current_price, 30000.0);
    assert_eq!(report.trend_data.direction, TrendDirection::Rising);
}

#[tokio::test]
async fn test_empty_override_table_runs_live_pipeline() {
    let orchestrator = Orchestrator::new(
        live_collaborators(),
        OverrideTable::builtin(),
        &PipelineConfig::default(),
    )
    .with_overrides(OverrideTable::empty());

    let report = orchestrator
        .evaluate(&VehicleQuery::new("tesla", "model 3", 2021))
        .await
        .unwrap();
    assert!(report.evidence.is_some());
    assert_eq!(report.agent_log.len(), 9);
}
