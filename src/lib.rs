//! # Vehicle Market Intel
//!
//! Turns used-vehicle market signals into a buy / wait / monitor
//! recommendation with a quantified confidence, risk score and
//! uncertainty band.
//!
//! ## Pipeline
//!
//! - **Data lookup**: monthly price history and market context from SQLite
//! - **Trend**: trend strength, momentum and smoothed data features
//! - **Forecast**: statistical forecast blended with a Langbase LLM review
//! - **Risk**: volatility tier, risk score and uncertainty band
//! - **Decision**: first-match rule table
//! - **Explanation / Ethics**: reasoning summary and disclosures, with
//!   deterministic fallbacks
//!
//! ## Architecture
//!
//! ```text
//! CLI → Orchestrator → TrendDeriver → ForecastBlender → RiskClassifier → DecisionEngine
//!            ↓                ↑
//!      Collaborators ── SQLite (history) / Langbase Pipes (HTTP)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use vehicle_market_intel::{Collaborators, Config, Orchestrator, OverrideTable, VehicleQuery};
//! use vehicle_market_intel::langbase::LangbaseClient;
//! use vehicle_market_intel::storage::SqliteStorage;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let storage = SqliteStorage::new(&config.database).await?;
//!     let langbase = LangbaseClient::new(&config.langbase, config.request.clone())?;
//!     let collaborators = Collaborators::production(storage, langbase, &config);
//!     let orchestrator =
//!         Orchestrator::new(collaborators, OverrideTable::builtin(), &config.pipeline);
//!
//!     let report = orchestrator
//!         .evaluate(&VehicleQuery::new("ford", "escape", 2020))
//!         .await?;
//!     println!("{}", report.final_recommendation);
//!     Ok(())
//! }
//! ```

/// Configuration management.
pub mod config;
/// Error types and result aliases for the application.
pub mod error;
/// Langbase API client and types for pipe communication.
pub mod langbase;
/// Vehicle queries and market data records.
pub mod market;
/// Recommendation pipeline stages and the orchestrator.
pub mod pipeline;
/// System prompts for Langbase pipes.
pub mod prompts;
/// Collaborator traits and their production implementations.
pub mod services;
/// SQLite storage for historical market data.
pub mod storage;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use market::VehicleQuery;
pub use pipeline::{IntelligenceReport, Orchestrator, OverrideTable, ScenarioCatalog};
pub use services::Collaborators;
