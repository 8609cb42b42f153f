//! Storage layer for historical market data.
//!
//! This module provides SQLite-based storage for monthly vehicle price
//! history and market snapshots, and serves them to the pipeline through
//! [`MarketDataSource`](crate::services::MarketDataSource).

mod sqlite;

pub use sqlite::SqliteStorage;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::market::{MarketContext, PricePoint};

/// One month of prices for a vehicle, as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub make: String,
    pub model: String,
    pub year: i32,
    #[serde(flatten)]
    pub point: PricePoint,
}

/// Market position of a vehicle on a given day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub make: String,
    pub model: String,
    pub year: i32,
    pub observed_on: NaiveDate,
    #[serde(flatten)]
    pub context: MarketContext,
}

/// Bulk seed file contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub price_history: Vec<PriceRecord>,
    #[serde(default)]
    pub market_snapshots: Vec<MarketSnapshot>,
}

/// Rows written by a seed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeedSummary {
    pub price_points: usize,
    pub market_snapshots: usize,
}
