use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{Sqlite, SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Executor;
use std::str::FromStr;
use tracing::{debug, info};

use super::{MarketSnapshot, PriceRecord, SeedData, SeedSummary};
use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};
use crate::market::{InventoryTrend, MarketContext, PriceHistoryPoint, PricePoint};
use crate::services::MarketDataSource;

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const DATE_FORMAT: &str = "%Y-%m-%d";

/// SQLite-backed market data store
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (creating if needed) the database file and run migrations
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Migrated in-memory database. A single connection keeps one shared database.
    pub async fn new_in_memory() -> StorageResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to open in-memory database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Run database migrations using embedded sqlx migrations
    async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running database migrations...");

        MIGRATOR.run(&self.pool).await.map_err(|e| StorageError::Migration {
            message: format!("Failed to run migrations: {}", e),
        })?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying pool for advanced queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert or replace one month of prices.
    pub async fn record_price_point(&self, record: &PriceRecord) -> StorageResult<()> {
        upsert_price_point(&self.pool, record).await
    }

    /// Insert or replace a market snapshot.
    pub async fn record_market_snapshot(&self, snapshot: &MarketSnapshot) -> StorageResult<()> {
        upsert_market_snapshot(&self.pool, snapshot).await
    }

    /// Load a seed file's rows in one transaction.
    pub async fn seed(&self, data: &SeedData) -> StorageResult<SeedSummary> {
        let mut tx = self.pool.begin().await?;

        for record in &data.price_history {
            upsert_price_point(&mut *tx, record).await?;
        }
        for snapshot in &data.market_snapshots {
            upsert_market_snapshot(&mut *tx, snapshot).await?;
        }

        tx.commit().await?;

        let summary = SeedSummary {
            price_points: data.price_history.len(),
            market_snapshots: data.market_snapshots.len(),
        };
        info!(
            price_points = summary.price_points,
            market_snapshots = summary.market_snapshots,
            "Seeded market data"
        );
        Ok(summary)
    }
}

async fn upsert_price_point<'e, E>(executor: E, record: &PriceRecord) -> StorageResult<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO price_history (make, model, year, period, avg_price, listing_count)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT (make, model, year, period) DO UPDATE SET
            avg_price = excluded.avg_price,
            listing_count = excluded.listing_count
        "#,
    )
    .bind(normalize(&record.make))
    .bind(normalize(&record.model))
    .bind(record.year)
    .bind(record.point.period.format(DATE_FORMAT).to_string())
    .bind(record.point.avg_price)
    .bind(i64::from(record.point.listing_count))
    .execute(executor)
    .await?;

    Ok(())
}

async fn upsert_market_snapshot<'e, E>(executor: E, snapshot: &MarketSnapshot) -> StorageResult<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO market_snapshots
            (make, model, year, observed_on, current_inventory_count, inventory_trend, price_vs_median_pct)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (make, model, year, observed_on) DO UPDATE SET
            current_inventory_count = excluded.current_inventory_count,
            inventory_trend = excluded.inventory_trend,
            price_vs_median_pct = excluded.price_vs_median_pct
        "#,
    )
    .bind(normalize(&snapshot.make))
    .bind(normalize(&snapshot.model))
    .bind(snapshot.year)
    .bind(snapshot.observed_on.format(DATE_FORMAT).to_string())
    .bind(i64::from(snapshot.context.current_inventory_count))
    .bind(snapshot.context.inventory_trend.as_str())
    .bind(snapshot.context.price_vs_median_pct)
    .execute(executor)
    .await?;

    Ok(())
}

#[async_trait]
impl MarketDataSource for SqliteStorage {
    async fn price_history(
        &self,
        make: &str,
        model: &str,
        year: i32,
    ) -> StorageResult<Vec<PriceHistoryPoint>> {
        let rows: Vec<PriceRow> = sqlx::query_as(
            r#"
            SELECT period, avg_price, listing_count
            FROM price_history
            WHERE make = ? AND model = ? AND year = ?
            ORDER BY period ASC
            "#,
        )
        .bind(normalize(make))
        .bind(normalize(model))
        .bind(year)
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            debug!(make, model, year, "No stored price history");
            return Ok(vec![PriceHistoryPoint::missing(format!(
                "no price history for {} {} {}",
                year,
                normalize(make),
                normalize(model)
            ))]);
        }

        rows.into_iter()
            .map(|row| PricePoint::try_from(row).map(PriceHistoryPoint::Month))
            .collect()
    }

    async fn market_context(
        &self,
        make: &str,
        model: &str,
        year: i32,
    ) -> StorageResult<MarketContext> {
        let row: Option<SnapshotRow> = sqlx::query_as(
            r#"
            SELECT current_inventory_count, inventory_trend, price_vs_median_pct
            FROM market_snapshots
            WHERE make = ? AND model = ? AND year = ?
            ORDER BY observed_on DESC
            LIMIT 1
            "#,
        )
        .bind(normalize(make))
        .bind(normalize(model))
        .bind(year)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(MarketContext::from).unwrap_or_default())
    }

    async fn market_wide_history(&self) -> StorageResult<Vec<PricePoint>> {
        let rows: Vec<PriceRow> = sqlx::query_as(
            r#"
            SELECT period,
                   AVG(avg_price) AS avg_price,
                   COALESCE(SUM(listing_count), 0) AS listing_count
            FROM price_history
            WHERE avg_price IS NOT NULL
            GROUP BY period
            ORDER BY period ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PricePoint::try_from).collect()
    }
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

// Internal row types for SQLx mapping
#[derive(sqlx::FromRow)]
struct PriceRow {
    period: String,
    avg_price: Option<f64>,
    listing_count: i64,
}

impl TryFrom<PriceRow> for PricePoint {
    type Error = StorageError;

    fn try_from(row: PriceRow) -> Result<Self, Self::Error> {
        let period = NaiveDate::parse_from_str(&row.period, DATE_FORMAT).map_err(|e| {
            StorageError::Query {
                message: format!("Invalid period '{}': {}", row.period, e),
            }
        })?;

        Ok(Self {
            period,
            avg_price: row.avg_price,
            listing_count: u32::try_from(row.listing_count).unwrap_or(0),
        })
    }
}

#[derive(sqlx::FromRow)]
struct SnapshotRow {
    current_inventory_count: i64,
    inventory_trend: String,
    price_vs_median_pct: f64,
}

impl From<SnapshotRow> for MarketContext {
    fn from(row: SnapshotRow) -> Self {
        Self {
            current_inventory_count: u32::try_from(row.current_inventory_count).unwrap_or(0),
            inventory_trend: row
                .inventory_trend
                .parse()
                .unwrap_or(InventoryTrend::Unknown),
            price_vs_median_pct: row.price_vs_median_pct,
        }
    }
}
