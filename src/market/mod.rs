//! Market data model shared by the collaborators and the pipeline.
//!
//! Everything here is plain data: created per evaluation, never mutated
//! after construction, and serializable so it can be echoed in the report.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Default mileage assumed when the caller does not provide one.
pub const DEFAULT_MILEAGE: u32 = 50_000;
/// Default vehicle condition.
pub const DEFAULT_CONDITION: &str = "good";
/// Default sales region.
pub const DEFAULT_REGION: &str = "california";

/// The vehicle a recommendation is requested for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleQuery {
    pub make: String,
    pub model: String,
    pub year: i32,
    pub mileage: u32,
    pub condition: String,
    pub region: String,
}

impl VehicleQuery {
    /// Create a query with default mileage, condition and region.
    pub fn new(make: impl Into<String>, model: impl Into<String>, year: i32) -> Self {
        Self {
            make: make.into(),
            model: model.into(),
            year,
            mileage: DEFAULT_MILEAGE,
            condition: DEFAULT_CONDITION.to_string(),
            region: DEFAULT_REGION.to_string(),
        }
    }

    /// Set the odometer reading
    pub fn with_mileage(mut self, mileage: u32) -> Self {
        self.mileage = mileage;
        self
    }

    /// Set the condition label
    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = condition.into();
        self
    }

    /// Set the sales region
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Human-readable name, e.g. `2021 Ford F-150`.
    pub fn display_name(&self) -> String {
        format!(
            "{} {} {}",
            self.year,
            title_case(&self.make),
            title_case(&self.model)
        )
    }

    /// Lowercase, whitespace-trimmed `make model` key.
    pub fn normalized_key(&self) -> String {
        normalize_key(&self.make, &self.model)
    }
}

/// Lowercase, whitespace-trimmed `make model` key.
pub fn normalize_key(make: &str, model: &str) -> String {
    format!(
        "{} {}",
        make.trim().to_lowercase(),
        model.trim().to_lowercase()
    )
}

/// Uppercase the first letter of every alphabetic run, lowercase the rest.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.trim().chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

/// One month of observed prices for a vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    /// First day of the month the average covers.
    pub period: NaiveDate,
    /// Average asking price; absent when the month had no usable listings.
    pub avg_price: Option<f64>,
    #[serde(default)]
    pub listing_count: u32,
}

/// An entry of a price-history lookup.
///
/// A lookup that could not produce data returns a single `Missing` record
/// instead of an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PriceHistoryPoint {
    Missing { error: String },
    Month(PricePoint),
}

impl PriceHistoryPoint {
    /// Sentinel record for a failed or empty lookup.
    pub fn missing(reason: impl Into<String>) -> Self {
        PriceHistoryPoint::Missing {
            error: reason.into(),
        }
    }

    /// Whether this record is the error sentinel.
    pub fn is_missing(&self) -> bool {
        matches!(self, PriceHistoryPoint::Missing { .. })
    }
}

/// A sequence has history iff it is non-empty and its first element is not
/// the error sentinel.
pub fn has_history(history: &[PriceHistoryPoint]) -> bool {
    history.first().is_some_and(|p| !p.is_missing())
}

/// Usable average prices, oldest first. Empty when there is no history.
pub fn history_prices(history: &[PriceHistoryPoint]) -> Vec<f64> {
    if !has_history(history) {
        return Vec::new();
    }
    history
        .iter()
        .filter_map(|p| match p {
            PriceHistoryPoint::Month(point) => point.avg_price,
            PriceHistoryPoint::Missing { .. } => None,
        })
        .filter(|price| price.is_finite() && *price != 0.0)
        .collect()
}

/// Direction of the listed-inventory count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InventoryTrend {
    Rising,
    Falling,
    Stable,
    #[default]
    #[serde(other)]
    Unknown,
}

impl InventoryTrend {
    pub fn as_str(&self) -> &'static str {
        match self {
            InventoryTrend::Rising => "rising",
            InventoryTrend::Falling => "falling",
            InventoryTrend::Stable => "stable",
            InventoryTrend::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for InventoryTrend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for InventoryTrend {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "rising" => InventoryTrend::Rising,
            "falling" => InventoryTrend::Falling,
            "stable" => InventoryTrend::Stable,
            _ => InventoryTrend::Unknown,
        })
    }
}

/// Current supply and pricing position of a vehicle in the market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketContext {
    #[serde(default)]
    pub current_inventory_count: u32,
    #[serde(default)]
    pub inventory_trend: InventoryTrend,
    /// Signed percentage of the typical listing price versus the market median.
    #[serde(default)]
    pub price_vs_median_pct: f64,
}

impl Default for MarketContext {
    fn default() -> Self {
        Self {
            current_inventory_count: 0,
            inventory_trend: InventoryTrend::Unknown,
            price_vs_median_pct: 0.0,
        }
    }
}

/// Direction of a price trend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Rising,
    Falling,
    #[default]
    Stable,
    #[serde(other)]
    Unknown,
}

impl TrendDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendDirection::Rising => "rising",
            TrendDirection::Falling => "falling",
            TrendDirection::Stable => "stable",
            TrendDirection::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a forecast was produced. Also the key of the base-confidence lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastMethod {
    Prophet,
    LlmBlended,
    Linear,
    Statistical,
    MarketAvg,
    IndustryDefault,
    #[serde(other)]
    Unknown,
}

impl ForecastMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForecastMethod::Prophet => "prophet",
            ForecastMethod::LlmBlended => "llm_blended",
            ForecastMethod::Linear => "linear",
            ForecastMethod::Statistical => "statistical",
            ForecastMethod::MarketAvg => "market_avg",
            ForecastMethod::IndustryDefault => "industry_default",
            ForecastMethod::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ForecastMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Output of the statistical time-series forecaster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatForecast {
    pub forecast_30d: f64,
    pub forecast_90d: f64,
    pub trend_direction: TrendDirection,
    /// 30-day change in percent.
    pub trend_pct_change: f64,
    pub trend_pct_90d: f64,
    pub method: ForecastMethod,
    /// Most recent observed price, 0 when unknown.
    pub last_known_price: f64,
}

/// When the LLM thinks a buyer should act.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BestTimeToBuy {
    #[serde(rename = "now")]
    Now,
    #[serde(rename = "30_days")]
    Within30Days,
    #[serde(rename = "60_days")]
    Within60Days,
    #[serde(rename = "90_days")]
    Within90Days,
    #[default]
    #[serde(rename = "neutral")]
    #[serde(other)]
    Neutral,
}

impl BestTimeToBuy {
    /// An immediate or near-term buy window.
    pub fn is_near_term(&self) -> bool {
        matches!(self, BestTimeToBuy::Now | BestTimeToBuy::Within30Days)
    }
}

/// LLM-refined forecast after sanitisation.
///
/// Forecast values are `None` whenever the model returned something
/// non-numeric, non-finite or non-positive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmForecast {
    pub forecast_30d: Option<f64>,
    pub forecast_90d: Option<f64>,
    pub trend_direction: Option<TrendDirection>,
    #[serde(default)]
    pub key_insight: String,
    #[serde(default)]
    pub best_time_to_buy: BestTimeToBuy,
}

impl LlmForecast {
    /// Build a forecast from an untrusted JSON payload.
    pub fn from_untrusted(value: &serde_json::Value) -> Self {
        let price = |key: &str| {
            value
                .get(key)
                .and_then(|v| match v {
                    serde_json::Value::Number(n) => n.as_f64(),
                    serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
                    _ => None,
                })
                .filter(|p| p.is_finite() && *p > 0.0)
        };

        Self {
            forecast_30d: price("forecast_30d"),
            forecast_90d: price("forecast_90d"),
            trend_direction: value
                .get("trend_direction")
                .and_then(|v| serde_json::from_value(v.clone()).ok()),
            key_insight: value
                .get("key_insight")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .trim()
                .to_string(),
            best_time_to_buy: value
                .get("best_time_to_buy")
                .and_then(|v| serde_json::from_value(v.clone()).ok())
                .unwrap_or_default(),
        }
    }

    /// Deterministic stand-in used when refinement is unavailable: it
    /// carries no prices and echoes the statistical trend direction.
    pub fn mirror_of(stat: &StatForecast) -> Self {
        Self {
            forecast_30d: None,
            forecast_90d: None,
            trend_direction: Some(stat.trend_direction),
            key_insight: String::new(),
            best_time_to_buy: BestTimeToBuy::Neutral,
        }
    }
}

/// A single explanatory factor of the price model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceFactor {
    pub feature: String,
    /// Signed dollar contribution to the predicted price.
    pub impact: f64,
}

/// Output of the price model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePrediction {
    pub predicted_price: f64,
    #[serde(default)]
    pub explanatory_factors: Vec<PriceFactor>,
}
