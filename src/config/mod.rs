use std::env;
use std::path::PathBuf;

use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub langbase: LangbaseConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub request: RequestConfig,
    pub pipes: PipeConfig,
    pub pipeline: PipelineConfig,
}

/// Langbase API configuration
#[derive(Debug, Clone)]
pub struct LangbaseConfig {
    pub api_key: String,
    pub base_url: String,
}

/// Market data database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// HTTP request configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

/// Langbase pipe name configuration
#[derive(Debug, Clone)]
pub struct PipeConfig {
    pub forecast_refinement: String,
    pub explanation: String,
}

/// Recommendation pipeline tuning
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Upper bound for any single LLM-backed collaborator call.
    pub collaborator_timeout_ms: u64,
    /// Indicative price that override projections are scaled from.
    pub override_reference_price: f64,
    /// Optional JSON file replacing the built-in override table.
    pub overrides_path: Option<PathBuf>,
}

impl Config {
    /// Configuration with default sections around the given Langbase account.
    pub fn new(langbase: LangbaseConfig) -> Self {
        Self {
            langbase,
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
            request: RequestConfig::default(),
            pipes: PipeConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        load_dotenv();

        let langbase = LangbaseConfig {
            api_key: env::var("LANGBASE_API_KEY").map_err(|_| AppError::Config {
                message: "LANGBASE_API_KEY is required".to_string(),
            })?,
            base_url: env::var("LANGBASE_BASE_URL")
                .unwrap_or_else(|_| "https://api.langbase.com".to_string()),
        };

        let database = DatabaseConfig::from_env();
        let logging = LoggingConfig::from_env();

        let request = RequestConfig {
            timeout_ms: parse_or("REQUEST_TIMEOUT_MS", 30000),
            max_retries: parse_or("MAX_RETRIES", 3),
            retry_delay_ms: parse_or("RETRY_DELAY_MS", 1000),
        };

        let pipes = PipeConfig {
            forecast_refinement: env::var("PIPE_FORECAST_REFINEMENT")
                .unwrap_or_else(|_| PipeConfig::default().forecast_refinement),
            explanation: env::var("PIPE_EXPLANATION")
                .unwrap_or_else(|_| PipeConfig::default().explanation),
        };

        let defaults = PipelineConfig::default();
        let pipeline = PipelineConfig {
            collaborator_timeout_ms: parse_or(
                "COLLABORATOR_TIMEOUT_MS",
                defaults.collaborator_timeout_ms,
            ),
            override_reference_price: parse_or(
                "OVERRIDE_REFERENCE_PRICE",
                defaults.override_reference_price,
            ),
            overrides_path: env::var("OVERRIDES_PATH")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
        };

        Ok(Config {
            langbase,
            database,
            logging,
            request,
            pipes,
            pipeline,
        })
    }
}

impl DatabaseConfig {
    /// Database settings alone. Seeding needs nothing else.
    pub fn from_env() -> Self {
        Self {
            path: env::var("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| DatabaseConfig::default().path),
            max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 5),
        }
    }
}

impl LoggingConfig {
    pub fn from_env() -> Self {
        Self {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        }
    }
}

/// Load a .env file if present (ignore errors if not found)
pub fn load_dotenv() {
    let _ = dotenvy::dotenv();
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/market.db"),
            max_connections: 5,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30000,
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            forecast_refinement: "vehicle-forecast-refiner-v1".to_string(),
            explanation: "vehicle-explainer-v1".to_string(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            collaborator_timeout_ms: 20000,
            override_reference_price: 18500.0,
            overrides_path: None,
        }
    }
}
