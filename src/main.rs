use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vehicle_market_intel::{
    config::{self, Config, DatabaseConfig, LogFormat, LoggingConfig},
    langbase::LangbaseClient,
    market::{DEFAULT_CONDITION, DEFAULT_MILEAGE, DEFAULT_REGION},
    pipeline::{Orchestrator, OverrideTable, ScenarioCatalog},
    prompts::{EXPLANATION_PROMPT, FORECAST_REFINEMENT_PROMPT},
    services::Collaborators,
    storage::{SeedData, SqliteStorage},
    VehicleQuery,
};

/// Used-vehicle buy / wait / monitor recommendations.
#[derive(Parser, Debug)]
#[command(name = "vehicle-market-intel", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate a vehicle and print the intelligence report as JSON
    Evaluate {
        #[arg(long)]
        make: String,

        #[arg(long)]
        model: String,

        #[arg(long)]
        year: i32,

        #[arg(long, default_value_t = DEFAULT_MILEAGE)]
        mileage: u32,

        #[arg(long, default_value = DEFAULT_CONDITION)]
        condition: String,

        #[arg(long, default_value = DEFAULT_REGION)]
        region: String,

        /// What-if scenario applied to the report (e.g. fuel_spike)
        #[arg(long)]
        scenario: Option<String>,
    },

    /// Load price history and market snapshots from a JSON seed file
    Seed {
        #[arg(long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    config::load_dotenv();

    // Initialize logging
    init_logging(&LoggingConfig::from_env());

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Vehicle Market Intel starting..."
    );

    match cli.command {
        Command::Seed { file } => {
            let storage = open_storage(&DatabaseConfig::from_env()).await?;
            let json = std::fs::read_to_string(&file)?;
            let data: SeedData = serde_json::from_str(&json)?;
            let summary = storage.seed(&data).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Evaluate {
            make,
            model,
            year,
            mileage,
            condition,
            region,
            scenario,
        } => {
            // Only evaluation talks to Langbase
            let config = match Config::from_env() {
                Ok(c) => c,
                Err(e) => {
                    eprintln!("Configuration error: {}", e);
                    std::process::exit(1);
                }
            };
            let storage = open_storage(&config.database).await?;
            let query = VehicleQuery::new(make, model, year)
                .with_mileage(mileage)
                .with_condition(condition)
                .with_region(region);
            evaluate(config, storage, &query, scenario.as_deref()).await?;
        }
    }

    Ok(())
}

async fn open_storage(database: &DatabaseConfig) -> anyhow::Result<SqliteStorage> {
    match SqliteStorage::new(database).await {
        Ok(s) => {
            info!(path = %database.path.display(), "Database initialized");
            Ok(s)
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize database");
            Err(e.into())
        }
    }
}

async fn evaluate(
    config: Config,
    storage: SqliteStorage,
    query: &VehicleQuery,
    scenario: Option<&str>,
) -> anyhow::Result<()> {
    // Initialize Langbase client
    let langbase = match LangbaseClient::new(&config.langbase, config.request.clone()) {
        Ok(c) => {
            info!(base_url = %config.langbase.base_url, "Langbase client initialized");
            c
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize Langbase client");
            return Err(e.into());
        }
    };

    // Pipes are optional: the pipeline falls back without them
    for (pipe, description, prompt) in [
        (
            &config.pipes.forecast_refinement,
            "Refines statistical used-vehicle price forecasts",
            FORECAST_REFINEMENT_PROMPT,
        ),
        (
            &config.pipes.explanation,
            "Writes three-sentence vehicle price reasoning",
            EXPLANATION_PROMPT,
        ),
    ] {
        if let Err(e) = langbase.ensure_pipe(pipe, description, prompt).await {
            warn!(pipe = %pipe, error = %e, "Failed to ensure pipe exists");
        }
    }

    let overrides = match &config.pipeline.overrides_path {
        Some(path) => OverrideTable::from_file(path)?,
        None => OverrideTable::builtin(),
    };

    let collaborators = Collaborators::production(storage, langbase, &config);
    let orchestrator = Orchestrator::new(collaborators, overrides, &config.pipeline);

    let report = match orchestrator.evaluate(query).await {
        Ok(report) => report,
        Err(e) => {
            error!(vehicle = %query.display_name(), error = %e, "Evaluation failed");
            return Err(e.into());
        }
    };

    let mut output = report.to_wire()?;
    if let Some(key) = scenario {
        let outcome = report.what_if(&ScenarioCatalog::builtin(), key);
        if let Some(object) = output.as_object_mut() {
            object.insert("what_if".to_string(), serde_json::to_value(outcome)?);
        }
    }

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Initialize tracing/logging
fn init_logging(logging: &LoggingConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    match logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
