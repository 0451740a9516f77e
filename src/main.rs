//! Landsat ingestion CLI application
//!
//! Command-line interface for acquiring Landsat scenes from the USGS M2M API
//! and registering them in PostgreSQL/PostGIS.

use std::process;

use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use landsat_ingest::cli::{handle_cleanup, handle_ingest, Cli, Commands};
use landsat_ingest::config::AppConfig;
use landsat_ingest::errors::Result;

#[tokio::main]
async fn main() {
    let result = run().await;

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Main application logic
async fn run() -> Result<()> {
    // Load environment variables from .env file if it exists
    dotenv::dotenv().ok();

    let cli = Cli::parse_args();
    let config = AppConfig::load(cli.global.config.clone()).await?;

    init_logging(&cli, &config);

    info!("Landsat Ingest v{} starting", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Ingest(args) => {
            info!("Executing ingest command");
            handle_ingest(args, &config).await
        }
        Commands::CleanupLists(args) => {
            info!("Executing cleanup-lists command");
            handle_cleanup(args, &config).await
        }
    }
}

/// Initialize logging from CLI verbosity and the configured level
fn init_logging(cli: &Cli, config: &AppConfig) {
    let log_level = cli.log_level(&config.logging.level);

    let mut filter = EnvFilter::from_default_env();
    match format!("landsat_ingest={}", log_level).parse() {
        Ok(directive) => filter = filter.add_directive(directive),
        Err(e) => eprintln!("Ignoring invalid log level '{}': {}", log_level, e),
    }

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(cli.global.very_verbose)
        .init();

    if cli.global.very_verbose {
        info!("Very verbose logging enabled");
    } else if cli.global.verbose {
        info!("Verbose logging enabled");
    }
}
