//! Command implementations for the CLI
//!
//! Each handler builds its collaborators from the loaded configuration,
//! runs, and prints a short summary to stdout.

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::app::client::{release_list, CatalogApi, M2mSession};
use crate::app::coordinator::{IngestionCoordinator, RunStatistics};
use crate::app::download::DownloadManager;
use crate::app::metadata::MetadataParser;
use crate::app::store::{MemoryStore, PostgresStore, SceneStore};
use crate::cli::args::{CleanupArgs, IngestArgs};
use crate::config::AppConfig;
use crate::errors::{AppError, Result};

/// Spinner shown while a long operation runs
fn create_spinner(message: String) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        spinner.set_style(style.tick_strings(&["◐", "◓", "◑", "◒"]));
    }
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}

/// Handle the ingest command
pub async fn handle_ingest(args: IngestArgs, config: &AppConfig) -> Result<()> {
    args.validate().map_err(AppError::generic)?;
    config.validate()?;

    let dry_run = args.dry_run;
    let credential = config.credential()?;
    let client_config = config.client_config();
    let filter = config.scene_filter(args.start, args.end, args.clouds).await?;

    let coordinator_config = config.coordinator_config(dry_run);
    coordinator_config.validate().map_err(AppError::generic)?;

    let database_url = if dry_run {
        config.database.url.clone()
    } else {
        Some(config.database_url()?.to_string())
    };

    let ingestor = config.raster_ingestor(database_url.as_deref().unwrap_or_default(), dry_run);
    ingestor.check_dependencies()?;

    let store: Arc<dyn SceneStore> = match &database_url {
        Some(url) => Arc::new(PostgresStore::connect(url, config.database.max_connections).await?),
        None => {
            info!("DRY-RUN: no DATABASE_URL set, deduplicating against an empty store");
            Arc::new(MemoryStore::new())
        }
    };

    let session = M2mSession::new(&client_config, credential, dry_run)?
        .with_simulated_bands(coordinator_config.bands.all_tags());
    let downloader = DownloadManager::new(&client_config, config.download.timeout, dry_run)?;

    let coordinator = IngestionCoordinator::new(
        Arc::new(session),
        store,
        Arc::new(ingestor),
        downloader,
        MetadataParser::new(dry_run),
        coordinator_config,
        filter,
    );

    if dry_run {
        println!("🧪 Dry run: nothing will be downloaded or written");
    }

    let spinner = create_spinner(format!(
        "Ingesting scenes acquired {} to {}...",
        args.start, args.end
    ));
    let outcome = coordinator.run(args.dataset_override()).await;
    spinner.finish_and_clear();

    let stats = outcome?;
    print_summary(&stats);

    if stats.is_success() {
        Ok(())
    } else {
        Err(AppError::generic(format!(
            "{} of {} processed scenes failed",
            stats.failed_scenes,
            stats.processed_scenes()
        )))
    }
}

fn print_summary(stats: &RunStatistics) {
    println!("\n📊 Ingestion Summary:");
    println!("  Scenes found: {}", stats.total_scenes);
    println!("  Already registered: {}", stats.skipped_scenes);
    println!("  Registered: {}", stats.successful_scenes);
    println!("  Failed: {}", stats.failed_scenes);
    println!("  Bands ingested: {}", stats.total_bands);
    println!("  Duration: {:.1}s", stats.duration.as_secs_f64());

    if !stats.errors.is_empty() {
        println!("\nErrors:");
        for error in &stats.errors {
            println!("  • {}", error);
        }
    }
}

/// Handle the cleanup-lists command
pub async fn handle_cleanup(args: CleanupArgs, config: &AppConfig) -> Result<()> {
    if !args.force && !args.dry_run && !confirm_cleanup(&args.list_ids)? {
        println!("Cancelled, no lists deleted");
        return Ok(());
    }

    let credential = config.credential()?;
    let session = M2mSession::new(&config.client_config(), credential, args.dry_run)?;
    session.open().await?;

    let mut failed = 0;
    for list_id in &args.list_ids {
        if release_list(&session, list_id).await {
            println!("  ✅ {}", list_id);
        } else {
            println!("  ❌ {}", list_id);
            failed += 1;
        }
    }

    session.close().await;

    if failed > 0 {
        warn!("{} of {} lists could not be deleted", failed, args.list_ids.len());
        return Err(AppError::generic(format!(
            "{} of {} scene lists could not be deleted",
            failed,
            args.list_ids.len()
        )));
    }

    Ok(())
}

fn confirm_cleanup(list_ids: &[String]) -> Result<bool> {
    println!("The following scene lists will be deleted:");
    for list_id in list_ids {
        println!("  {}", list_id);
    }
    print!("Continue? [y/N]: ");
    io::stdout().flush().map_err(AppError::Io)?;

    let mut response = String::new();
    io::stdin().read_line(&mut response).map_err(AppError::Io)?;

    Ok(response.trim().to_lowercase().starts_with('y'))
}
