//! Command-line argument parsing for the Landsat ingestion pipeline
//!
//! This module defines the CLI structure using clap derive macros: one
//! command runs an ingestion over a date range, the other removes scene
//! lists left behind on the remote catalog.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

/// Landsat Ingest - acquire and register Landsat scenes
#[derive(Parser, Debug)]
#[command(
    name = "landsat_ingest",
    version,
    about = "Acquire Landsat Collection 2 scenes from USGS M2M and register them in PostGIS",
    long_about = "Searches the USGS Machine-to-Machine catalog for Landsat scenes over an area of interest,
downloads the configured bands of every scene not yet registered, and loads scene metadata and
rasters into PostgreSQL/PostGIS. Runs are idempotent: registered scenes are skipped."
)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all subcommands
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Very verbose logging (debug level)
    #[arg(long, global = true)]
    pub very_verbose: bool,

    /// Quiet mode - suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file path
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search, download and register scenes for a date range
    Ingest(IngestArgs),

    /// Delete scene lists left behind by interrupted runs
    CleanupLists(CleanupArgs),
}

/// Arguments for the ingest command
#[derive(Args, Debug, Clone)]
pub struct IngestArgs {
    /// First acquisition date (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    pub start: NaiveDate,

    /// Last acquisition date, inclusive (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    pub end: NaiveDate,

    /// Maximum cloud cover in percent
    #[arg(long, value_name = "PERCENT")]
    pub clouds: Option<f64>,

    /// Datasets to search instead of the configured ones
    #[arg(long, value_name = "DATASET", num_args = 1..)]
    pub datasets: Vec<String>,

    /// Simulate lists, downloads, database writes and raster loads
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the cleanup-lists command
#[derive(Args, Debug, Clone)]
pub struct CleanupArgs {
    /// Scene list identifiers to delete
    #[arg(long = "list-id", value_name = "ID", required = true)]
    pub list_ids: Vec<String>,

    /// Show what would be deleted without deleting
    #[arg(long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub force: bool,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the logging level, letting flags override the configured level
    pub fn log_level(&self, configured: &str) -> String {
        if self.global.quiet {
            "error".to_string()
        } else if self.global.very_verbose {
            "debug".to_string()
        } else if self.global.verbose {
            "info".to_string()
        } else {
            configured.to_string()
        }
    }
}

impl IngestArgs {
    /// Check the date range and cloud cover bound
    pub fn validate(&self) -> Result<(), String> {
        if self.start > self.end {
            return Err(format!(
                "Start date {} is after end date {}",
                self.start, self.end
            ));
        }

        if let Some(clouds) = self.clouds {
            if !(0.0..=100.0).contains(&clouds) {
                return Err(format!("Cloud cover {} must be between 0 and 100", clouds));
            }
        }

        Ok(())
    }

    /// Datasets named on the command line, if any
    pub fn dataset_override(&self) -> Option<&[String]> {
        (!self.datasets.is_empty()).then_some(self.datasets.as_slice())
    }
}
