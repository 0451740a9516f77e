//! Command-line interface components
//!
//! This module contains CLI-specific code for the Landsat ingestion
//! application: argument parsing and the command handlers.

pub mod args;
pub mod commands;

pub use args::{CleanupArgs, Cli, Commands, GlobalArgs, IngestArgs};
pub use commands::{handle_cleanup, handle_ingest};
