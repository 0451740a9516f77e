//! Run statistics aggregated across datasets and scenes

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Aggregated outcome of an ingestion run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatistics {
    /// Scenes returned by the searches
    pub total_scenes: usize,
    /// Band rasters handed to the store
    pub total_bands: usize,
    /// Scenes downloaded, parsed and registered
    pub successful_scenes: usize,
    /// Scenes that failed somewhere in their pipeline
    pub failed_scenes: usize,
    /// Scenes skipped because they were already registered
    pub skipped_scenes: usize,
    /// One message per contained failure
    pub errors: Vec<String>,
    /// Start of the run
    pub started_at: DateTime<Utc>,
    /// Wall time of the run
    pub duration: Duration,
}

impl Default for RunStatistics {
    fn default() -> Self {
        Self {
            total_scenes: 0,
            total_bands: 0,
            successful_scenes: 0,
            failed_scenes: 0,
            skipped_scenes: 0,
            errors: Vec::new(),
            started_at: Utc::now(),
            duration: Duration::ZERO,
        }
    }
}

impl RunStatistics {
    /// Fold another set of counters into this one, keeping this start time
    pub fn merge(&mut self, other: RunStatistics) {
        self.total_scenes += other.total_scenes;
        self.total_bands += other.total_bands;
        self.successful_scenes += other.successful_scenes;
        self.failed_scenes += other.failed_scenes;
        self.skipped_scenes += other.skipped_scenes;
        self.errors.extend(other.errors);
    }

    pub fn record_success(&mut self, bands: usize) {
        self.successful_scenes += 1;
        self.total_bands += bands;
    }

    pub fn record_failure(&mut self, entity_id: &str, error: impl std::fmt::Display) {
        self.failed_scenes += 1;
        self.errors.push(format!("{}: {}", entity_id, error));
    }

    /// Record a failure not attributable to a single scene
    pub fn record_error(&mut self, context: &str, error: impl std::fmt::Display) {
        self.errors.push(format!("{}: {}", context, error));
    }

    /// Scenes that went through the pipeline
    pub fn processed_scenes(&self) -> usize {
        self.successful_scenes + self.failed_scenes
    }

    /// True when no scene failed
    pub fn is_success(&self) -> bool {
        self.failed_scenes == 0
    }

    /// Update duration from the start time
    pub fn finish(&mut self) {
        self.duration = Utc::now()
            .signed_duration_since(self.started_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
    }
}
