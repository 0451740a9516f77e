//! Persistent store for scenes, band rasters and the download log
//!
//! The pipeline only talks to [`SceneStore`]. [`PostgresStore`] is the
//! production backend; [`MemoryStore`] keeps everything in process and is
//! used by tests and by dry runs without a database.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::app::metadata::SceneRecord;
use crate::app::models::{BandRecord, DownloadLogEntry};
use crate::errors::{StoreError, StoreResult};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

/// Scene registration and download bookkeeping
#[async_trait]
pub trait SceneStore: Send + Sync {
    /// Subset of `entity_ids` already registered
    async fn existing_entity_ids(&self, entity_ids: &[String]) -> StoreResult<HashSet<String>>;

    /// Insert a scene, or refresh cloud cover and sun angles of an existing
    /// one; returns the surrogate scene id
    async fn upsert_scene(&self, scene: &SceneRecord) -> StoreResult<i64>;

    /// Append one download log row
    async fn log_download(&self, entry: &DownloadLogEntry) -> StoreResult<()>;

    /// Copy a staged raster into the band's per-year table and drop staging
    async fn attach_band(&self, band: &BandRecord, staging_table: &str) -> StoreResult<()>;

    /// Drop a staging table left behind by a failed load
    async fn discard_staging(&self, staging_table: &str) -> StoreResult<()>;
}

/// Reject table names that cannot be interpolated into SQL verbatim
pub fn checked_identifier(name: &str) -> StoreResult<&str> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && !name.ends_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');

    if valid {
        Ok(name)
    } else {
        Err(StoreError::InvalidIdentifier {
            name: name.to_string(),
        })
    }
}
