//! In-process store

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::debug;

use super::{checked_identifier, SceneStore};
use crate::app::metadata::SceneRecord;
use crate::app::models::{BandRecord, DownloadLogEntry};
use crate::errors::StoreResult;

#[derive(Debug, Default)]
struct MemoryState {
    scenes: BTreeMap<String, (i64, SceneRecord)>,
    preexisting: HashSet<String>,
    next_id: i64,
    log: Vec<DownloadLogEntry>,
    bands: Vec<BandRecord>,
}

/// Store backed by process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that already knows the given entity ids
    pub fn with_existing<I, S>(entity_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let store = Self::new();
        store.lock().preexisting = entity_ids.into_iter().map(Into::into).collect();
        store
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of known scenes, preexisting ones included
    pub fn scene_count(&self) -> usize {
        let state = self.lock();
        state
            .preexisting
            .iter()
            .filter(|id| !state.scenes.contains_key(*id))
            .count()
            + state.scenes.len()
    }

    pub fn scene(&self, entity_id: &str) -> Option<SceneRecord> {
        self.lock()
            .scenes
            .get(entity_id)
            .map(|(_, record)| record.clone())
    }

    pub fn log_entries(&self) -> Vec<DownloadLogEntry> {
        self.lock().log.clone()
    }

    pub fn bands(&self) -> Vec<BandRecord> {
        self.lock().bands.clone()
    }
}

#[async_trait]
impl SceneStore for MemoryStore {
    async fn existing_entity_ids(&self, entity_ids: &[String]) -> StoreResult<HashSet<String>> {
        let state = self.lock();
        Ok(entity_ids
            .iter()
            .filter(|id| state.scenes.contains_key(*id) || state.preexisting.contains(*id))
            .cloned()
            .collect())
    }

    async fn upsert_scene(&self, scene: &SceneRecord) -> StoreResult<i64> {
        let mut state = self.lock();

        if let Some((scene_id, existing)) = state.scenes.get_mut(&scene.entity_id) {
            existing.cloud_cover = scene.cloud_cover;
            existing.sun_azimuth = scene.sun_azimuth;
            existing.sun_elevation = scene.sun_elevation;
            return Ok(*scene_id);
        }

        state.next_id += 1;
        let scene_id = state.next_id;
        state
            .scenes
            .insert(scene.entity_id.clone(), (scene_id, scene.clone()));
        debug!("Registered scene {} as {}", scene.entity_id, scene_id);
        Ok(scene_id)
    }

    async fn log_download(&self, entry: &DownloadLogEntry) -> StoreResult<()> {
        self.lock().log.push(entry.clone());
        Ok(())
    }

    async fn attach_band(&self, band: &BandRecord, staging_table: &str) -> StoreResult<()> {
        checked_identifier(staging_table)?;
        checked_identifier(&band.target_table())?;
        self.lock().bands.push(band.clone());
        Ok(())
    }

    async fn discard_staging(&self, staging_table: &str) -> StoreResult<()> {
        checked_identifier(staging_table)?;
        Ok(())
    }
}
