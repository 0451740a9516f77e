//! Ingestion orchestration
//!
//! This module drives one run of the pipeline: authenticate, then for every
//! dataset search the catalog, drop scenes the store already knows, and put
//! the remainder through the per-scene pipeline inside a temporary scene list.
//!
//! # Architecture
//!
//! - [`config`] - Coordinator configuration and band sets per sensor family
//! - [`stats`] - Run statistics aggregated across datasets
//! - `scene` - The per-scene download, parse and register pipeline
//!
//! Datasets and scenes are processed one at a time; the only concurrency is
//! inside the download manager. A failing scene is counted and logged and the
//! run moves on. A failing dataset is recorded and the next dataset runs. Only
//! authentication failure ends the run early.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use landsat_ingest::app::{
//!     CoordinatorConfig, DownloadManager, IngestionCoordinator, MemoryStore, MetadataParser,
//!     M2mSession, Raster2PgsqlIngestor,
//! };
//! use landsat_ingest::app::client::ClientConfig;
//! use landsat_ingest::app::models::{Credential, Polygon, SceneFilter};
//! use landsat_ingest::constants::http::DOWNLOAD_TIMEOUT;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client_config = ClientConfig::default();
//! let session = M2mSession::new(&client_config, Credential::from_env()?, false)?;
//! let aoi = Polygon::from_ring(vec![[-68.0, 10.3], [-67.5, 10.3], [-67.5, 10.0], [-68.0, 10.0]])?;
//! let filter = SceneFilter::new(
//!     aoi,
//!     "2024-01-01".parse()?,
//!     "2024-01-31".parse()?,
//!     0.0,
//!     40.0,
//! )?;
//!
//! let coordinator = IngestionCoordinator::new(
//!     Arc::new(session),
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(Raster2PgsqlIngestor::new("postgres://localhost/landsat", false)),
//!     DownloadManager::new(&client_config, DOWNLOAD_TIMEOUT, false)?,
//!     MetadataParser::new(false),
//!     CoordinatorConfig::default(),
//!     filter,
//! );
//!
//! let stats = coordinator.run(None).await?;
//! println!("Registered {} scenes", stats.successful_scenes);
//! # Ok(())
//! # }
//! ```

pub mod config;
mod scene;
pub mod stats;

#[cfg(test)]
mod tests;

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::app::client::{generate_list_id, with_list, CatalogApi, SceneListHandle, SceneSummary};
use crate::app::download::DownloadManager;
use crate::app::metadata::MetadataParser;
use crate::app::models::{DownloadLogEntry, SceneFilter};
use crate::app::raster::RasterIngestor;
use crate::app::store::SceneStore;
use crate::constants::m2m;
use crate::errors::{AppError, Result};

pub use config::{BandSet, BandSets, CoordinatorConfig};
pub use stats::RunStatistics;

use scene::ScenePipeline;

/// Drives searches, deduplication and the per-scene pipeline
///
/// All collaborators are shared trait objects so the same coordinator runs
/// against the live API and database, or against in-process doubles.
pub struct IngestionCoordinator {
    api: Arc<dyn CatalogApi>,
    store: Arc<dyn SceneStore>,
    ingestor: Arc<dyn RasterIngestor>,
    downloader: DownloadManager,
    parser: MetadataParser,
    config: CoordinatorConfig,
    filter: SceneFilter,
}

impl IngestionCoordinator {
    pub fn new(
        api: Arc<dyn CatalogApi>,
        store: Arc<dyn SceneStore>,
        ingestor: Arc<dyn RasterIngestor>,
        downloader: DownloadManager,
        parser: MetadataParser,
        config: CoordinatorConfig,
        filter: SceneFilter,
    ) -> Self {
        Self {
            api,
            store,
            ingestor,
            downloader,
            parser,
            config,
            filter,
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Run the pipeline over `datasets`, or the configured datasets when `None`
    ///
    /// # Errors
    ///
    /// Returns `AppError::Auth` if the session cannot be opened. Every other
    /// failure is contained and reported through the returned statistics.
    pub async fn run(&self, datasets: Option<&[String]>) -> Result<RunStatistics> {
        let datasets = datasets.unwrap_or(self.config.datasets.as_slice());
        let mut stats = RunStatistics::default();

        if self.config.dry_run {
            info!("DRY-RUN: no lists, downloads or database writes will be made");
        }

        if let Err(e) = self.api.open().await {
            error!("Authentication failed: {}", e);
            self.api.close().await;
            return Err(AppError::Auth(e));
        }

        for dataset in datasets {
            info!(dataset = %dataset, "Processing dataset");
            let dataset_stats = self.process_dataset(dataset).await;
            info!(
                dataset = %dataset,
                "Dataset done: {} found, {} registered, {} failed, {} already present",
                dataset_stats.total_scenes,
                dataset_stats.successful_scenes,
                dataset_stats.failed_scenes,
                dataset_stats.skipped_scenes
            );
            stats.merge(dataset_stats);
        }

        self.api.close().await;
        stats.finish();

        info!(
            "Run complete: {} scenes found, {} registered, {} failed, {} bands in {:.1}s",
            stats.total_scenes,
            stats.successful_scenes,
            stats.failed_scenes,
            stats.total_bands,
            stats.duration.as_secs_f64()
        );
        Ok(stats)
    }

    async fn process_dataset(&self, dataset: &str) -> RunStatistics {
        let mut stats = RunStatistics::default();

        let scenes = match self
            .api
            .search_scenes(dataset, &self.filter, self.config.max_results)
            .await
        {
            Ok(scenes) => scenes,
            Err(e) => {
                warn!(dataset = %dataset, "Search failed: {}", e);
                stats.record_error(dataset, e);
                return stats;
            }
        };
        stats.total_scenes = scenes.len();
        info!(dataset = %dataset, "Found {} scenes", scenes.len());

        let new_scenes = match self.new_scenes(scenes).await {
            Ok(new_scenes) => new_scenes,
            Err(e) => {
                warn!(dataset = %dataset, "Deduplication failed: {}", e);
                stats.record_error(dataset, e);
                return stats;
            }
        };
        stats.skipped_scenes = stats.total_scenes - new_scenes.len();

        if new_scenes.is_empty() {
            info!(dataset = %dataset, "No new scenes");
            return stats;
        }

        let entity_ids: Vec<String> = new_scenes
            .iter()
            .map(|scene| scene.entity_id.clone())
            .collect();
        let list_id = generate_list_id(dataset);
        info!(
            dataset = %dataset,
            list_id = %list_id,
            "Processing {} new scenes",
            entity_ids.len()
        );

        let outcome = with_list(
            self.api.as_ref(),
            &list_id,
            dataset,
            &entity_ids,
            |list| self.process_list(list, &new_scenes),
        )
        .await;

        match outcome {
            Ok(list_stats) => stats.merge(list_stats),
            Err(e) => {
                warn!(list_id = %list_id, "Scene list could not be populated: {}", e);
                let pipeline = self.pipeline();
                for scene in &new_scenes {
                    stats.record_failure(&scene.entity_id, &e);
                    pipeline
                        .write_log(&DownloadLogEntry::scene_failure(
                            scene.entity_id.as_str(),
                            e.to_string(),
                        ))
                        .await;
                }
            }
        }

        stats
    }

    /// Scenes not yet in the store, first occurrence of each entity id kept
    async fn new_scenes(&self, scenes: Vec<SceneSummary>) -> Result<Vec<SceneSummary>> {
        let entity_ids: Vec<String> = scenes.iter().map(|scene| scene.entity_id.clone()).collect();
        let existing = self.store.existing_entity_ids(&entity_ids).await?;

        let mut seen = HashSet::new();
        Ok(scenes
            .into_iter()
            .filter(|scene| !existing.contains(&scene.entity_id))
            .filter(|scene| seen.insert(scene.entity_id.clone()))
            .collect())
    }

    async fn process_list(
        &self,
        list: SceneListHandle<'_>,
        scenes: &[SceneSummary],
    ) -> RunStatistics {
        let mut stats = RunStatistics::default();
        let pipeline = self.pipeline();

        let options = match list.download_options(m2m::BAND_FILE_TYPE).await {
            Ok(options) => options,
            Err(e) => {
                warn!(list_id = %list.list_id(), "Download options unavailable: {}", e);
                for scene in scenes {
                    stats.record_failure(&scene.entity_id, &e);
                    pipeline
                        .write_log(&DownloadLogEntry::scene_failure(
                            scene.entity_id.as_str(),
                            e.to_string(),
                        ))
                        .await;
                }
                return stats;
            }
        };

        for scene in scenes {
            match pipeline.process(scene, list.dataset(), &options).await {
                Ok(bands) => stats.record_success(bands),
                Err(e) => {
                    warn!(entity_id = %scene.entity_id, "Scene failed: {}", e);
                    stats.record_failure(&scene.entity_id, &e);
                    pipeline
                        .write_log(&DownloadLogEntry::scene_failure(
                            scene.entity_id.as_str(),
                            e.to_string(),
                        ))
                        .await;
                }
            }
        }

        stats
    }

    fn pipeline(&self) -> ScenePipeline<'_> {
        ScenePipeline {
            api: self.api.as_ref(),
            store: self.store.as_ref(),
            ingestor: self.ingestor.as_ref(),
            downloader: &self.downloader,
            parser: &self.parser,
            config: &self.config,
        }
    }
}
