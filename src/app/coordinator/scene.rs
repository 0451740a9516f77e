//! Per-scene pipeline: download, parse, register, clean up

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::app::client::api::filter_candidates;
use crate::app::client::{CatalogApi, DownloadOption, SceneSummary};
use crate::app::download::{filename, DownloadManager};
use crate::app::metadata::{is_metadata_file, MetadataParser, SceneRecord};
use crate::app::models::{band_name_from_filename, BandRecord, DownloadLogEntry, DownloadResult, SensorFamily};
use crate::app::raster::{staging_table_name, RasterIngestor};
use crate::app::store::SceneStore;
use crate::constants::{bands, dry_run};
use crate::errors::{SceneError, SceneResult};

use super::config::CoordinatorConfig;

/// A downloaded file with its derived band name
struct BandFile {
    band_name: String,
    path: PathBuf,
    url: String,
}

impl BandFile {
    fn is_metadata(&self) -> bool {
        self.band_name == bands::METADATA || is_metadata_file(&self.path)
    }
}

/// Collaborators borrowed for the duration of one dataset
pub(super) struct ScenePipeline<'a> {
    pub api: &'a dyn CatalogApi,
    pub store: &'a dyn SceneStore,
    pub ingestor: &'a dyn RasterIngestor,
    pub downloader: &'a DownloadManager,
    pub parser: &'a MetadataParser,
    pub config: &'a CoordinatorConfig,
}

impl<'a> ScenePipeline<'a> {
    /// Run one scene end to end; returns the number of bands ingested
    pub async fn process(
        &self,
        scene: &SceneSummary,
        dataset: &str,
        options: &[DownloadOption],
    ) -> SceneResult<usize> {
        let entity_id = scene.entity_id.as_str();
        let family = SensorFamily::from_entity_id(entity_id)
            .or_else(|| SensorFamily::from_entity_id(scene.display_id()));
        let band_tags = self.config.bands.for_family(family).tags();
        debug!(
            entity_id = %entity_id,
            "Sensor family {}",
            family.map(|f| f.label()).unwrap_or("unknown")
        );

        let candidates = filter_candidates(options, entity_id, &band_tags);
        if candidates.is_empty() {
            return Err(SceneError::NoBandsAvailable {
                entity_id: entity_id.to_string(),
            });
        }

        let response = self.api.request_downloads(&candidates, entity_id).await?;
        if !response.preparing_downloads.is_empty() {
            info!(
                entity_id = %entity_id,
                "{} downloads still preparing; not waiting for them",
                response.preparing_downloads.len()
            );
        }
        let urls = response.urls();
        if urls.is_empty() {
            return Err(SceneError::NoDownloadsAvailable {
                entity_id: entity_id.to_string(),
            });
        }

        let scratch = self.config.scratch_dir.join(entity_id);
        let outcome = self.fetch_and_register(scene, dataset, &urls, &scratch).await;
        self.remove_scratch(&scratch).await;
        outcome
    }

    async fn fetch_and_register(
        &self,
        scene: &SceneSummary,
        dataset: &str,
        urls: &[String],
        scratch: &Path,
    ) -> SceneResult<usize> {
        let entity_id = scene.entity_id.as_str();
        let results = self
            .downloader
            .fetch_all(urls, scratch, entity_id, self.config.concurrency)
            .await;

        let mut files = Vec::new();
        for result in &results {
            if let Some(file) = self.log_result(result).await {
                files.push(file);
            }
        }

        if files.is_empty() {
            return Err(SceneError::NoSuccessfulDownloads {
                entity_id: entity_id.to_string(),
            });
        }

        let metadata = files
            .iter()
            .find(|file| file.is_metadata())
            .ok_or_else(|| SceneError::MetadataMissing {
                entity_id: entity_id.to_string(),
            })?;

        let mut record = self.parser.parse_scene(&metadata.path).await?;
        self.align_record(&mut record, scene, dataset);

        let scene_id = if self.config.dry_run {
            info!("DRY-RUN: would register scene {}", record.entity_id);
            dry_run::SCENE_ID
        } else {
            self.store.upsert_scene(&record).await?
        };

        // Band tables are per year; without a date the scene stays registered bandless
        let Some(acquisition_year) = record.acquisition_year() else {
            let reason = SceneError::MissingAcquisitionDate {
                entity_id: entity_id.to_string(),
            }
            .to_string();
            warn!(entity_id = %entity_id, "{}; skipping band loads", reason);
            for file in files.iter().filter(|file| !file.is_metadata()) {
                self.write_log(&DownloadLogEntry::band_failure(
                    entity_id,
                    file.band_name.as_str(),
                    file.url.as_str(),
                    reason.as_str(),
                ))
                .await;
            }
            return Ok(0);
        };

        let mut ingested = 0;
        for file in files.iter().filter(|file| !file.is_metadata()) {
            let band = BandRecord {
                scene_id,
                band_name: file.band_name.clone(),
                acquisition_year,
                raster_path: file.path.clone(),
            };
            if self.load_band(&band).await {
                ingested += 1;
            }
        }

        info!(
            entity_id = %entity_id,
            "Registered scene {} with {} bands",
            scene_id,
            ingested
        );
        Ok(ingested)
    }

    /// Key the record by the catalog's identifiers and the dataset searched
    fn align_record(&self, record: &mut SceneRecord, scene: &SceneSummary, dataset: &str) {
        if record.entity_id != scene.entity_id {
            debug!(
                "Metadata id {} recorded under catalog id {}",
                record.entity_id, scene.entity_id
            );
            record.entity_id = scene.entity_id.clone();
        }
        record.dataset_name = dataset.to_string();
    }

    /// Log one download outcome; returns the file when it is usable
    async fn log_result(&self, result: &DownloadResult) -> Option<BandFile> {
        let band_name = result
            .file_name()
            .and_then(band_name_from_filename)
            .or_else(|| filename::from_url(&result.url).and_then(|name| band_name_from_filename(&name)));

        let (entry, file) = match (&result.path, band_name) {
            (Some(path), Some(band_name)) if result.success => (
                DownloadLogEntry::from_result(result, band_name.clone()),
                Some(BandFile {
                    band_name,
                    path: path.clone(),
                    url: result.url.clone(),
                }),
            ),
            (Some(path), None) if result.success => {
                warn!("No band name in {}", path.display());
                let unparsable = DownloadResult::failed(
                    result.entity_id.clone(),
                    result.url.clone(),
                    format!("Unrecognised band filename: {}", path.display()),
                    result.duration,
                );
                (
                    DownloadLogEntry::from_result(&unparsable, bands::UNKNOWN),
                    None,
                )
            }
            (_, band_name) => (
                DownloadLogEntry::from_result(
                    result,
                    band_name.unwrap_or_else(|| bands::UNKNOWN.to_string()),
                ),
                None,
            ),
        };

        self.write_log(&entry).await;
        file
    }

    /// Append a log row; failures to log never fail the scene
    pub async fn write_log(&self, entry: &DownloadLogEntry) {
        if self.config.dry_run {
            debug!(
                "DRY-RUN: would log {} {} as {}",
                entry.entity_id,
                entry.band_name,
                entry.status.as_str()
            );
            return;
        }

        if let Err(e) = self.store.log_download(entry).await {
            warn!(
                entity_id = %entry.entity_id,
                band = %entry.band_name,
                "Failed to write download log: {}",
                e
            );
        }
    }

    /// Stage and attach one band; failures are logged, not propagated
    async fn load_band(&self, band: &BandRecord) -> bool {
        let staging = staging_table_name();

        if let Err(e) = self.ingestor.ingest_raster(&band.raster_path, &staging).await {
            warn!(band = %band.band_name, "Raster load failed: {}", e);
            if !self.config.dry_run {
                if let Err(e) = self.store.discard_staging(&staging).await {
                    warn!("Failed to drop staging table {}: {}", staging, e);
                }
            }
            return false;
        }

        if self.config.dry_run {
            info!(
                "DRY-RUN: would copy {} into {}",
                band.band_name,
                band.target_table()
            );
            return true;
        }

        match self.store.attach_band(band, &staging).await {
            Ok(()) => true,
            Err(e) => {
                warn!(band = %band.band_name, "Failed to attach band: {}", e);
                false
            }
        }
    }

    async fn remove_scratch(&self, scratch: &Path) {
        if self.config.dry_run {
            return;
        }
        match tokio::fs::remove_dir_all(scratch).await {
            Ok(()) => debug!("Removed {}", scratch.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {}: {}", scratch.display(), e),
        }
    }
}
