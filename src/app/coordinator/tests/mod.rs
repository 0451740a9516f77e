//! Unit tests for the ingestion coordinator
//!
//! These tests drive the coordinator against an in-process catalog double.
//! End-to-end runs against a stub HTTP server are located in the top-level
//! tests directory.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tempfile::TempDir;

use crate::app::client::api::SecondaryDownload;
use crate::app::client::{
    CatalogApi, ClientConfig, DownloadOption, DownloadRequestResponse, SceneSummary,
};
use crate::app::client::api::AvailableDownload;
use crate::app::download::DownloadManager;
use crate::app::metadata::MetadataParser;
use crate::app::models::{DownloadCandidate, DownloadStatus, Polygon, SceneFilter};
use crate::app::raster::Raster2PgsqlIngestor;
use crate::app::store::MemoryStore;
use crate::constants::bands;
use crate::errors::{AppError, AuthError, AuthResult, SessionError, SessionResult};

use super::*;

const OLI_SCENE_A: &str = "LC09_L2SP_004053_20260130_20260131_02_T1";
const OLI_SCENE_B: &str = "LC08_L2SP_004053_20260122_20260201_02_T1";

/// Catalog double with configurable failures
///
/// Datasets missing from `scenes` fail their search. Download options offer
/// one secondary download per tag in `bands` for every member of the most
/// recently populated list.
#[derive(Default)]
struct MockCatalog {
    fail_login: bool,
    fail_options: bool,
    scenes: HashMap<String, Vec<SceneSummary>>,
    bands: Vec<&'static str>,
    opens: AtomicU32,
    closes: AtomicU32,
    searches: AtomicU32,
    deletes: AtomicU32,
    lists: Mutex<Vec<Vec<String>>>,
}

impl MockCatalog {
    fn with_scenes(dataset: &str, entity_ids: &[&str]) -> Self {
        let mut scenes = HashMap::new();
        scenes.insert(
            dataset.to_string(),
            entity_ids
                .iter()
                .map(|id| SceneSummary {
                    entity_id: id.to_string(),
                    display_id: None,
                })
                .collect(),
        );
        Self {
            scenes,
            ..Default::default()
        }
    }

    fn listed(&self) -> Vec<Vec<String>> {
        self.lists.lock().unwrap().clone()
    }
}

fn remote_error(endpoint: &str) -> SessionError {
    SessionError::RemoteApi {
        endpoint: endpoint.to_string(),
        code: "SERVER_ERROR".to_string(),
        message: "unavailable".to_string(),
    }
}

#[async_trait]
impl CatalogApi for MockCatalog {
    async fn open(&self) -> AuthResult<()> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self.fail_login {
            return Err(AuthError::Rejected {
                code: "AUTH_INVALID".to_string(),
                message: "bad token".to_string(),
            });
        }
        Ok(())
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }

    async fn search_scenes(
        &self,
        dataset: &str,
        _filter: &SceneFilter,
        _max_results: u32,
    ) -> SessionResult<Vec<SceneSummary>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        self.scenes
            .get(dataset)
            .cloned()
            .ok_or_else(|| remote_error("scene-search"))
    }

    async fn add_to_list(
        &self,
        _list_id: &str,
        _dataset: &str,
        entity_ids: &[String],
    ) -> SessionResult<()> {
        self.lists.lock().unwrap().push(entity_ids.to_vec());
        Ok(())
    }

    async fn get_download_options(
        &self,
        _list_id: &str,
        _dataset: &str,
        _file_type: &str,
    ) -> SessionResult<Vec<DownloadOption>> {
        if self.fail_options {
            return Err(remote_error("download-options"));
        }

        let members = self.listed().pop().unwrap_or_default();
        Ok(members
            .iter()
            .map(|entity_id| DownloadOption {
                entity_id: entity_id.clone(),
                id: Some(format!("product:{}", entity_id)),
                display_id: Some(entity_id.clone()),
                secondary_downloads: self
                    .bands
                    .iter()
                    .map(|band| SecondaryDownload {
                        id: format!("product:{}_{}", entity_id, band),
                        entity_id: format!("{}_{}", entity_id, band),
                        display_id: Some(format!("{}_{}", entity_id, band)),
                    })
                    .collect(),
            })
            .collect())
    }

    async fn request_downloads(
        &self,
        candidates: &[DownloadCandidate],
        _label: &str,
    ) -> SessionResult<DownloadRequestResponse> {
        Ok(DownloadRequestResponse {
            available_downloads: candidates
                .iter()
                .map(|candidate| AvailableDownload {
                    url: format!(
                        "https://dry-run.invalid/{}",
                        candidate.product_id.trim_start_matches("product:")
                    ),
                })
                .collect(),
            ..Default::default()
        })
    }

    async fn delete_list(&self, _list_id: &str) -> SessionResult<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Filter over a small square around the test scenes
fn test_filter() -> SceneFilter {
    let aoi = Polygon::from_ring(vec![
        [-68.0, 10.0],
        [-67.5, 10.0],
        [-67.5, 10.5],
        [-68.0, 10.5],
    ])
    .unwrap();
    SceneFilter::new(
        aoi,
        NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2026, 1, 31).unwrap(),
        0.0,
        40.0,
    )
    .unwrap()
}

/// Build a coordinator over one dataset with a scratch directory under `scratch`
fn create_coordinator(
    api: Arc<MockCatalog>,
    store: Arc<MemoryStore>,
    scratch: &TempDir,
    dry_run: bool,
) -> IngestionCoordinator {
    let config = CoordinatorConfig::default()
        .with_datasets(vec!["landsat_ot_c2_l2".to_string()])
        .with_scratch_dir(scratch.path().join("scenes"))
        .with_dry_run(dry_run);
    let downloader =
        DownloadManager::new(&ClientConfig::default(), Duration::from_secs(5), dry_run).unwrap();

    IngestionCoordinator::new(
        api,
        store,
        Arc::new(Raster2PgsqlIngestor::new("postgres://localhost/unused", dry_run)),
        downloader,
        MetadataParser::new(dry_run),
        config,
        test_filter(),
    )
}

#[tokio::test]
async fn test_auth_failure_ends_run() {
    let api = Arc::new(MockCatalog {
        fail_login: true,
        ..MockCatalog::with_scenes("landsat_ot_c2_l2", &[OLI_SCENE_A])
    });
    let scratch = TempDir::new().unwrap();
    let coordinator =
        create_coordinator(api.clone(), Arc::new(MemoryStore::new()), &scratch, false);

    let result = coordinator.run(None).await;

    assert!(matches!(result, Err(AppError::Auth(_))));
    assert_eq!(api.searches.load(Ordering::SeqCst), 0);
    assert_eq!(api.closes.load(Ordering::SeqCst), 1);
}

/// Test that a failing dataset search does not stop later datasets
///
/// The failure is recorded as a run error but not as a scene failure.
#[tokio::test]
async fn test_search_failure_is_contained() {
    let api = Arc::new(MockCatalog::with_scenes("landsat_etm_c2_l2", &[]));
    let scratch = TempDir::new().unwrap();
    let coordinator =
        create_coordinator(api.clone(), Arc::new(MemoryStore::new()), &scratch, false);

    let datasets = vec!["landsat_ot_c2_l2".to_string(), "landsat_etm_c2_l2".to_string()];
    let stats = coordinator.run(Some(datasets.as_slice())).await.unwrap();

    assert_eq!(api.searches.load(Ordering::SeqCst), 2);
    assert_eq!(stats.errors.len(), 1);
    assert!(stats.errors[0].starts_with("landsat_ot_c2_l2"));
    assert_eq!(stats.failed_scenes, 0);
    assert_eq!(api.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_no_new_scenes_creates_no_list() {
    let api = Arc::new(MockCatalog::with_scenes(
        "landsat_ot_c2_l2",
        &[OLI_SCENE_A, OLI_SCENE_B],
    ));
    let store = Arc::new(MemoryStore::with_existing([OLI_SCENE_A, OLI_SCENE_B]));
    let scratch = TempDir::new().unwrap();
    let coordinator = create_coordinator(api.clone(), store.clone(), &scratch, false);

    let stats = coordinator.run(None).await.unwrap();

    assert_eq!(stats.total_scenes, 2);
    assert_eq!(stats.skipped_scenes, 2);
    assert_eq!(stats.processed_scenes(), 0);
    assert!(api.listed().is_empty());
    assert_eq!(api.deletes.load(Ordering::SeqCst), 0);
    assert_eq!(store.scene_count(), 2);
}

#[tokio::test]
async fn test_duplicate_search_hits_are_listed_once() {
    let api = Arc::new(MockCatalog::with_scenes(
        "landsat_ot_c2_l2",
        &[OLI_SCENE_A, OLI_SCENE_A],
    ));
    let scratch = TempDir::new().unwrap();
    let coordinator =
        create_coordinator(api.clone(), Arc::new(MemoryStore::new()), &scratch, false);

    let stats = coordinator.run(None).await.unwrap();

    assert_eq!(stats.total_scenes, 2);
    assert_eq!(api.listed(), vec![vec![OLI_SCENE_A.to_string()]]);
    assert_eq!(stats.failed_scenes, 1);
}

/// Test that a scene without matching bands fails with a scene-level log row
///
/// The list is still released exactly once.
#[tokio::test]
async fn test_scene_without_bands_fails_and_is_logged() {
    let api = Arc::new(MockCatalog::with_scenes("landsat_ot_c2_l2", &[OLI_SCENE_A]));
    let store = Arc::new(MemoryStore::new());
    let scratch = TempDir::new().unwrap();
    let coordinator = create_coordinator(api.clone(), store.clone(), &scratch, false);

    let stats = coordinator.run(None).await.unwrap();

    assert_eq!(stats.failed_scenes, 1);
    assert_eq!(stats.successful_scenes, 0);
    assert!(!stats.is_success());
    assert_eq!(api.deletes.load(Ordering::SeqCst), 1);

    let log = store.log_entries();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].entity_id, OLI_SCENE_A);
    assert_eq!(log[0].band_name, bands::SCENE_ERROR);
    assert_eq!(log[0].status, DownloadStatus::Failed);
    assert_eq!(log[0].source_url, bands::NO_URL);
}

#[tokio::test]
async fn test_options_failure_fails_every_scene() {
    let api = Arc::new(MockCatalog {
        fail_options: true,
        ..MockCatalog::with_scenes("landsat_ot_c2_l2", &[OLI_SCENE_A, OLI_SCENE_B])
    });
    let store = Arc::new(MemoryStore::new());
    let scratch = TempDir::new().unwrap();
    let coordinator = create_coordinator(api.clone(), store.clone(), &scratch, false);

    let stats = coordinator.run(None).await.unwrap();

    assert_eq!(stats.failed_scenes, 2);
    assert_eq!(stats.errors.len(), 2);
    assert_eq!(api.deletes.load(Ordering::SeqCst), 1);
    assert_eq!(store.log_entries().len(), 2);
}

/// Test that a dry run walks the full pipeline without side effects
///
/// Every offered OLI band except the metadata file counts as ingested, while
/// the store and the scratch directory stay untouched.
#[tokio::test]
async fn test_dry_run_produces_statistics_without_side_effects() {
    let api = Arc::new(MockCatalog {
        bands: vec![
            "SR_B3",
            "SR_B6",
            "QA_PIXEL",
            "QA_RADSAT",
            "SR_QA_AEROSOL",
            "MTL.txt",
        ],
        ..MockCatalog::with_scenes("landsat_ot_c2_l2", &[OLI_SCENE_A, OLI_SCENE_B])
    });
    let store = Arc::new(MemoryStore::new());
    let scratch = TempDir::new().unwrap();
    let coordinator = create_coordinator(api.clone(), store.clone(), &scratch, true);

    let stats = coordinator.run(None).await.unwrap();

    assert_eq!(stats.total_scenes, 2);
    assert_eq!(stats.successful_scenes, 2);
    assert_eq!(stats.failed_scenes, 0);
    assert_eq!(stats.total_bands, 10);
    assert!(stats.is_success());

    assert_eq!(store.scene_count(), 0);
    assert!(store.log_entries().is_empty());
    assert!(store.bands().is_empty());
    assert!(!scratch.path().join("scenes").exists());
}

/// Test that the ETM+ band set is chosen from the entity id prefix
#[tokio::test]
async fn test_band_set_follows_sensor_family() {
    let api = Arc::new(MockCatalog {
        bands: vec!["SR_B3", "SR_B6", "MTL.txt"],
        ..MockCatalog::with_scenes(
            "landsat_etm_c2_l2",
            &["LE07_L2SP_004053_20200115_20200210_02_T1"],
        )
    });
    let scratch = TempDir::new().unwrap();
    let coordinator = create_coordinator(api.clone(), Arc::new(MemoryStore::new()), &scratch, true);

    let datasets = vec!["landsat_etm_c2_l2".to_string()];
    let stats = coordinator.run(Some(datasets.as_slice())).await.unwrap();

    // Only the metadata file matches the ETM+ set, so no raster is loaded
    assert_eq!(stats.successful_scenes, 1);
    assert_eq!(stats.total_bands, 0);
}
