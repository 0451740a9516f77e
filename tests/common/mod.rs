//! Shared fixtures for the end-to-end pipeline tests
//!
//! `M2mStub` serves both the M2M JSON API and the band files the download
//! requests point at, so a whole run executes against one local server.

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::{Path as UrlPath, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use serde_json::{json, Value};

use landsat_ingest::app::client::ClientConfig;
use landsat_ingest::app::coordinator::{CoordinatorConfig, IngestionCoordinator};
use landsat_ingest::app::download::DownloadManager;
use landsat_ingest::app::metadata::MetadataParser;
use landsat_ingest::app::metadata::SceneRecord;
use landsat_ingest::app::models::{BandRecord, Credential, DownloadLogEntry, Polygon, SceneFilter};
use landsat_ingest::app::raster::RasterIngestor;
use landsat_ingest::app::retry::RetryPolicy;
use landsat_ingest::app::store::{MemoryStore, SceneStore};
use landsat_ingest::app::M2mSession;
use landsat_ingest::errors::{RasterError, RasterResult, StoreError, StoreResult};

pub const DATASET: &str = "landsat_ot_c2_l2";

/// Band files offered for every scene
pub const OFFERED_BANDS: [&str; 5] = ["SR_B3.TIF", "SR_B6.TIF", "QA_PIXEL.TIF", "SR_B2.TIF", "MTL.txt"];

/// A catalog scene: M2M entity id and Collection 2 product id
#[derive(Debug, Clone)]
pub struct StubScene {
    pub entity_id: &'static str,
    pub display_id: &'static str,
}

pub const SCENE_A: StubScene = StubScene {
    entity_id: "LC80040532026022LGN00",
    display_id: "LC08_L2SP_004053_20260122_20260201_02_T1",
};

pub const SCENE_B: StubScene = StubScene {
    entity_id: "LC90040532026030LGN00",
    display_id: "LC09_L2SP_004053_20260130_20260131_02_T1",
};

/// Behaviour switches and call counters of the stub
#[derive(Default)]
pub struct StubState {
    pub base_url: Mutex<String>,
    pub scenes: Vec<StubScene>,
    pub fail_list_add: bool,
    /// Serve a JSON error document instead of files of this scene
    pub broken_scene: Option<&'static str>,
    /// Serve metadata without acquisition date, path/row and corners
    pub sparse_metadata: bool,
    pub logins: AtomicU32,
    pub logouts: AtomicU32,
    pub list_adds: AtomicU32,
    pub list_removes: AtomicU32,
    pub file_fetches: AtomicU32,
    pub listed: Mutex<Vec<String>>,
}

impl StubState {
    pub fn new(scenes: Vec<StubScene>) -> Self {
        Self {
            scenes,
            ..Default::default()
        }
    }

    pub fn count(counter: &AtomicU32) -> u32 {
        counter.load(Ordering::SeqCst)
    }

    pub fn listed(&self) -> Vec<String> {
        self.listed.lock().unwrap().clone()
    }

    fn display_id(&self, entity_id: &str) -> String {
        self.scenes
            .iter()
            .find(|scene| scene.entity_id == entity_id)
            .map(|scene| scene.display_id.to_string())
            .unwrap_or_else(|| entity_id.to_string())
    }
}

fn envelope(data: Value) -> Json<Value> {
    Json(json!({ "data": data, "errorCode": null, "errorMessage": null }))
}

async fn login() -> Json<Value> {
    envelope(json!("stub-session-token"))
}

async fn logout(State(state): State<Arc<StubState>>) -> Json<Value> {
    state.logouts.fetch_add(1, Ordering::SeqCst);
    envelope(Value::Null)
}

async fn scene_search(State(state): State<Arc<StubState>>) -> Json<Value> {
    let results: Vec<Value> = state
        .scenes
        .iter()
        .map(|scene| json!({ "entityId": scene.entity_id, "displayId": scene.display_id }))
        .collect();
    envelope(json!({ "results": results, "totalHits": results.len() }))
}

async fn scene_list_add(
    State(state): State<Arc<StubState>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    state.list_adds.fetch_add(1, Ordering::SeqCst);
    if state.fail_list_add {
        return Json(json!({
            "data": null,
            "errorCode": "SCENE_LIST_ERROR",
            "errorMessage": "List could not be updated"
        }));
    }

    let ids: Vec<String> = body["entityIds"]
        .as_array()
        .map(|ids| {
            ids.iter()
                .filter_map(|id| id.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    let added = ids.len();
    state.listed.lock().unwrap().extend(ids);
    envelope(json!(added))
}

async fn scene_list_remove(State(state): State<Arc<StubState>>) -> Json<Value> {
    state.list_removes.fetch_add(1, Ordering::SeqCst);
    envelope(Value::Null)
}

async fn download_options(State(state): State<Arc<StubState>>) -> Json<Value> {
    let options: Vec<Value> = state
        .listed()
        .iter()
        .map(|entity_id| {
            let display_id = state.display_id(entity_id);
            let secondary: Vec<Value> = OFFERED_BANDS
                .iter()
                .map(|band| {
                    let file = format!("{}_{}", display_id, band);
                    json!({ "id": file, "entityId": format!("L2_{}", file), "displayId": file })
                })
                .collect();
            json!({
                "entityId": entity_id,
                "id": format!("product_{}", entity_id),
                "displayId": display_id,
                "secondaryDownloads": secondary
            })
        })
        .collect();
    envelope(json!(options))
}

async fn download_request(
    State(state): State<Arc<StubState>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    let base = state.base_url.lock().unwrap().clone();
    let available: Vec<Value> = body["downloads"]
        .as_array()
        .map(|downloads| {
            downloads
                .iter()
                .filter_map(|download| download["productId"].as_str())
                .map(|product| json!({ "url": format!("{}files/{}", base, product) }))
                .collect()
        })
        .unwrap_or_default();
    envelope(json!({
        "availableDownloads": available,
        "preparingDownloads": [],
        "failed": []
    }))
}

async fn serve_file(
    State(state): State<Arc<StubState>>,
    UrlPath(name): UrlPath<String>,
) -> impl IntoResponse {
    state.file_fetches.fetch_add(1, Ordering::SeqCst);

    let broken = state
        .broken_scene
        .map(|display_id| name.starts_with(display_id))
        .unwrap_or(false);
    if broken {
        return (
            [(header::CONTENT_TYPE, "application/json")],
            r#"{"errorMessage":"Download expired"}"#.to_string(),
        );
    }

    if name.ends_with("MTL.txt") {
        let display_id = name.trim_end_matches("_MTL.txt");
        let document = if state.sparse_metadata {
            sparse_mtl_document(display_id)
        } else {
            mtl_document(display_id)
        };
        return ([(header::CONTENT_TYPE, "text/plain")], document);
    }

    (
        [(header::CONTENT_TYPE, "image/tiff")],
        "II*\0 raster bytes".to_string(),
    )
}

/// A Collection 2 text metadata file for `display_id`
pub fn mtl_document(display_id: &str) -> String {
    let date = display_id.split('_').nth(3).unwrap_or("20260101");
    let date = format!("{}-{}-{}", &date[..4], &date[4..6], &date[6..8]);
    format!(
        r#"GROUP = LANDSAT_METADATA_FILE
  GROUP = PRODUCT_CONTENTS
    LANDSAT_PRODUCT_ID = "{display_id}"
    PROCESSING_LEVEL = "L2SP"
  END_GROUP = PRODUCT_CONTENTS
  GROUP = IMAGE_ATTRIBUTES
    SPACECRAFT_ID = "LANDSAT_9"
    SENSOR_ID = "OLI_TIRS"
    WRS_PATH = 4
    WRS_ROW = 53
    DATE_ACQUIRED = {date}
    CLOUD_COVER = 12.34
    SUN_AZIMUTH = 131.2
    SUN_ELEVATION = 55.8
  END_GROUP = IMAGE_ATTRIBUTES
  GROUP = PROJECTION_ATTRIBUTES
    CORNER_UL_LAT_PRODUCT = 10.33
    CORNER_UL_LON_PRODUCT = -68.00
    CORNER_UR_LAT_PRODUCT = 10.33
    CORNER_UR_LON_PRODUCT = -67.49
    CORNER_LR_LAT_PRODUCT = 9.99
    CORNER_LR_LON_PRODUCT = -67.50
    CORNER_LL_LAT_PRODUCT = 9.99
    CORNER_LL_LON_PRODUCT = -68.01
  END_GROUP = PROJECTION_ATTRIBUTES
END_GROUP = LANDSAT_METADATA_FILE
END
"#
    )
}

/// A metadata file carrying only the product id and image attributes
pub fn sparse_mtl_document(display_id: &str) -> String {
    format!(
        r#"GROUP = LANDSAT_METADATA_FILE
  GROUP = PRODUCT_CONTENTS
    LANDSAT_PRODUCT_ID = "{display_id}"
  END_GROUP = PRODUCT_CONTENTS
  GROUP = IMAGE_ATTRIBUTES
    SPACECRAFT_ID = "LANDSAT_9"
    CLOUD_COVER = 7.5
  END_GROUP = IMAGE_ATTRIBUTES
END_GROUP = LANDSAT_METADATA_FILE
END
"#
    )
}

/// Start the stub on an ephemeral port; returns its base URL
pub async fn spawn_stub(state: Arc<StubState>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}/", listener.local_addr().unwrap());
    *state.base_url.lock().unwrap() = base_url.clone();

    let router = Router::new()
        .route(
            "/login-token",
            post(|State(state): State<Arc<StubState>>| async move {
                state.logins.fetch_add(1, Ordering::SeqCst);
                login().await
            }),
        )
        .route("/logout", post(logout))
        .route("/scene-search", post(scene_search))
        .route("/scene-list-add", post(scene_list_add))
        .route("/scene-list-remove", post(scene_list_remove))
        .route("/download-options", post(download_options))
        .route("/download-request", post(download_request))
        .route("/files/:name", get(serve_file))
        .with_state(state);

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    base_url
}

/// Raster loader double recording every file it is handed
#[derive(Default)]
pub struct RecordingIngestor {
    pub loaded: Mutex<Vec<(PathBuf, String)>>,
    /// Reject every load as if the tool had exited unsuccessfully
    pub fail_loads: bool,
}

impl RecordingIngestor {
    pub fn failing() -> Self {
        Self {
            fail_loads: true,
            ..Default::default()
        }
    }
}

#[async_trait]
impl RasterIngestor for RecordingIngestor {
    async fn ingest_raster(&self, local_path: &Path, target_table: &str) -> RasterResult<()> {
        assert!(local_path.exists(), "raster handed off after cleanup");
        if self.fail_loads {
            return Err(RasterError::Failed {
                tool: "raster2pgsql".to_string(),
                status: Some(1),
                stderr: "ERROR: unable to read raster file".to_string(),
            });
        }
        self.loaded
            .lock()
            .unwrap()
            .push((local_path.to_path_buf(), target_table.to_string()));
        Ok(())
    }
}

/// Store double that delegates to `MemoryStore` but cannot drop staging tables
#[derive(Default)]
pub struct StagingFailureStore {
    pub inner: MemoryStore,
    pub discards: AtomicU32,
}

#[async_trait]
impl SceneStore for StagingFailureStore {
    async fn existing_entity_ids(&self, entity_ids: &[String]) -> StoreResult<HashSet<String>> {
        self.inner.existing_entity_ids(entity_ids).await
    }

    async fn upsert_scene(&self, scene: &SceneRecord) -> StoreResult<i64> {
        self.inner.upsert_scene(scene).await
    }

    async fn log_download(&self, entry: &DownloadLogEntry) -> StoreResult<()> {
        self.inner.log_download(entry).await
    }

    async fn attach_band(&self, band: &BandRecord, staging_table: &str) -> StoreResult<()> {
        self.inner.attach_band(band, staging_table).await
    }

    async fn discard_staging(&self, _staging_table: &str) -> StoreResult<()> {
        self.discards.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Database(sqlx::Error::PoolClosed))
    }
}

pub fn client_config(base_url: String) -> ClientConfig {
    ClientConfig {
        base_url,
        rate_limit_rps: 1000,
        retry: RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            jitter: 0.0,
        },
        ..Default::default()
    }
}

pub fn scene_filter() -> SceneFilter {
    let aoi = Polygon::from_ring(vec![
        [-68.1, 9.9],
        [-67.4, 9.9],
        [-67.4, 10.4],
        [-68.1, 10.4],
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

/// A coordinator wired to the stub with in-process store and raster doubles
pub fn coordinator(
    base_url: String,
    store: Arc<dyn SceneStore>,
    ingestor: Arc<RecordingIngestor>,
    scratch_dir: &Path,
    dry_run: bool,
) -> IngestionCoordinator {
    let client_config = client_config(base_url);
    let config = CoordinatorConfig::default()
        .with_datasets(vec![DATASET.to_string()])
        .with_scratch_dir(scratch_dir)
        .with_dry_run(dry_run);

    let session = M2mSession::new(&client_config, Credential::new("stub-user", "stub-token"), dry_run)
        .unwrap()
        .with_simulated_bands(config.bands.all_tags());
    let downloader = DownloadManager::new(&client_config, Duration::from_secs(10), dry_run).unwrap();

    IngestionCoordinator::new(
        Arc::new(session),
        store,
        ingestor,
        downloader,
        MetadataParser::new(dry_run),
        config,
        scene_filter(),
    )
}
