//! Remote session client for the USGS M2M API
//!
//! The module is organized into specialized components:
//! - `config`: HTTP client configuration and building
//! - `http`: JSON envelope transport with rate limiting and retries
//! - `auth`: token login and logout
//! - `api`: typed endpoint payloads
//! - `scene_list`: scoped acquisition of server-side scene lists
//!
//! [`M2mSession`] moves through `Unauthenticated -> Authenticated -> Closed`.
//! In dry-run mode login, logout and search still reach the server so the
//! simulated run works on real scenes; every call with a remote side effect
//! is simulated and returns clearly synthetic values.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::app::models::{AccessToken, Credential, DownloadCandidate, SceneFilter};
use crate::constants::{dry_run, m2m};
use crate::errors::{AuthError, AuthResult, ConfigResult, SessionError, SessionResult};

pub mod api;
pub mod auth;
pub mod config;
pub mod http;
pub mod scene_list;

pub use api::{DownloadOption, DownloadRequestResponse, SceneSummary};
pub use config::ClientConfig;
pub use scene_list::{generate_list_id, release_list, with_list, SceneListHandle};

use self::api::{
    AvailableDownload, DownloadOptionsRequest, DownloadRequestPayload, SceneFilterPayload,
    SceneListAddRequest, SceneListRemoveRequest, SceneSearchRequest, SceneSearchResponse,
    SecondaryDownload,
};
use self::auth::AuthHandler;
use self::http::EnvelopeClient;

/// Band file tags offered by simulated download-options unless configured
const SIMULATED_BANDS: [&str; 8] = [
    "SR_B2",
    "SR_B3",
    "SR_B5",
    "SR_B6",
    "QA_PIXEL",
    "QA_RADSAT",
    "SR_QA_AEROSOL",
    "MTL.txt",
];

/// Operations of the remote catalog used by the ingestion pipeline
#[async_trait]
pub trait CatalogApi: Send + Sync {
    /// Authenticate; must succeed before any other call
    async fn open(&self) -> AuthResult<()>;

    /// Best-effort logout; idempotent and valid from any state
    async fn close(&self);

    /// Search a dataset; results keep server order
    async fn search_scenes(
        &self,
        dataset: &str,
        filter: &SceneFilter,
        max_results: u32,
    ) -> SessionResult<Vec<SceneSummary>>;

    /// Add entity ids to a scene list, creating it on first use
    async fn add_to_list(
        &self,
        list_id: &str,
        dataset: &str,
        entity_ids: &[String],
    ) -> SessionResult<()>;

    /// Products available for the members of a scene list
    async fn get_download_options(
        &self,
        list_id: &str,
        dataset: &str,
        file_type: &str,
    ) -> SessionResult<Vec<DownloadOption>>;

    /// Request download URLs for the selected products
    async fn request_downloads(
        &self,
        candidates: &[DownloadCandidate],
        label: &str,
    ) -> SessionResult<DownloadRequestResponse>;

    /// Delete a scene list
    async fn delete_list(&self, list_id: &str) -> SessionResult<()>;
}

#[derive(Debug, Clone)]
enum SessionState {
    Unauthenticated,
    Authenticated(AccessToken),
    Closed,
}

/// Authenticated session against the M2M API
#[derive(Debug)]
pub struct M2mSession {
    client: EnvelopeClient,
    credential: Credential,
    state: RwLock<SessionState>,
    dry_run: bool,
    /// Band tags offered by simulated download-options
    simulated_bands: Vec<String>,
    /// Members of simulated scene lists, by list id
    simulated_lists: Mutex<HashMap<String, Vec<String>>>,
}

impl M2mSession {
    /// Creates an unauthenticated session
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the client configuration is invalid
    pub fn new(config: &ClientConfig, credential: Credential, dry_run: bool) -> ConfigResult<Self> {
        Ok(Self {
            client: EnvelopeClient::new(config)?,
            credential,
            state: RwLock::new(SessionState::Unauthenticated),
            dry_run,
            simulated_bands: SIMULATED_BANDS.iter().map(|band| band.to_string()).collect(),
            simulated_lists: Mutex::new(HashMap::new()),
        })
    }

    /// Offer these band tags from simulated download-options
    pub fn with_simulated_bands(mut self, bands: Vec<String>) -> Self {
        if !bands.is_empty() {
            self.simulated_bands = bands;
        }
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Current token, or the error matching the session state
    async fn token(&self, endpoint: &str) -> SessionResult<AccessToken> {
        match &*self.state.read().await {
            SessionState::Authenticated(token) => Ok(token.clone()),
            SessionState::Unauthenticated => Err(SessionError::NotAuthenticated {
                endpoint: endpoint.to_string(),
            }),
            SessionState::Closed => Err(SessionError::Closed {
                endpoint: endpoint.to_string(),
            }),
        }
    }

    fn simulated_members(&self, list_id: &str) -> Vec<String> {
        self.simulated_lists
            .lock()
            .map(|lists| lists.get(list_id).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    fn simulated_options(&self, list_id: &str) -> Vec<DownloadOption> {
        self.simulated_members(list_id)
            .into_iter()
            .map(|entity_id| DownloadOption {
                id: Some(format!("{}{}", dry_run::PRODUCT_PREFIX, entity_id)),
                display_id: Some(entity_id.clone()),
                secondary_downloads: self
                    .simulated_bands
                    .iter()
                    .map(|band| {
                        let file_id = format!("{}_{}", entity_id, band);
                        SecondaryDownload {
                            id: format!("{}{}", dry_run::PRODUCT_PREFIX, file_id),
                            entity_id: file_id.clone(),
                            display_id: Some(file_id),
                        }
                    })
                    .collect(),
                entity_id,
            })
            .collect()
    }
}

#[async_trait]
impl CatalogApi for M2mSession {
    async fn open(&self) -> AuthResult<()> {
        let mut state = self.state.write().await;
        match &*state {
            SessionState::Authenticated(_) => return Ok(()),
            SessionState::Closed => return Err(AuthError::SessionClosed),
            SessionState::Unauthenticated => {}
        }

        let token = AuthHandler::login(&self.client, &self.credential).await?;
        *state = SessionState::Authenticated(token);
        Ok(())
    }

    async fn close(&self) {
        let previous = {
            let mut state = self.state.write().await;
            std::mem::replace(&mut *state, SessionState::Closed)
        };

        if let SessionState::Authenticated(token) = previous {
            AuthHandler::logout(&self.client, &token).await;
        }
    }

    async fn search_scenes(
        &self,
        dataset: &str,
        filter: &SceneFilter,
        max_results: u32,
    ) -> SessionResult<Vec<SceneSummary>> {
        let token = self.token(m2m::SCENE_SEARCH).await?;
        let payload = SceneSearchRequest {
            dataset_name: dataset,
            max_results,
            scene_filter: SceneFilterPayload::from(filter),
        };

        info!(
            "Searching {} from {} to {}",
            dataset, filter.dates.start, filter.dates.end
        );
        let response: Option<SceneSearchResponse> = self
            .client
            .call(m2m::SCENE_SEARCH, Some(&token), &payload)
            .await?;
        let results = response.unwrap_or_default().results;
        info!("Found {} scenes in {}", results.len(), dataset);
        Ok(results)
    }

    async fn add_to_list(
        &self,
        list_id: &str,
        dataset: &str,
        entity_ids: &[String],
    ) -> SessionResult<()> {
        let token = self.token(m2m::SCENE_LIST_ADD).await?;

        if self.dry_run {
            info!(
                "DRY-RUN: would add {} scenes to list {}",
                entity_ids.len(),
                list_id
            );
            if let Ok(mut lists) = self.simulated_lists.lock() {
                lists
                    .entry(list_id.to_string())
                    .or_default()
                    .extend(entity_ids.iter().cloned());
            }
            return Ok(());
        }

        let payload = SceneListAddRequest {
            list_id,
            id_field: m2m::ID_FIELD,
            entity_ids,
            dataset_name: dataset,
        };
        let added: Option<serde_json::Value> = self
            .client
            .call(m2m::SCENE_LIST_ADD, Some(&token), &payload)
            .await?;
        debug!("scene-list-add {} returned {:?}", list_id, added);
        info!("Added {} scenes to list {}", entity_ids.len(), list_id);
        Ok(())
    }

    async fn get_download_options(
        &self,
        list_id: &str,
        dataset: &str,
        file_type: &str,
    ) -> SessionResult<Vec<DownloadOption>> {
        let token = self.token(m2m::DOWNLOAD_OPTIONS).await?;

        if self.dry_run {
            let options = self.simulated_options(list_id);
            info!(
                "DRY-RUN: simulated {} download options for list {}",
                options.len(),
                list_id
            );
            return Ok(options);
        }

        let payload = DownloadOptionsRequest {
            list_id,
            dataset_name: dataset,
            file_type,
        };
        let options: Option<Vec<DownloadOption>> = self
            .client
            .call(m2m::DOWNLOAD_OPTIONS, Some(&token), &payload)
            .await?;
        let options = options.unwrap_or_default();
        info!("Found {} products for list {}", options.len(), list_id);
        Ok(options)
    }

    async fn request_downloads(
        &self,
        candidates: &[DownloadCandidate],
        label: &str,
    ) -> SessionResult<DownloadRequestResponse> {
        let token = self.token(m2m::DOWNLOAD_REQUEST).await?;

        if self.dry_run {
            info!(
                "DRY-RUN: simulated download request for {} files ({})",
                candidates.len(),
                label
            );
            let available_downloads = candidates
                .iter()
                .map(|candidate| AvailableDownload {
                    url: format!(
                        "{}{}",
                        dry_run::URL_BASE,
                        candidate
                            .product_id
                            .trim_start_matches(dry_run::PRODUCT_PREFIX)
                    ),
                })
                .collect();
            return Ok(DownloadRequestResponse {
                available_downloads,
                ..Default::default()
            });
        }

        // The label is stable per scene, so a retried request is recognised
        // by the server as the same request.
        let payload = DownloadRequestPayload {
            downloads: candidates,
            label,
        };
        info!(
            "Requesting {} downloads with label {}",
            candidates.len(),
            label
        );
        let response: Option<DownloadRequestResponse> = self
            .client
            .call(m2m::DOWNLOAD_REQUEST, Some(&token), &payload)
            .await?;
        let response = response.unwrap_or_default();
        info!(
            "Available: {}, Preparing: {}, Failed: {}",
            response.available_downloads.len(),
            response.preparing_downloads.len(),
            response.failed.len()
        );
        Ok(response)
    }

    async fn delete_list(&self, list_id: &str) -> SessionResult<()> {
        let token = self.token(m2m::SCENE_LIST_REMOVE).await?;

        if self.dry_run {
            info!("DRY-RUN: would delete list {}", list_id);
            if let Ok(mut lists) = self.simulated_lists.lock() {
                lists.remove(list_id);
            }
            return Ok(());
        }

        let payload = SceneListRemoveRequest { list_id };
        let _: Option<serde_json::Value> = self
            .client
            .call(m2m::SCENE_LIST_REMOVE, Some(&token), &payload)
            .await?;
        info!("Deleted list {}", list_id);
        Ok(())
    }
}
