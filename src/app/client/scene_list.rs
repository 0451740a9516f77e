//! Scoped acquisition of temporary server-side scene lists
//!
//! A scene list is created by the first `scene-list-add` and must be deleted
//! on every exit path of the work that uses it: normal completion, an error
//! while populating it, an error inside the body, or a panic.

use std::future::Future;
use std::panic::AssertUnwindSafe;

use chrono::Local;
use futures::FutureExt;
use tracing::{debug, warn};

use crate::app::client::{CatalogApi, DownloadOption};
use crate::constants::search;
use crate::errors::{ResourceCleanupError, SessionResult};

/// Generate a list id unique per dataset and run
///
/// Format: `temp_<dataset>_<YYYYmmdd_HHMMSS>_<hex>`.
pub fn generate_list_id(dataset: &str) -> String {
    format!(
        "{}_{}_{}_{:04x}",
        search::LIST_ID_PREFIX,
        dataset,
        Local::now().format("%Y%m%d_%H%M%S"),
        fastrand::u16(..)
    )
}

/// Borrowed view of a populated scene list
#[derive(Clone, Copy)]
pub struct SceneListHandle<'a> {
    api: &'a dyn CatalogApi,
    list_id: &'a str,
    dataset: &'a str,
    entity_ids: &'a [String],
}

impl<'a> SceneListHandle<'a> {
    pub fn list_id(&self) -> &'a str {
        self.list_id
    }

    pub fn dataset(&self) -> &'a str {
        self.dataset
    }

    /// Entity ids the list was populated with
    pub fn entity_ids(&self) -> &'a [String] {
        self.entity_ids
    }

    /// Products available for the list members
    pub async fn download_options(&self, file_type: &str) -> SessionResult<Vec<DownloadOption>> {
        self.api
            .get_download_options(self.list_id, self.dataset, file_type)
            .await
    }
}

/// Populate a scene list, run `body` with it, and delete the list afterwards
///
/// The list is deleted exactly once whatever happens: when populating fails
/// the population error is returned after deletion, and a panic in `body` is
/// resumed after deletion. Deletion failures are logged and never replace
/// the body's result.
pub async fn with_list<'a, T, F, Fut>(
    api: &'a dyn CatalogApi,
    list_id: &'a str,
    dataset: &'a str,
    entity_ids: &'a [String],
    body: F,
) -> SessionResult<T>
where
    F: FnOnce(SceneListHandle<'a>) -> Fut,
    Fut: Future<Output = T> + 'a,
{
    if let Err(e) = api.add_to_list(list_id, dataset, entity_ids).await {
        warn!("Failed to populate scene list {}: {}", list_id, e);
        release_list(api, list_id).await;
        return Err(e);
    }

    let handle = SceneListHandle {
        api,
        list_id,
        dataset,
        entity_ids,
    };
    let outcome = AssertUnwindSafe(body(handle)).catch_unwind().await;

    release_list(api, list_id).await;

    match outcome {
        Ok(value) => Ok(value),
        Err(panic) => std::panic::resume_unwind(panic),
    }
}

/// Delete a scene list, logging any failure
///
/// Returns whether the deletion succeeded.
pub async fn release_list(api: &dyn CatalogApi, list_id: &str) -> bool {
    match api.delete_list(list_id).await {
        Ok(()) => {
            debug!("Released scene list {}", list_id);
            true
        }
        Err(source) => {
            let error = ResourceCleanupError {
                list_id: list_id.to_string(),
                source,
            };
            warn!("{}", error);
            false
        }
    }
}
