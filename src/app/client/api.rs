//! Request and response payloads of the M2M endpoints

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::app::models::{DownloadCandidate, SceneFilter};

#[derive(Debug, Serialize)]
pub struct LoginTokenRequest<'a> {
    pub username: &'a str,
    pub token: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneSearchRequest<'a> {
    pub dataset_name: &'a str,
    pub max_results: u32,
    pub scene_filter: SceneFilterPayload,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneFilterPayload {
    pub spatial_filter: SpatialFilter,
    pub acquisition_filter: AcquisitionFilter,
    pub cloud_cover_filter: CloudCoverFilter,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpatialFilter {
    pub filter_type: &'static str,
    pub geo_json: Value,
}

#[derive(Debug, Serialize)]
pub struct AcquisitionFilter {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Serialize)]
pub struct CloudCoverFilter {
    pub min: i64,
    pub max: i64,
}

impl From<&SceneFilter> for SceneFilterPayload {
    fn from(filter: &SceneFilter) -> Self {
        Self {
            spatial_filter: SpatialFilter {
                filter_type: "geojson",
                geo_json: filter.aoi.to_geojson(),
            },
            acquisition_filter: AcquisitionFilter {
                start: filter.dates.start.format("%Y-%m-%d").to_string(),
                end: filter.dates.end.format("%Y-%m-%d").to_string(),
            },
            // M2M takes whole percentages; round outward so the range only widens
            cloud_cover_filter: CloudCoverFilter {
                min: filter.cloud_cover.min.floor() as i64,
                max: filter.cloud_cover.max.ceil() as i64,
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneSearchResponse {
    #[serde(default)]
    pub results: Vec<SceneSummary>,
    #[serde(default)]
    pub total_hits: Option<u64>,
}

/// One search hit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneSummary {
    pub entity_id: String,
    #[serde(default)]
    pub display_id: Option<String>,
}

impl SceneSummary {
    /// Display id, falling back to the entity id
    pub fn display_id(&self) -> &str {
        self.display_id.as_deref().unwrap_or(&self.entity_id)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneListAddRequest<'a> {
    pub list_id: &'a str,
    pub id_field: &'static str,
    pub entity_ids: &'a [String],
    pub dataset_name: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneListRemoveRequest<'a> {
    pub list_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadOptionsRequest<'a> {
    pub list_id: &'a str,
    pub dataset_name: &'a str,
    pub file_type: &'a str,
}

/// A product returned by download-options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadOption {
    pub entity_id: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub display_id: Option<String>,
    #[serde(default)]
    pub secondary_downloads: Vec<SecondaryDownload>,
}

/// A single band file of a product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecondaryDownload {
    pub id: String,
    pub entity_id: String,
    #[serde(default)]
    pub display_id: Option<String>,
}

/// Select the band files of one scene whose display id names a wanted band
///
/// Only products belonging to `entity_id` are considered. The metadata file
/// is selected like any other band when its tag (e.g. `MTL.txt`) is listed.
pub fn filter_candidates(
    options: &[DownloadOption],
    entity_id: &str,
    bands: &[String],
) -> Vec<DownloadCandidate> {
    options
        .iter()
        .filter(|option| option.entity_id == entity_id)
        .flat_map(|option| option.secondary_downloads.iter())
        .filter(|secondary| {
            let display_id = secondary.display_id.as_deref().unwrap_or_default();
            bands.iter().any(|band| display_id.contains(band.as_str()))
        })
        .map(|secondary| DownloadCandidate {
            entity_id: secondary.entity_id.clone(),
            product_id: secondary.id.clone(),
        })
        .collect()
}

#[derive(Debug, Serialize)]
pub struct DownloadRequestPayload<'a> {
    pub downloads: &'a [DownloadCandidate],
    pub label: &'a str,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRequestResponse {
    #[serde(default)]
    pub available_downloads: Vec<AvailableDownload>,
    #[serde(default)]
    pub preparing_downloads: Vec<Value>,
    #[serde(default)]
    pub failed: Vec<Value>,
}

impl DownloadRequestResponse {
    pub fn urls(&self) -> Vec<String> {
        self.available_downloads
            .iter()
            .map(|download| download.url.clone())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableDownload {
    pub url: String,
}
