//! Data models for the Landsat ingestion pipeline
//!
//! Credentials, search filters, download candidates and results, and the
//! records handed to the persistent store.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{bands, env};
use crate::errors::{AuthError, AuthResult, ConfigError, ConfigResult};

/// Username and application token exchanged once per session for an access token
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub token: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            token: token.into(),
        }
    }

    /// Load the credential from `M2M_USERNAME` and `M2M_TOKEN`
    pub fn from_env() -> AuthResult<Self> {
        let username = std::env::var(env::USERNAME).map_err(|_| AuthError::MissingCredentials)?;
        let token = std::env::var(env::TOKEN).map_err(|_| AuthError::MissingCredentials)?;
        if username.trim().is_empty() || token.trim().is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        Ok(Self::new(username.trim(), token.trim()))
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Opaque session token returned by `login-token`
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

/// A single closed ring of `[lon, lat]` positions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    ring: Vec<[f64; 2]>,
}

impl Polygon {
    /// Build a polygon from a ring, closing it when the last point differs
    /// from the first
    pub fn from_ring(mut ring: Vec<[f64; 2]>) -> ConfigResult<Self> {
        if let (Some(first), Some(last)) = (ring.first().copied(), ring.last().copied()) {
            if first != last {
                ring.push(first);
            }
        }

        if ring.len() < 4 {
            return Err(ConfigError::InvalidValue {
                field: "aoi".to_string(),
                value: format!("{} positions", ring.len()),
                reason: "A polygon ring needs at least three distinct positions".to_string(),
            });
        }

        Ok(Self { ring })
    }

    /// Extract the outer ring of the first polygon in a GeoJSON document
    ///
    /// Accepts a `FeatureCollection`, a `Feature`, or a bare `Polygon` or
    /// `MultiPolygon` geometry.
    pub fn from_geojson(document: &Value) -> ConfigResult<Self> {
        let geometry = match document.get("type").and_then(Value::as_str) {
            Some("FeatureCollection") => document
                .get("features")
                .and_then(Value::as_array)
                .and_then(|features| features.first())
                .and_then(|feature| feature.get("geometry")),
            Some("Feature") => document.get("geometry"),
            Some(_) => Some(document),
            None => None,
        }
        .ok_or_else(|| invalid_geojson("no geometry found"))?;

        let coordinates = geometry
            .get("coordinates")
            .ok_or_else(|| invalid_geojson("geometry has no coordinates"))?;

        let outer_ring = match geometry.get("type").and_then(Value::as_str) {
            Some("Polygon") => coordinates.get(0),
            Some("MultiPolygon") => coordinates.get(0).and_then(|polygon| polygon.get(0)),
            other => {
                return Err(invalid_geojson(&format!(
                    "unsupported geometry type {:?}",
                    other
                )))
            }
        }
        .and_then(Value::as_array)
        .ok_or_else(|| invalid_geojson("polygon has no outer ring"))?;

        let ring = outer_ring
            .iter()
            .map(|position| {
                let lon = position.get(0).and_then(Value::as_f64);
                let lat = position.get(1).and_then(Value::as_f64);
                match (lon, lat) {
                    (Some(lon), Some(lat)) => Ok([lon, lat]),
                    _ => Err(invalid_geojson("position is not a [lon, lat] pair")),
                }
            })
            .collect::<ConfigResult<Vec<_>>>()?;

        Self::from_ring(ring)
    }

    pub fn ring(&self) -> &[[f64; 2]] {
        &self.ring
    }

    /// GeoJSON geometry object
    pub fn to_geojson(&self) -> Value {
        serde_json::json!({
            "type": "Polygon",
            "coordinates": [self.ring],
        })
    }

    /// Well-known text, `lon lat` order
    pub fn to_wkt(&self) -> String {
        let positions = self
            .ring
            .iter()
            .map(|[lon, lat]| format!("{} {}", lon, lat))
            .collect::<Vec<_>>()
            .join(", ");
        format!("POLYGON(({}))", positions)
    }
}

fn invalid_geojson(reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: "aoi".to_string(),
        value: "geojson".to_string(),
        reason: reason.to_string(),
    }
}

/// Inclusive acquisition date range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Inclusive cloud cover range in percent
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CloudCoverRange {
    pub min: f64,
    pub max: f64,
}

/// Immutable search filter for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneFilter {
    pub aoi: Polygon,
    pub dates: DateRange,
    pub cloud_cover: CloudCoverRange,
}

impl SceneFilter {
    pub fn new(
        aoi: Polygon,
        start: NaiveDate,
        end: NaiveDate,
        min_cloud: f64,
        max_cloud: f64,
    ) -> ConfigResult<Self> {
        if start > end {
            return Err(ConfigError::InvalidValue {
                field: "dates".to_string(),
                value: format!("{}..{}", start, end),
                reason: "Start date must not be after end date".to_string(),
            });
        }

        if !(0.0..=100.0).contains(&min_cloud)
            || !(0.0..=100.0).contains(&max_cloud)
            || min_cloud > max_cloud
        {
            return Err(ConfigError::InvalidValue {
                field: "cloud_cover".to_string(),
                value: format!("{}..{}", min_cloud, max_cloud),
                reason: "Cloud cover bounds must satisfy 0 <= min <= max <= 100".to_string(),
            });
        }

        Ok(Self {
            aoi,
            dates: DateRange { start, end },
            cloud_cover: CloudCoverRange {
                min: min_cloud,
                max: max_cloud,
            },
        })
    }
}

/// Sensor family, which decides the band set to download
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorFamily {
    /// Landsat 8/9 OLI/TIRS
    Oli,
    /// Landsat 7 ETM+
    Etm,
    /// Landsat 4/5 TM
    Tm,
}

impl SensorFamily {
    /// Derive the family from the entity id prefix
    ///
    /// Product ids (`LC08_L2SP_...`) carry a four character prefix, legacy
    /// scene ids (`LC80040532026022LGN00`) a three character one.
    pub fn from_entity_id(entity_id: &str) -> Option<Self> {
        let prefix_len = if entity_id.contains('_') { 4 } else { 3 };
        let prefix = entity_id.get(..prefix_len)?.to_ascii_uppercase();
        match prefix.as_str() {
            "LC08" | "LC09" | "LC8" | "LC9" => Some(Self::Oli),
            "LE07" | "LE7" => Some(Self::Etm),
            "LT05" | "LT04" | "LT5" | "LT4" => Some(Self::Tm),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Oli => "OLI",
            Self::Etm => "ETM+",
            Self::Tm => "TM",
        }
    }
}

impl fmt::Display for SensorFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A product selected for download-request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadCandidate {
    pub entity_id: String,
    pub product_id: String,
}

/// Outcome of one requested file; never aggregated
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadResult {
    pub entity_id: String,
    pub url: String,
    pub success: bool,
    /// Final local path on success
    pub path: Option<PathBuf>,
    /// Final size in bytes on success
    pub file_size: Option<u64>,
    /// Error detail on failure
    pub error: Option<String>,
    pub duration: Duration,
}

impl DownloadResult {
    pub fn succeeded(
        entity_id: impl Into<String>,
        url: impl Into<String>,
        path: PathBuf,
        file_size: u64,
        duration: Duration,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            url: url.into(),
            success: true,
            path: Some(path),
            file_size: Some(file_size),
            error: None,
            duration,
        }
    }

    pub fn failed(
        entity_id: impl Into<String>,
        url: impl Into<String>,
        error: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            url: url.into(),
            success: false,
            path: None,
            file_size: None,
            error: Some(error.into()),
            duration,
        }
    }

    /// File name of the downloaded file, if any
    pub fn file_name(&self) -> Option<&str> {
        self.path
            .as_ref()
            .and_then(|path| path.file_name())
            .and_then(|name| name.to_str())
    }
}

/// A band raster handed to the raster loader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BandRecord {
    pub scene_id: i64,
    pub band_name: String,
    pub acquisition_year: i32,
    pub raster_path: PathBuf,
}

impl BandRecord {
    /// Per-year band table the record is copied into
    pub fn target_table(&self) -> String {
        format!(
            "{}{}",
            crate::constants::store::BANDS_TABLE_PREFIX,
            self.acquisition_year
        )
    }
}

/// Download log status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    Success,
    Failed,
}

impl DownloadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

/// Append-only download log row
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadLogEntry {
    pub entity_id: String,
    pub band_name: String,
    pub status: DownloadStatus,
    pub file_size_mb: Option<f64>,
    pub error_message: Option<String>,
    pub source_url: String,
    pub duration: Duration,
}

impl DownloadLogEntry {
    /// Log row for one download result
    pub fn from_result(result: &DownloadResult, band_name: impl Into<String>) -> Self {
        let (status, file_size_mb, error_message) = if result.success {
            (
                DownloadStatus::Success,
                result
                    .file_size
                    .map(|bytes| bytes as f64 / (1024.0 * 1024.0)),
                None,
            )
        } else {
            (DownloadStatus::Failed, None, result.error.clone())
        };

        Self {
            entity_id: result.entity_id.clone(),
            band_name: band_name.into(),
            status,
            file_size_mb,
            error_message,
            source_url: result.url.clone(),
            duration: result.duration,
        }
    }

    /// Log row recording that a whole scene failed
    pub fn scene_failure(entity_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            band_name: bands::SCENE_ERROR.to_string(),
            status: DownloadStatus::Failed,
            file_size_mb: None,
            error_message: Some(error.into()),
            source_url: bands::NO_URL.to_string(),
            duration: Duration::ZERO,
        }
    }

    /// Log row for a downloaded band that could not be loaded
    pub fn band_failure(
        entity_id: impl Into<String>,
        band_name: impl Into<String>,
        source_url: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            band_name: band_name.into(),
            status: DownloadStatus::Failed,
            file_size_mb: None,
            error_message: Some(error.into()),
            source_url: source_url.into(),
            duration: Duration::ZERO,
        }
    }
}

/// Derive the band name from a product filename
///
/// `LC08_L2SP_005054_20240115_20240126_02_T1_SR_B3.TIF` yields `SR_B3`,
/// `..._QA_PIXEL.TIF` yields `QA_PIXEL`, and any file whose name mentions
/// `MTL` yields `MTL`. Returns `None` when no token matches.
pub fn band_name_from_filename(filename: &str) -> Option<String> {
    let parts: Vec<&str> = filename.split('_').collect();
    for (i, part) in parts.iter().enumerate() {
        if bands::PREFIXES.contains(part) {
            if let Some(next) = parts.get(i + 1) {
                let token = next.split('.').next().unwrap_or(next);
                if !token.is_empty() {
                    return Some(format!("{}_{}", part, token));
                }
            }
        }
    }

    if filename.to_ascii_uppercase().contains(bands::METADATA) {
        return Some(bands::METADATA.to_string());
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Vec<[f64; 2]> {
        vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]
    }

    #[test]
    fn test_band_name_extraction() {
        assert_eq!(
            band_name_from_filename("LC08_L2SP_005054_20240115_20240126_02_T1_SR_B3.TIF"),
            Some("SR_B3".to_string())
        );
        assert_eq!(
            band_name_from_filename("LC09_L2SP_004053_20260130_20260131_02_T1_QA_PIXEL.TIF"),
            Some("QA_PIXEL".to_string())
        );
        assert_eq!(
            band_name_from_filename("LE07_L2SP_005054_20200115_20200210_02_T1_ST_B6.TIF"),
            Some("ST_B6".to_string())
        );
        assert_eq!(
            band_name_from_filename("LC08_L2SP_005054_20240115_20240126_02_T1_MTL.txt"),
            Some("MTL".to_string())
        );
        assert_eq!(band_name_from_filename("download.bin"), None);
    }

    #[test]
    fn test_sensor_family_from_entity_id() {
        assert_eq!(
            SensorFamily::from_entity_id("LC08_L2SP_005054_20240115_02_T1"),
            Some(SensorFamily::Oli)
        );
        assert_eq!(
            SensorFamily::from_entity_id("LC90040532026030LGN00"),
            Some(SensorFamily::Oli)
        );
        assert_eq!(
            SensorFamily::from_entity_id("LE07_L2SP_005054_20200115_02_T1"),
            Some(SensorFamily::Etm)
        );
        assert_eq!(
            SensorFamily::from_entity_id("LT50050541990015CUB00"),
            Some(SensorFamily::Tm)
        );
        assert_eq!(SensorFamily::from_entity_id("XX"), None);
    }

    #[test]
    fn test_polygon_closes_open_ring() {
        let polygon = Polygon::from_ring(square()).unwrap();
        assert_eq!(polygon.ring().len(), 5);
        assert_eq!(polygon.ring().first(), polygon.ring().last());
    }

    #[test]
    fn test_polygon_rejects_degenerate_ring() {
        let result = Polygon::from_ring(vec![[0.0, 0.0], [1.0, 1.0]]);
        assert!(result.is_err());
    }

    #[test]
    fn test_polygon_wkt_order() {
        let polygon = Polygon::from_ring(square()).unwrap();
        assert_eq!(polygon.to_wkt(), "POLYGON((0 0, 1 0, 1 1, 0 1, 0 0))");
    }

    #[test]
    fn test_polygon_from_feature_collection() {
        let document = serde_json::json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": {},
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[-68.0, 10.3], [-67.5, 10.3], [-67.5, 10.0], [-68.0, 10.0], [-68.0, 10.3]]]
                }
            }]
        });

        let polygon = Polygon::from_geojson(&document).unwrap();
        assert_eq!(polygon.ring().len(), 5);
        assert_eq!(polygon.ring()[0], [-68.0, 10.3]);
    }

    #[test]
    fn test_polygon_from_bare_multipolygon() {
        let document = serde_json::json!({
            "type": "MultiPolygon",
            "coordinates": [[[[0.0, 0.0], [2.0, 0.0], [2.0, 2.0], [0.0, 0.0]]]]
        });

        let polygon = Polygon::from_geojson(&document).unwrap();
        assert_eq!(polygon.ring().len(), 4);
    }

    #[test]
    fn test_scene_filter_validation() {
        let aoi = Polygon::from_ring(square()).unwrap();
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();

        assert!(SceneFilter::new(aoi.clone(), start, end, 0.0, 40.0).is_ok());
        assert!(SceneFilter::new(aoi.clone(), start, start, 0.0, 40.0).is_ok());
        assert!(SceneFilter::new(aoi.clone(), end, start, 0.0, 40.0).is_err());
        assert!(SceneFilter::new(aoi.clone(), start, end, 50.0, 40.0).is_err());
        assert!(SceneFilter::new(aoi, start, end, 0.0, 140.0).is_err());
    }

    #[test]
    fn test_download_log_entry_from_results() {
        let ok = DownloadResult::succeeded(
            "LC08",
            "https://example.com/a.TIF",
            PathBuf::from("/tmp/a.TIF"),
            2 * 1024 * 1024,
            Duration::from_secs(3),
        );
        let entry = DownloadLogEntry::from_result(&ok, "SR_B3");
        assert_eq!(entry.status, DownloadStatus::Success);
        assert_eq!(entry.file_size_mb, Some(2.0));
        assert!(entry.error_message.is_none());

        let failed = DownloadResult::failed("LC08", "https://example.com/b", "HTTP 500", Duration::ZERO);
        let entry = DownloadLogEntry::from_result(&failed, bands::UNKNOWN);
        assert_eq!(entry.status, DownloadStatus::Failed);
        assert_eq!(entry.error_message.as_deref(), Some("HTTP 500"));
        assert_eq!(entry.file_size_mb, None);
    }

    #[test]
    fn test_scene_failure_entry() {
        let entry = DownloadLogEntry::scene_failure("LC08", "no bands");
        assert_eq!(entry.band_name, "SCENE_PROCESSING_ERROR");
        assert_eq!(entry.source_url, "N/A");
        assert_eq!(entry.status.as_str(), "failed");
    }

    #[test]
    fn test_band_failure_entry_keeps_source() {
        let entry = DownloadLogEntry::band_failure(
            "LC90040532026030LGN00",
            "SR_B3",
            "https://example.invalid/SR_B3.TIF",
            "no acquisition date",
        );
        assert_eq!(entry.band_name, "SR_B3");
        assert_eq!(entry.source_url, "https://example.invalid/SR_B3.TIF");
        assert_eq!(entry.status, DownloadStatus::Failed);
        assert_eq!(entry.error_message.as_deref(), Some("no acquisition date"));
    }

    #[test]
    fn test_access_token_debug_is_redacted() {
        let token = AccessToken::new("secret-value");
        assert!(!format!("{:?}", token).contains("secret-value"));
        let credential = Credential::new("user", "app-token");
        assert!(!format!("{:?}", credential).contains("app-token"));
    }

    #[test]
    fn test_band_record_target_table() {
        let record = BandRecord {
            scene_id: 7,
            band_name: "SR_B3".to_string(),
            acquisition_year: 2024,
            raster_path: PathBuf::from("/tmp/x.TIF"),
        };
        assert_eq!(record.target_table(), "bronze.landsat_bands_2024");
    }
}
