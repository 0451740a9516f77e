//! Configuration management for the Landsat ingestion pipeline
//!
//! Configuration is built once at startup from three layers, later layers
//! winning: built-in defaults, a TOML file, then environment variables.
//! Credentials and the database URL only ever come from the environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::app::client::ClientConfig;
use crate::app::coordinator::{BandSets, CoordinatorConfig};
use crate::app::models::{Credential, Polygon, SceneFilter};
use crate::app::raster::Raster2PgsqlIngestor;
use crate::app::retry::RetryPolicy;
use crate::constants::{config, download, env, http, limits, logging, m2m, raster, search, store};
use crate::errors::{AuthResult, ConfigError, ConfigResult};

/// Unified application configuration for TOML serialization
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// M2M API client settings
    pub m2m: M2mConfigToml,
    /// File transfer settings
    pub download: DownloadConfigToml,
    /// Scene search settings
    pub search: SearchConfigToml,
    /// Band files per sensor family
    pub bands: BandSets,
    /// Database settings
    pub database: DatabaseConfigToml,
    /// External raster tool settings
    pub raster: RasterConfigToml,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// TOML-friendly M2M client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct M2mConfigToml {
    /// API root URL
    pub base_url: String,
    /// Timeout of one API request
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Timeout of connection establishment
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Rate limit (requests per second)
    pub rate_limit_rps: u32,
    /// Retry policy shared with file transfers
    pub retry: RetryPolicy,
}

impl Default for M2mConfigToml {
    fn default() -> Self {
        Self {
            base_url: m2m::BASE_URL.to_string(),
            request_timeout: http::DEFAULT_TIMEOUT,
            connect_timeout: http::CONNECT_TIMEOUT,
            rate_limit_rps: limits::DEFAULT_RATE_LIMIT_RPS,
            retry: RetryPolicy::default(),
        }
    }
}

/// TOML-friendly download configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfigToml {
    /// Concurrent transfers per scene
    pub concurrency: usize,
    /// Timeout of one file transfer
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Parent of the per-scene scratch directories
    pub scratch_dir: PathBuf,
}

impl Default for DownloadConfigToml {
    fn default() -> Self {
        Self {
            concurrency: download::DEFAULT_CONCURRENCY,
            timeout: http::DOWNLOAD_TIMEOUT,
            scratch_dir: PathBuf::from(download::DEFAULT_SCRATCH_DIR),
        }
    }
}

/// TOML-friendly search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfigToml {
    /// Datasets searched when none are given on the command line
    pub datasets: Vec<String>,
    /// Maximum scenes per dataset search
    pub max_results: u32,
    /// Lower bound of the cloud cover filter (percent)
    pub min_cloud_cover: f64,
    /// Upper bound of the cloud cover filter (percent)
    pub max_cloud_cover: f64,
    /// GeoJSON file holding the area of interest
    pub aoi_path: Option<PathBuf>,
    /// Inline area of interest as `[lon, lat]` positions
    pub aoi: Option<Vec<[f64; 2]>>,
}

impl Default for SearchConfigToml {
    fn default() -> Self {
        Self {
            datasets: search::DEFAULT_DATASETS
                .iter()
                .map(|dataset| dataset.to_string())
                .collect(),
            max_results: search::DEFAULT_MAX_RESULTS,
            min_cloud_cover: 0.0,
            max_cloud_cover: search::DEFAULT_MAX_CLOUD_COVER,
            aoi_path: None,
            aoi: None,
        }
    }
}

/// TOML-friendly database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfigToml {
    /// Connection string; normally supplied through `DATABASE_URL`
    #[serde(skip_serializing)]
    pub url: Option<String>,
    /// Maximum pooled connections
    pub max_connections: u32,
}

impl Default for DatabaseConfigToml {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: store::MAX_CONNECTIONS,
        }
    }
}

/// TOML-friendly raster tool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterConfigToml {
    /// `raster2pgsql` executable
    pub raster2pgsql: String,
    /// `psql` executable
    pub psql: String,
    /// Tile size passed to raster2pgsql
    pub tile_size: String,
    /// Maximum runtime of one load
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for RasterConfigToml {
    fn default() -> Self {
        Self {
            raster2pgsql: raster::RASTER2PGSQL.to_string(),
            psql: raster::PSQL.to_string(),
            tile_size: raster::DEFAULT_TILE_SIZE.to_string(),
            timeout: raster::DEFAULT_TIMEOUT,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level for the application
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: logging::DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration with multi-source precedence:
    /// 1. Default values
    /// 2. Config file (if exists)
    /// 3. Environment variables
    pub async fn load(config_file_override: Option<PathBuf>) -> ConfigResult<Self> {
        let config_path = match config_file_override {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound { path });
                }
                Some(path)
            }
            None => Self::find_config_file(),
        };

        let mut config = match config_path {
            Some(path) => Self::load_from_file(&path).await?,
            None => {
                debug!("No config file found, using defaults");
                Self::default()
            }
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply environment overrides read through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(env::DATABASE_URL).filter(|url| !url.trim().is_empty()) {
            self.database.url = Some(url.trim().to_string());
        }

        if let Some(value) = lookup(env::MAX_CLOUD_COVER) {
            self.search.max_cloud_cover =
                value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue {
                        field: env::MAX_CLOUD_COVER.to_string(),
                        value: value.clone(),
                        reason: "Expected a percentage".to_string(),
                    })?;
        }

        if let Some(value) = lookup(env::MAX_CONCURRENT_DOWNLOADS) {
            self.download.concurrency =
                value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue {
                        field: env::MAX_CONCURRENT_DOWNLOADS.to_string(),
                        value: value.clone(),
                        reason: "Expected a positive integer".to_string(),
                    })?;
        }

        Ok(())
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` listing every problem found
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();

        if self.download.concurrency == 0 {
            errors.push("download.concurrency must be at least 1".to_string());
        }
        if self.m2m.retry.max_attempts == 0 {
            errors.push("m2m.retry.max_attempts must be at least 1".to_string());
        }
        if self.m2m.rate_limit_rps == 0 {
            errors.push("m2m.rate_limit_rps must be at least 1".to_string());
        }
        if self.search.datasets.is_empty() {
            errors.push("search.datasets must name at least one dataset".to_string());
        }
        if self.search.max_results == 0 {
            errors.push("search.max_results must be at least 1".to_string());
        }

        let (min, max) = (self.search.min_cloud_cover, self.search.max_cloud_cover);
        if !(0.0..=100.0).contains(&min) || !(0.0..=100.0).contains(&max) || min > max {
            errors.push(format!(
                "cloud cover range {}..{} must satisfy 0 <= min <= max <= 100",
                min, max
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::ValidationFailed { errors })
        }
    }

    /// Credential from `M2M_USERNAME` and `M2M_TOKEN`
    pub fn credential(&self) -> AuthResult<Credential> {
        Credential::from_env()
    }

    /// Database connection string
    pub fn database_url(&self) -> ConfigResult<&str> {
        self.database
            .url
            .as_deref()
            .ok_or_else(|| ConfigError::MissingField {
                field: env::DATABASE_URL.to_string(),
            })
    }

    /// Area of interest, from the inline ring or the GeoJSON file
    pub async fn aoi(&self) -> ConfigResult<Polygon> {
        if let Some(ring) = &self.search.aoi {
            return Polygon::from_ring(ring.clone());
        }

        let path = self
            .search
            .aoi_path
            .as_ref()
            .ok_or_else(|| ConfigError::MissingField {
                field: "search.aoi_path".to_string(),
            })?;

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;
        let document: serde_json::Value =
            serde_json::from_str(&content).map_err(|e| ConfigError::InvalidValue {
                field: "search.aoi_path".to_string(),
                value: path.display().to_string(),
                reason: e.to_string(),
            })?;

        Polygon::from_geojson(&document)
    }

    /// Search filter for one run; `max_cloud_cover` overrides the configured bound
    pub async fn scene_filter(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        max_cloud_cover: Option<f64>,
    ) -> ConfigResult<SceneFilter> {
        SceneFilter::new(
            self.aoi().await?,
            start,
            end,
            self.search.min_cloud_cover,
            max_cloud_cover.unwrap_or(self.search.max_cloud_cover),
        )
    }

    /// Convert to runtime client configuration
    pub fn client_config(&self) -> ClientConfig {
        self.m2m.to_runtime_config()
    }

    /// Convert to runtime coordinator configuration
    pub fn coordinator_config(&self, dry_run: bool) -> CoordinatorConfig {
        CoordinatorConfig {
            datasets: self.search.datasets.clone(),
            bands: self.bands.clone(),
            scratch_dir: self.download.scratch_dir.clone(),
            concurrency: self.download.concurrency,
            max_results: self.search.max_results,
            dry_run,
        }
    }

    /// Raster loader for `database_url`
    pub fn raster_ingestor(&self, database_url: &str, dry_run: bool) -> Raster2PgsqlIngestor {
        Raster2PgsqlIngestor::new(database_url, dry_run)
            .with_tools(&self.raster.raster2pgsql, &self.raster.psql)
            .with_tile_size(&self.raster.tile_size)
            .with_timeout(self.raster.timeout)
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let mut search_paths = vec![PathBuf::from(config::LOCAL_FILE)];
        if let Some(path) = Self::get_default_config_path() {
            search_paths.push(path);
        }

        for path in search_paths {
            if path.exists() {
                debug!("Found config file: {}", path.display());
                return Some(path);
            }
        }

        None
    }

    /// Get the default config file path for the current user
    pub fn get_default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(config::APP_DIR).join(config::FILE_NAME))
    }

    /// Load configuration from a TOML file
    async fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let config: AppConfig = toml::from_str(&content)?;
        info!("Loaded configuration from: {}", path.display());
        Ok(config)
    }
}

impl M2mConfigToml {
    /// Convert to runtime ClientConfig
    pub fn to_runtime_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.base_url.clone(),
            request_timeout: self.request_timeout,
            connect_timeout: self.connect_timeout,
            rate_limit_rps: self.rate_limit_rps,
            retry: self.retry.clone(),
            ..ClientConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.download.concurrency, download::DEFAULT_CONCURRENCY);
        assert_eq!(config.m2m.rate_limit_rps, limits::DEFAULT_RATE_LIMIT_RPS);
        assert_eq!(config.search.datasets.len(), 3);
        assert_eq!(config.logging.level, "info");
    }

    #[tokio::test]
    async fn test_config_loading_nonexistent_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.toml");

        // Should fail when explicitly specified
        let result = AppConfig::load(Some(config_path)).await;
        assert!(matches!(result, Err(ConfigError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_config_loading_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test_config.toml");

        let test_config = r#"
[m2m]
request_timeout = "90s"
rate_limit_rps = 4

[m2m.retry]
max_attempts = 2
base_delay = "250ms"
max_delay = "5s"
jitter = 0.0

[download]
concurrency = 3
scratch_dir = "/tmp/landsat"

[search]
datasets = ["landsat_ot_c2_l2"]
aoi = [[-68.0, 10.0], [-67.5, 10.0], [-67.5, 10.5], [-68.0, 10.5]]

[bands.etm]
green = "SR_B2"
swir1 = "SR_B5"
qa_pixel = "QA_PIXEL"
qa_radsat = "QA_RADSAT"
metadata = "MTL.xml"

[logging]
level = "debug"
"#;
        tokio::fs::write(&config_path, test_config).await.unwrap();

        let mut config = AppConfig::load_from_file(&config_path).await.unwrap();
        config.apply_overrides(|_| None).unwrap();

        assert_eq!(config.m2m.request_timeout, Duration::from_secs(90));
        assert_eq!(config.m2m.retry.max_attempts, 2);
        assert_eq!(config.m2m.retry.base_delay, Duration::from_millis(250));
        assert_eq!(config.download.concurrency, 3);
        assert_eq!(config.download.scratch_dir, PathBuf::from("/tmp/landsat"));
        assert_eq!(config.search.datasets, vec!["landsat_ot_c2_l2"]);
        assert_eq!(config.bands.etm.metadata, "MTL.xml");
        assert_eq!(config.logging.level, "debug");

        // Unspecified values keep their defaults
        assert_eq!(config.bands.oli, BandSets::default().oli);
        assert_eq!(config.search.max_results, search::DEFAULT_MAX_RESULTS);
        assert_eq!(config.m2m.base_url, m2m::BASE_URL);

        let runtime = config.client_config();
        assert_eq!(runtime.rate_limit_rps, 4);
        assert_eq!(runtime.retry.max_attempts, 2);
    }

    #[test]
    fn test_environment_overrides() {
        let vars: HashMap<&str, &str> = [
            (env::DATABASE_URL, "postgres://localhost/landsat"),
            (env::MAX_CLOUD_COVER, "25"),
            (env::MAX_CONCURRENT_DOWNLOADS, "8"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config
            .apply_overrides(|key| vars.get(key).map(|value| value.to_string()))
            .unwrap();

        assert_eq!(config.database_url().unwrap(), "postgres://localhost/landsat");
        assert_eq!(config.search.max_cloud_cover, 25.0);
        assert_eq!(config.download.concurrency, 8);
    }

    #[test]
    fn test_invalid_environment_override_is_rejected() {
        let mut config = AppConfig::default();
        let result = config.apply_overrides(|key| {
            (key == env::MAX_CONCURRENT_DOWNLOADS).then(|| "many".to_string())
        });
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_validation_collects_errors() {
        let mut config = AppConfig::default();
        config.download.concurrency = 0;
        config.search.datasets.clear();
        config.search.min_cloud_cover = 50.0;
        config.search.max_cloud_cover = 10.0;

        match config.validate() {
            Err(ConfigError::ValidationFailed { errors }) => assert_eq!(errors.len(), 3),
            other => panic!("Expected validation failure, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_database_url() {
        let config = AppConfig::default();
        assert!(matches!(
            config.database_url(),
            Err(ConfigError::MissingField { .. })
        ));
    }

    #[tokio::test]
    async fn test_scene_filter_from_geojson_file() {
        let temp_dir = TempDir::new().unwrap();
        let aoi_path = temp_dir.path().join("aoi.geojson");
        let geojson = serde_json::json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": {},
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[-68.0, 10.0], [-67.5, 10.0], [-67.5, 10.5], [-68.0, 10.5], [-68.0, 10.0]]]
                }
            }]
        });
        tokio::fs::write(&aoi_path, geojson.to_string()).await.unwrap();

        let mut config = AppConfig::default();
        config.search.aoi_path = Some(aoi_path);

        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
        let filter = config.scene_filter(start, end, Some(20.0)).await.unwrap();

        assert_eq!(filter.aoi.ring().len(), 5);
        assert_eq!(filter.cloud_cover.max, 20.0);
        assert_eq!(filter.cloud_cover.min, 0.0);
        assert_eq!(filter.dates.start, start);
    }

    #[tokio::test]
    async fn test_missing_aoi_is_reported() {
        let config = AppConfig::default();
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let result = config.scene_filter(start, start, None).await;
        assert!(matches!(result, Err(ConfigError::MissingField { .. })));
    }

    #[test]
    fn test_coordinator_config_from_app_config() {
        let config = AppConfig::default();
        let coordinator = config.coordinator_config(true);
        assert!(coordinator.dry_run);
        assert!(coordinator.validate().is_ok());
        assert_eq!(coordinator.datasets, config.search.datasets);
    }
}
