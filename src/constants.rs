//! Application constants for the Landsat ingestion pipeline
//!
//! Centralizes constants used throughout the application, organized by
//! functional domain.

use std::time::Duration;

/// Environment variable names
pub mod env {
    /// USGS ERS username
    pub const USERNAME: &str = "M2M_USERNAME";

    /// M2M application token (not the account password)
    pub const TOKEN: &str = "M2M_TOKEN";

    /// PostgreSQL connection string
    pub const DATABASE_URL: &str = "DATABASE_URL";

    /// Overrides the maximum cloud cover of the search filter
    pub const MAX_CLOUD_COVER: &str = "MAX_CLOUD_COVER";

    /// Overrides the download concurrency limit
    pub const MAX_CONCURRENT_DOWNLOADS: &str = "MAX_CONCURRENT_DOWNLOADS";
}

/// M2M API endpoints
pub mod m2m {
    /// Stable JSON API root; endpoint names are appended to it
    pub const BASE_URL: &str = "https://m2m.cr.usgs.gov/api/api/json/stable/";

    /// Header carrying the session token
    pub const AUTH_HEADER: &str = "X-Auth-Token";

    pub const LOGIN_TOKEN: &str = "login-token";
    pub const LOGOUT: &str = "logout";
    pub const SCENE_SEARCH: &str = "scene-search";
    pub const SCENE_LIST_ADD: &str = "scene-list-add";
    pub const SCENE_LIST_REMOVE: &str = "scene-list-remove";
    pub const DOWNLOAD_OPTIONS: &str = "download-options";
    pub const DOWNLOAD_REQUEST: &str = "download-request";

    /// Entity id field used when populating scene lists
    pub const ID_FIELD: &str = "entityId";

    /// File type requested from download-options
    pub const BAND_FILE_TYPE: &str = "band";
}

/// HTTP client configuration constants
pub mod http {
    use super::Duration;

    /// Default user agent for all HTTP requests
    pub const USER_AGENT: &str = "landsat-ingest/0.1.0 (Landsat acquisition pipeline)";

    /// Default API request timeout
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

    /// Default file transfer timeout
    pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(600);

    /// Connection establishment timeout
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

    /// TCP keep-alive interval
    pub const TCP_KEEPALIVE: Duration = Duration::from_secs(30);

    /// Connection pool idle timeout
    pub const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

    /// Maximum idle connections per host in pool
    pub const POOL_MAX_PER_HOST: usize = 8;
}

/// Rate limiting and retry configuration
pub mod limits {
    /// Default rate limit for API requests (requests per second)
    pub const DEFAULT_RATE_LIMIT_RPS: u32 = 10;

    /// Maximum attempts per request, first attempt included
    pub const MAX_ATTEMPTS: u32 = 4;

    /// Base delay for exponential backoff (milliseconds)
    pub const RETRY_BASE_DELAY_MS: u64 = 1000;

    /// Maximum backoff delay (seconds)
    pub const MAX_BACKOFF_SECS: u64 = 60;

    /// Jitter factor for randomizing delays (0.0-1.0)
    pub const BACKOFF_JITTER_FACTOR: f64 = 0.1;

    /// HTTP status codes treated as transient
    pub const RETRYABLE_STATUS_CODES: [u16; 5] = [429, 500, 502, 503, 504];
}

/// Scene search defaults
pub mod search {
    /// Maximum scenes requested per dataset search
    pub const DEFAULT_MAX_RESULTS: u32 = 1000;

    /// Default upper bound of the cloud cover filter (percent)
    pub const DEFAULT_MAX_CLOUD_COVER: f64 = 40.0;

    /// Datasets searched when none are given
    pub const DEFAULT_DATASETS: [&str; 3] =
        ["landsat_ot_c2_l2", "landsat_etm_c2_l2", "landsat_tm_c2_l2"];

    /// Prefix of the scene list identifiers created by a run
    pub const LIST_ID_PREFIX: &str = "temp";
}

/// Download manager defaults
pub mod download {
    /// Default number of concurrent transfers
    pub const DEFAULT_CONCURRENCY: usize = 5;

    /// Suffix of in-progress files
    pub const TEMP_FILE_SUFFIX: &str = ".part";

    /// Content type of disguised error bodies
    pub const JSON_CONTENT_TYPE: &str = "application/json";

    /// Maximum characters of an error body kept in the result
    pub const ERROR_EXCERPT_LEN: usize = 200;

    /// Default scratch directory for downloaded scenes
    pub const DEFAULT_SCRATCH_DIR: &str = "./scratch";
}

/// Band naming constants
pub mod bands {
    /// Band name recorded for a scene-level failure
    pub const SCENE_ERROR: &str = "SCENE_PROCESSING_ERROR";

    /// Band name recorded when a filename yields no band token
    pub const UNKNOWN: &str = "UNKNOWN_BAND";

    /// Band name of the metadata file
    pub const METADATA: &str = "MTL";

    /// Source URL recorded for a scene-level failure
    pub const NO_URL: &str = "N/A";

    /// Band prefixes recognised in product filenames
    pub const PREFIXES: [&str; 3] = ["SR", "ST", "QA"];
}

/// Raster loading tool constants
pub mod raster {
    use super::Duration;

    pub const RASTER2PGSQL: &str = "raster2pgsql";
    pub const PSQL: &str = "psql";

    /// Tile size passed to raster2pgsql
    pub const DEFAULT_TILE_SIZE: &str = "512x512";

    /// Maximum runtime of one raster2pgsql | psql pipeline
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

    /// Schema holding staging tables
    pub const STAGING_SCHEMA: &str = "bronze";

    /// Prefix of staging tables
    pub const STAGING_PREFIX: &str = "temp_ingest_";
}

/// Database schema constants
pub mod store {
    /// Scene table
    pub const SCENES_TABLE: &str = "bronze.landsat_scenes";

    /// Download log table
    pub const DOWNLOAD_LOG_TABLE: &str = "bronze.download_log";

    /// Prefix of the per-year band tables
    pub const BANDS_TABLE_PREFIX: &str = "bronze.landsat_bands_";

    /// Geographic SRID of footprints as parsed
    pub const GEOGRAPHIC_SRID: i32 = 4326;

    /// Projected SRID footprints are stored in
    pub const STORAGE_SRID: i32 = 32619;

    /// Maximum connections in the database pool
    pub const MAX_CONNECTIONS: u32 = 5;
}

/// Dry-run synthetic values
pub mod dry_run {
    /// Host of simulated download URLs
    pub const URL_BASE: &str = "https://dry-run.invalid/";

    /// Prefix of simulated product ids
    pub const PRODUCT_PREFIX: &str = "dryrun:";

    /// Size reported for simulated downloads
    pub const FILE_SIZE: u64 = 1024 * 1024;

    /// Duration reported for simulated downloads (milliseconds)
    pub const FETCH_DURATION_MS: u64 = 100;

    /// Scene id returned by simulated registration
    pub const SCENE_ID: i64 = 0;
}

/// Logging constants
pub mod logging {
    /// Default log level
    pub const DEFAULT_LOG_LEVEL: &str = "info";
}

/// Configuration file locations
pub mod config {
    /// Project-local configuration file
    pub const LOCAL_FILE: &str = "landsat-ingest.toml";

    /// Directory under the user configuration directory
    pub const APP_DIR: &str = "landsat-ingest";

    /// File name under the application configuration directory
    pub const FILE_NAME: &str = "config.toml";
}

// Re-export commonly used constants for convenience
pub use download::DEFAULT_CONCURRENCY;
pub use env::{TOKEN as ENV_TOKEN, USERNAME as ENV_USERNAME};
pub use http::USER_AGENT;
pub use limits::{DEFAULT_RATE_LIMIT_RPS, MAX_ATTEMPTS, RETRY_BASE_DELAY_MS};
