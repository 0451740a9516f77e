//! Error types for the Landsat ingestion pipeline
//!
//! Each concern of the pipeline has its own error enum so callers can decide
//! which failures end the run, which are contained to a scene or dataset, and
//! which are only logged. `AppError` wraps them all for the CLI boundary.

use std::path::PathBuf;

use thiserror::Error;

use crate::constants::limits;

/// Network-level failures shared by the envelope client and the download manager
#[derive(Error, Debug)]
pub enum TransportError {
    /// The request never produced a response (connect, timeout, body read)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status
    #[error("Server responded with HTTP {status} for {url}")]
    Status { status: u16, url: String },

    /// A URL could not be built or parsed
    #[error("Invalid URL: {url} - {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl TransportError {
    /// Whether the failure is transient and worth another attempt
    ///
    /// Network-level failures and the status codes listed in
    /// [`limits::RETRYABLE_STATUS_CODES`] qualify. Everything else is a
    /// business-logic failure and is surfaced immediately.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Http(e) => {
                e.is_connect() || e.is_timeout() || e.is_request() || e.is_body()
            }
            TransportError::Status { status, .. } => {
                limits::RETRYABLE_STATUS_CODES.contains(status)
            }
            TransportError::InvalidUrl { .. } => false,
        }
    }
}

/// Authentication failures; these end the run
#[derive(Error, Debug)]
pub enum AuthError {
    /// Missing environment variables for credentials
    #[error("Missing M2M credentials. Set M2M_USERNAME and M2M_TOKEN environment variables")]
    MissingCredentials,

    /// Environment variable error
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    /// The login endpoint answered with an application error
    #[error("M2M login rejected ({code}): {message}")]
    Rejected { code: String, message: String },

    /// The login endpoint answered without a token
    #[error("M2M login response did not contain an access token")]
    MissingToken,

    /// Transport failure after exhausting retries
    #[error("M2M login failed: {0}")]
    Transport(#[from] TransportError),

    /// The session was closed and cannot be reopened
    #[error("M2M session already closed")]
    SessionClosed,
}

/// Failures of authenticated API calls
#[derive(Error, Debug)]
pub enum SessionError {
    /// An operation was attempted before `open()` succeeded
    #[error("Not authenticated: call open() before {endpoint}")]
    NotAuthenticated { endpoint: String },

    /// The session was closed
    #[error("Session closed, cannot call {endpoint}")]
    Closed { endpoint: String },

    /// The envelope carried an application error
    #[error("Remote API error on {endpoint} ({code}): {message}")]
    RemoteApi {
        endpoint: String,
        code: String,
        message: String,
    },

    /// Transport failure after exhausting retries
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The envelope or its payload could not be decoded
    #[error("Failed to decode {endpoint} response: {reason}")]
    Decode { endpoint: String, reason: String },
}

impl SessionError {
    /// Whether the failure is transient at the transport level
    pub fn is_retryable(&self) -> bool {
        matches!(self, SessionError::Transport(e) if e.is_retryable())
    }
}

/// Failures while fetching a single file
#[derive(Error, Debug)]
pub enum DownloadError {
    /// Transport failure
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// I/O error during file operations
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON body was returned where a binary file was expected
    #[error("Server returned {content_type} instead of file data: {excerpt}")]
    DisguisedError {
        content_type: String,
        excerpt: String,
    },

    /// The transfer completed without any bytes
    #[error("Downloaded file is empty: {path}")]
    EmptyBody { path: PathBuf },

    /// Atomic file operation failed
    #[error("Atomic file operation failed: could not rename {temp_path} to {final_path}")]
    AtomicOperationFailed {
        temp_path: PathBuf,
        final_path: PathBuf,
    },

    /// The fetch task panicked or was cancelled
    #[error("Download task aborted: {reason}")]
    TaskAborted { reason: String },
}

impl DownloadError {
    /// Whether another attempt could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, DownloadError::Transport(e) if e.is_retryable())
    }
}

/// Metadata file parsing errors
#[derive(Error, Debug)]
pub enum FormatError {
    /// Neither grammar could be selected
    #[error("Unknown metadata format: {path}")]
    UnknownFormat { path: PathBuf },

    /// I/O error reading the metadata file
    #[error("I/O error reading metadata: {0}")]
    Io(#[from] std::io::Error),

    /// Markup could not be parsed
    #[error("Malformed XML metadata at byte {position}: {reason}")]
    Xml { position: u64, reason: String },

    /// The document did not yield an entity identifier
    #[error("Metadata does not contain an entity identifier: {path}")]
    MissingEntityId { path: PathBuf },
}

/// Persistent store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Database driver error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A scene upsert did not return a surrogate key
    #[error("Scene upsert returned no id for {entity_id}")]
    MissingSceneId { entity_id: String },

    /// A required scene field was absent
    #[error("Scene {entity_id} is missing required field {field}")]
    MissingField { entity_id: String, field: String },

    /// A table name contained characters outside `[A-Za-z0-9_.]`
    #[error("Invalid table name: {name}")]
    InvalidIdentifier { name: String },
}

/// External raster loading tool failures
#[derive(Error, Debug)]
pub enum RasterError {
    /// The tool could not be started
    #[error("Failed to start {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// The tool exited unsuccessfully
    #[error("{tool} failed with status {status:?}: {stderr}")]
    Failed {
        tool: String,
        status: Option<i32>,
        stderr: String,
    },

    /// The tool did not finish within the configured timeout
    #[error("Raster ingestion timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// Copying staged rows into the band table failed
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Required tooling absent at startup
#[derive(Error, Debug)]
pub enum DependencyError {
    /// The named tool is not on PATH
    #[error("Required tool not found on PATH: {tool}")]
    Missing { tool: String },
}

/// Deleting a remote scene list failed; logged, never propagated
#[derive(Error, Debug)]
#[error("Failed to delete scene list {list_id}: {source}")]
pub struct ResourceCleanupError {
    pub list_id: String,
    #[source]
    pub source: SessionError,
}

/// Failures contained to a single scene
#[derive(Error, Debug)]
pub enum SceneError {
    /// The remote catalog offered none of the configured bands
    #[error("No matching bands available for {entity_id}")]
    NoBandsAvailable { entity_id: String },

    /// Download request produced no URLs
    #[error("No downloads available for {entity_id}")]
    NoDownloadsAvailable { entity_id: String },

    /// Every requested file failed to download
    #[error("No successful downloads for {entity_id}")]
    NoSuccessfulDownloads { entity_id: String },

    /// None of the downloaded files was a metadata file
    #[error("Metadata file not found among downloads for {entity_id}")]
    MetadataMissing { entity_id: String },

    /// The scene record has no acquisition date to derive the band table year
    #[error("Scene {entity_id} has no acquisition date")]
    MissingAcquisitionDate { entity_id: String },

    /// Metadata parsing failed
    #[error(transparent)]
    Format(#[from] FormatError),

    /// Store write failed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Remote API failed
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Local filesystem failure
    #[error("Scene I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    NotFound { path: PathBuf },

    /// Configuration file could not be read
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration format
    #[error("Invalid configuration format: {0}")]
    InvalidFormat(#[from] toml::de::Error),

    /// Missing required configuration field
    #[error("Missing required configuration field: {field}")]
    MissingField { field: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for {field}: {value}. {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    /// Configuration validation failed
    #[error("Configuration validation failed: {errors:?}")]
    ValidationFailed { errors: Vec<String> },
}

/// Top-level application error that can represent any error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Authentication error
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Remote session error
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Download error
    #[error(transparent)]
    Download(#[from] DownloadError),

    /// Metadata format error
    #[error(transparent)]
    Format(#[from] FormatError),

    /// Store error
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Raster tool error
    #[error(transparent)]
    Raster(#[from] RasterError),

    /// Missing tooling
    #[error(transparent)]
    Dependency(#[from] DependencyError),

    /// Scene processing error
    #[error(transparent)]
    Scene(#[from] SceneError),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Generic I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Generic application error with context
    #[error("Application error: {message}")]
    Generic { message: String },
}

impl AppError {
    /// Create a generic application error with a message
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// Check if the error is recoverable (transient)
    pub fn is_recoverable(&self) -> bool {
        match self {
            AppError::Session(e) => e.is_retryable(),
            AppError::Download(e) => e.is_retryable(),
            AppError::Auth(AuthError::Transport(e)) => e.is_retryable(),
            AppError::Raster(RasterError::Timeout { .. }) => true,
            _ => false,
        }
    }

    /// Whether the error must end the run rather than be contained
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AppError::Auth(_) | AppError::Dependency(_) | AppError::Config(_)
        )
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Auth(_) => "authentication",
            AppError::Session(_) => "session",
            AppError::Download(_) => "download",
            AppError::Format(_) => "format",
            AppError::Store(_) => "store",
            AppError::Raster(_) => "raster",
            AppError::Dependency(_) => "dependency",
            AppError::Scene(_) => "scene",
            AppError::Config(_) => "config",
            AppError::Io(_) => "io",
            AppError::Generic { .. } => "generic",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

/// Authentication result type alias
pub type AuthResult<T> = std::result::Result<T, AuthError>;

/// Session result type alias
pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// Format result type alias
pub type FormatResult<T> = std::result::Result<T, FormatError>;

/// Store result type alias
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Raster result type alias
pub type RasterResult<T> = std::result::Result<T, RasterError>;

/// Scene result type alias
pub type SceneResult<T> = std::result::Result<T, SceneError>;

/// Config result type alias
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
