//! Landsat Ingest Library
//!
//! Acquires Landsat scenes from the USGS Machine-to-Machine API and registers
//! their metadata and band rasters in PostgreSQL/PostGIS. Runs are resumable
//! and deduplicated against the store.

pub mod app;
pub mod cli;
pub mod config;
pub mod constants;
pub mod errors;

// Re-export commonly used types for convenience
pub use errors::{AppError, Result};

#[cfg(test)]
mod tests {
    use super::*;
    use constants::*;

    #[test]
    fn test_constants_accessible() {
        assert_eq!(DEFAULT_CONCURRENCY, 5);
        assert_eq!(ENV_USERNAME, "M2M_USERNAME");
        assert_eq!(ENV_TOKEN, "M2M_TOKEN");
        assert!(USER_AGENT.contains("landsat-ingest"));
    }

    #[test]
    fn test_error_types() {
        let auth_error = errors::AuthError::MissingCredentials;
        let app_error = AppError::Auth(auth_error);

        assert_eq!(app_error.category(), "authentication");
        assert!(!app_error.is_recoverable());
        assert!(app_error.is_fatal());
    }
}
