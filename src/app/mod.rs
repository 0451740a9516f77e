//! Core application logic for the Landsat ingestion pipeline
//!
//! This module contains the M2M API session, the download manager, the
//! metadata parser, the persistent store, the raster loader and the
//! coordinator that ties them together.
//!
//! # Examples
//!
//! ```rust,no_run
//! use landsat_ingest::app::{CatalogApi, ClientConfig, M2mSession};
//! use landsat_ingest::app::models::Credential;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let session = M2mSession::new(&ClientConfig::default(), Credential::from_env()?, false)?;
//! session.open().await?;
//!
//! // Remove a list left behind by an interrupted run
//! session.delete_list("temp_landsat_ot_c2_l2_20260101_120000_1a2b").await?;
//!
//! session.close().await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod coordinator;
pub mod download;
pub mod metadata;
pub mod models;
pub mod raster;
pub mod retry;
pub mod store;

// Re-export main public API
pub use client::{with_list, CatalogApi, ClientConfig, M2mSession, SceneListHandle};
pub use coordinator::{CoordinatorConfig, IngestionCoordinator, RunStatistics};
pub use download::DownloadManager;
pub use metadata::{MetadataParser, SceneRecord};
pub use raster::{Raster2PgsqlIngestor, RasterIngestor};
pub use retry::RetryPolicy;
pub use store::{MemoryStore, PostgresStore, SceneStore};
