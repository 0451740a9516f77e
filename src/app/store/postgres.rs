//! PostgreSQL/PostGIS store

use std::collections::HashSet;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info, warn};

use super::{checked_identifier, SceneStore};
use crate::app::metadata::SceneRecord;
use crate::app::models::{BandRecord, DownloadLogEntry};
use crate::constants::store;
use crate::errors::{StoreError, StoreResult};

/// Store writing to the `bronze` schema
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect a pool to `database_url`
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Database` if the connection cannot be established
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(database_url)
            .await?;
        info!("Connected to database ({} connections max)", max_connections);
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn upsert_sql() -> String {
        format!(
            "INSERT INTO {table} (entity_id, display_id, dataset_name, sensor, satellite, \
             acquisition_date, path_row, cloud_cover, sun_azimuth, sun_elevation, \
             processing_level, footprint) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, \
             CASE WHEN $12::text IS NULL THEN NULL \
             ELSE ST_Transform(ST_GeomFromText($12::text, {geographic}), {storage}) END) \
             ON CONFLICT (entity_id) DO UPDATE SET \
             cloud_cover = EXCLUDED.cloud_cover, \
             sun_azimuth = EXCLUDED.sun_azimuth, \
             sun_elevation = EXCLUDED.sun_elevation \
             RETURNING scene_id::bigint",
            table = store::SCENES_TABLE,
            geographic = store::GEOGRAPHIC_SRID,
            storage = store::STORAGE_SRID,
        )
    }
}

#[async_trait]
impl SceneStore for PostgresStore {
    async fn existing_entity_ids(&self, entity_ids: &[String]) -> StoreResult<HashSet<String>> {
        if entity_ids.is_empty() {
            return Ok(HashSet::new());
        }

        let sql = format!(
            "SELECT entity_id FROM {} WHERE entity_id = ANY($1)",
            store::SCENES_TABLE
        );
        let rows: Vec<String> = sqlx::query_scalar(&sql)
            .bind(entity_ids.to_vec())
            .fetch_all(&self.pool)
            .await?;

        debug!("{} of {} scenes already registered", rows.len(), entity_ids.len());
        Ok(rows.into_iter().collect())
    }

    async fn upsert_scene(&self, scene: &SceneRecord) -> StoreResult<i64> {
        let footprint = scene.footprint.as_ref().map(|footprint| footprint.to_wkt());

        let scene_id: Option<i64> = sqlx::query_scalar(&Self::upsert_sql())
            .bind(&scene.entity_id)
            .bind(&scene.display_id)
            .bind(&scene.dataset_name)
            .bind(&scene.sensor)
            .bind(&scene.satellite)
            .bind(scene.acquisition_date)
            .bind(&scene.path_row)
            .bind(scene.cloud_cover)
            .bind(scene.sun_azimuth)
            .bind(scene.sun_elevation)
            .bind(&scene.processing_level)
            .bind(footprint)
            .fetch_optional(&self.pool)
            .await?;

        let scene_id = scene_id.ok_or_else(|| StoreError::MissingSceneId {
            entity_id: scene.entity_id.clone(),
        })?;
        info!(entity_id = %scene.entity_id, "Registered scene {}", scene_id);
        Ok(scene_id)
    }

    async fn log_download(&self, entry: &DownloadLogEntry) -> StoreResult<()> {
        let sql = format!(
            "INSERT INTO {} (entity_id, band_name, download_status, file_size_mb, \
             error_message, download_url, download_duration_seconds) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
            store::DOWNLOAD_LOG_TABLE
        );

        sqlx::query(&sql)
            .bind(&entry.entity_id)
            .bind(&entry.band_name)
            .bind(entry.status.as_str())
            .bind(entry.file_size_mb)
            .bind(&entry.error_message)
            .bind(&entry.source_url)
            .bind(entry.duration.as_secs_f64())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn attach_band(&self, band: &BandRecord, staging_table: &str) -> StoreResult<()> {
        let staging = checked_identifier(staging_table)?;
        let target = band.target_table();
        let target = checked_identifier(&target)?;

        let file_name = band
            .raster_path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_string();

        let sql = format!(
            "INSERT INTO {target} (scene_id, band_name, year, rast, filename) \
             SELECT $1, $2, $3, rast, COALESCE(filename, $4) FROM {staging}"
        );
        let copied = sqlx::query(&sql)
            .bind(band.scene_id)
            .bind(&band.band_name)
            .bind(band.acquisition_year)
            .bind(file_name)
            .execute(&self.pool)
            .await;

        let dropped = self.discard_staging(staging).await;

        let copied = copied?;
        dropped?;
        debug!(
            "Copied {} tiles of {} into {}",
            copied.rows_affected(),
            band.band_name,
            target
        );
        Ok(())
    }

    async fn discard_staging(&self, staging_table: &str) -> StoreResult<()> {
        let staging = checked_identifier(staging_table)?;
        if let Err(e) = sqlx::query(&format!("DROP TABLE IF EXISTS {}", staging))
            .execute(&self.pool)
            .await
        {
            warn!("Failed to drop staging table {}: {}", staging, e);
            return Err(e.into());
        }
        Ok(())
    }
}
