//! Raster loading through the external `raster2pgsql | psql` pipeline
//!
//! The pipeline loads one raster file into a staging table; the store then
//! copies the staged tiles into the per-year band table.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::constants::raster;
use crate::errors::{DependencyError, RasterError, RasterResult};

/// Loads a local raster file into a database table
#[async_trait]
pub trait RasterIngestor: Send + Sync {
    async fn ingest_raster(&self, local_path: &Path, target_table: &str) -> RasterResult<()>;
}

/// Random staging table name in the staging schema
pub fn staging_table_name() -> String {
    format!(
        "{}.{}{:08x}",
        raster::STAGING_SCHEMA,
        raster::STAGING_PREFIX,
        fastrand::u32(..)
    )
}

/// Locate an executable in a `PATH`-style list of directories
pub fn find_in_path(tool: &str, path_var: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(path_var)
        .map(|dir| dir.join(tool))
        .find(|candidate| candidate.is_file())
}

/// Verify every tool is on `PATH`
///
/// # Errors
///
/// Returns `DependencyError::Missing` naming the first absent tool
pub fn check_dependencies(tools: &[&str]) -> Result<(), DependencyError> {
    let path_var = std::env::var_os("PATH").unwrap_or_default();
    for tool in tools {
        match find_in_path(tool, &path_var) {
            Some(location) => debug!("Found {} at {}", tool, location.display()),
            None => {
                return Err(DependencyError::Missing {
                    tool: tool.to_string(),
                })
            }
        }
    }
    Ok(())
}

/// `raster2pgsql` piped into `psql`
#[derive(Debug, Clone)]
pub struct Raster2PgsqlIngestor {
    database_url: String,
    raster2pgsql: String,
    psql: String,
    tile_size: String,
    timeout: Duration,
    dry_run: bool,
}

impl Raster2PgsqlIngestor {
    pub fn new(database_url: impl Into<String>, dry_run: bool) -> Self {
        Self {
            database_url: database_url.into(),
            raster2pgsql: raster::RASTER2PGSQL.to_string(),
            psql: raster::PSQL.to_string(),
            tile_size: raster::DEFAULT_TILE_SIZE.to_string(),
            timeout: raster::DEFAULT_TIMEOUT,
            dry_run,
        }
    }

    /// Override the tool executables
    pub fn with_tools(mut self, raster2pgsql: impl Into<String>, psql: impl Into<String>) -> Self {
        self.raster2pgsql = raster2pgsql.into();
        self.psql = psql.into();
        self
    }

    pub fn with_tile_size(mut self, tile_size: impl Into<String>) -> Self {
        self.tile_size = tile_size.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Verify the configured tools are installed; skipped in dry-run
    pub fn check_dependencies(&self) -> Result<(), DependencyError> {
        if self.dry_run {
            info!("DRY-RUN: skipping raster tool dependency check");
            return Ok(());
        }
        check_dependencies(&[self.raster2pgsql.as_str(), self.psql.as_str()])
    }

    fn spawn_error(tool: &str) -> impl FnOnce(std::io::Error) -> RasterError + '_ {
        move |source| RasterError::Spawn {
            tool: tool.to_string(),
            source,
        }
    }

    async fn run_pipeline(&self, local_path: &Path, target_table: &str) -> RasterResult<()> {
        let mut producer = Command::new(&self.raster2pgsql)
            .arg("-d")
            .arg("-t")
            .arg(&self.tile_size)
            .arg("-F")
            .arg(local_path)
            .arg(target_table)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(Self::spawn_error(&self.raster2pgsql))?;

        let pipe = producer
            .stdout
            .take()
            .ok_or_else(|| RasterError::Spawn {
                tool: self.raster2pgsql.clone(),
                source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "stdout not captured"),
            })?;
        let pipe: Stdio = pipe.try_into().map_err(Self::spawn_error(&self.raster2pgsql))?;

        let consumer = Command::new(&self.psql)
            .arg(&self.database_url)
            .arg("-q")
            .arg("-v")
            .arg("ON_ERROR_STOP=1")
            .stdin(pipe)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(Self::spawn_error(&self.psql))?;

        let (producer_output, consumer_output) =
            tokio::join!(producer.wait_with_output(), consumer.wait_with_output());
        let producer_output = producer_output.map_err(Self::spawn_error(&self.raster2pgsql))?;
        let consumer_output = consumer_output.map_err(Self::spawn_error(&self.psql))?;

        log_stderr(&self.raster2pgsql, &producer_output.stderr);
        log_stderr(&self.psql, &consumer_output.stderr);

        for (tool, output) in [
            (&self.raster2pgsql, &producer_output),
            (&self.psql, &consumer_output),
        ] {
            if !output.status.success() {
                return Err(RasterError::Failed {
                    tool: tool.clone(),
                    status: output.status.code(),
                    stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                });
            }
        }

        Ok(())
    }
}

/// PostgreSQL notices about dropping absent tables are expected with `-d`
fn log_stderr(tool: &str, stderr: &[u8]) {
    for line in String::from_utf8_lossy(stderr).lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.contains("NOTICE") && line.contains("does not exist, skipping") {
            info!("{}: {}", tool, line);
        } else {
            warn!("{}: {}", tool, line);
        }
    }
}

#[async_trait]
impl RasterIngestor for Raster2PgsqlIngestor {
    async fn ingest_raster(&self, local_path: &Path, target_table: &str) -> RasterResult<()> {
        if self.dry_run {
            info!(
                "DRY-RUN: would load {} into {}",
                local_path.display(),
                target_table
            );
            return Ok(());
        }

        debug!("Loading {} into {}", local_path.display(), target_table);
        match tokio::time::timeout(self.timeout, self.run_pipeline(local_path, target_table)).await
        {
            Ok(result) => result,
            Err(_) => Err(RasterError::Timeout {
                seconds: self.timeout.as_secs(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_staging_table_name_shape() {
        let name = staging_table_name();
        assert!(name.starts_with("bronze.temp_ingest_"));
        assert_eq!(name.len(), "bronze.temp_ingest_".len() + 8);
        assert_ne!(staging_table_name(), staging_table_name());
    }

    #[test]
    fn test_find_in_path() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("raster2pgsql"), b"").unwrap();

        let path_var = std::env::join_paths([PathBuf::from("/nonexistent"), dir.path().to_path_buf()])
            .unwrap();
        assert_eq!(
            find_in_path("raster2pgsql", &path_var),
            Some(dir.path().join("raster2pgsql"))
        );
        assert_eq!(find_in_path("psql", &path_var), None);
    }

    #[test]
    fn test_missing_dependency_is_reported() {
        let result = check_dependencies(&["landsat-ingest-no-such-tool"]);
        match result {
            Err(DependencyError::Missing { tool }) => assert_eq!(tool, "landsat-ingest-no-such-tool"),
            other => panic!("Expected missing tool, got {:?}", other),
        }
    }

    #[test]
    fn test_dry_run_skips_dependency_check() {
        let ingestor = Raster2PgsqlIngestor::new("postgres://localhost/db", true)
            .with_tools("landsat-ingest-no-such-tool", "landsat-ingest-no-such-tool");
        assert!(ingestor.check_dependencies().is_ok());
    }

    #[tokio::test]
    async fn test_dry_run_does_not_spawn() {
        let ingestor = Raster2PgsqlIngestor::new("postgres://localhost/db", true)
            .with_tools("landsat-ingest-no-such-tool", "landsat-ingest-no-such-tool");
        ingestor
            .ingest_raster(Path::new("/nonexistent.TIF"), "bronze.temp_ingest_00000000")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unstartable_tool_is_spawn_error() {
        let ingestor = Raster2PgsqlIngestor::new("postgres://localhost/db", false)
            .with_tools("landsat-ingest-no-such-tool", "psql");
        let result = ingestor
            .ingest_raster(Path::new("/nonexistent.TIF"), "bronze.temp_ingest_00000000")
            .await;
        assert!(matches!(result, Err(RasterError::Spawn { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_pipeline_success_and_failure() {
        let ok = Raster2PgsqlIngestor::new("postgres://localhost/db", false).with_tools("true", "true");
        ok.ingest_raster(Path::new("/tmp/a.TIF"), "bronze.temp_ingest_00000000")
            .await
            .unwrap();

        let failing =
            Raster2PgsqlIngestor::new("postgres://localhost/db", false).with_tools("true", "false");
        match failing
            .ingest_raster(Path::new("/tmp/a.TIF"), "bronze.temp_ingest_00000000")
            .await
        {
            Err(RasterError::Failed { tool, status, .. }) => {
                assert_eq!(tool, "false");
                assert_eq!(status, Some(1));
            }
            other => panic!("Expected psql failure, got {:?}", other),
        }
    }
}
