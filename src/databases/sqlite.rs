//! SQLite handler: online page copy of the database file

use super::DatabaseHandler;
use crate::config::Target;
use crate::error::BackupError;
use crate::utils::artifact::new_artifact_path;
use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::backup::Backup;
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

const PAGES_PER_STEP: i32 = 256;

pub struct SqliteHandler;

fn source_path(target: &Target) -> Result<PathBuf> {
    target
        .database
        .path
        .clone()
        .ok_or_else(|| anyhow::anyhow!("SQLite requires 'path'"))
}

/// Copy `src_path` into a new database at `dst_path` using the backup API
///
/// Safe against concurrent writers on the source; the copy is consistent.
fn online_copy(src_path: &Path, dst_path: &Path) -> Result<()> {
    let src = Connection::open_with_flags(src_path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .map_err(|e| BackupError::connectivity("SQLite", src_path.display().to_string(), e))?;
    let mut dst = Connection::open(dst_path)
        .with_context(|| format!("Failed to create backup file: {:?}", dst_path))?;

    let backup = Backup::new(&src, &mut dst)
        .map_err(|e| BackupError::engine("SQLite", "starting online backup", e))?;
    backup
        .run_to_completion(PAGES_PER_STEP, Duration::from_millis(5), None)
        .map_err(|e| BackupError::engine("SQLite", "copying pages", e))?;

    Ok(())
}

#[async_trait]
impl DatabaseHandler for SqliteHandler {
    fn name(&self) -> &'static str {
        "SQLite"
    }

    fn extension(&self) -> &'static str {
        "db"
    }

    async fn backup(&self, target: &Target) -> Result<PathBuf> {
        let src_path = source_path(target)?;
        if !src_path.exists() {
            return Err(BackupError::connectivity(
                "SQLite",
                src_path.display().to_string(),
                std::io::Error::new(std::io::ErrorKind::NotFound, "database file not found"),
            )
            .into());
        }

        let backup_file = new_artifact_path(target, self.extension())?;
        debug!("SQLite online backup {:?} -> {:?}", src_path, backup_file);

        let dst = backup_file.clone();
        tokio::task::spawn_blocking(move || online_copy(&src_path, &dst))
            .await
            .context("SQLite backup task panicked")??;

        info!("SQLite backup completed: {}", backup_file.display());
        Ok(backup_file)
    }

    /// Overwrite the configured database file with the artifact
    async fn restore(&self, target: &Target, backup_file: &Path, _force: bool) -> Result<()> {
        let db_path = source_path(target)?;

        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }

        tokio::fs::copy(backup_file, &db_path)
            .await
            .with_context(|| format!("Failed to copy {:?} to {:?}", backup_file, db_path))?;

        info!("SQLite restore completed: {}", db_path.display());
        Ok(())
    }
}
