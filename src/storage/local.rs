//! Local storage: the staging directory is the storage location

use super::{reference_name, StorageHandler};
use crate::config::Target;
use crate::error::BackupError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::info;

pub struct LocalStorage;

#[async_trait]
impl StorageHandler for LocalStorage {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn store(&self, file_path: &Path, _target: &Target) -> Result<()> {
        info!("Backup stored locally: {}", file_path.display());
        Ok(())
    }

    /// Copy the artifact `reference` into `dest_dir`
    ///
    /// Relative references are looked up in the staging directory first.
    async fn retrieve(&self, reference: &str, target: &Target, dest_dir: &Path) -> Result<PathBuf> {
        let src = resolve(reference, target).await.ok_or_else(|| {
            BackupError::integrity(format!("Backup file not found: {}", reference))
        })?;

        let dest = dest_dir.join(reference_name(reference)?);
        tokio::fs::copy(&src, &dest)
            .await
            .with_context(|| format!("Failed to copy {:?} to {:?}", src, dest))?;

        info!("Backup retrieved locally: {}", dest.display());
        Ok(dest)
    }
}

async fn resolve(reference: &str, target: &Target) -> Option<PathBuf> {
    let path = Path::new(reference);
    let mut candidates = Vec::with_capacity(2);
    if path.is_relative() {
        candidates.push(target.backup.local_path.join(path));
    }
    candidates.push(path.to_path_buf());

    for candidate in candidates {
        if tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
            return Some(candidate);
        }
    }
    None
}
