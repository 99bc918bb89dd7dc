//! Backup manager - runs the backup and restore pipelines for a target
//!
//! Backup: validate -> lock -> engine dump -> zip -> store.
//! Restore: validate -> confirm -> lock -> retrieve -> unzip -> check -> engine replay.
//!
//! Every stage must succeed; the first failure aborts the run for that target.

use crate::config::{validate_target, Target};
use crate::error::BackupError;
use crate::managers::prompt::{ConfirmPrompt, TerminalPrompt};
use crate::managers::registry::HandlerRegistry;
use crate::utils::{self, compress_backup, decompress_backup, TargetLock};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;
use tracing::{error, info, warn};

/// How a restore call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    Restored,
    /// Declined at the confirmation prompt; nothing was touched
    Cancelled,
}

pub struct BackupManager {
    registry: HandlerRegistry,
    prompt: Arc<dyn ConfirmPrompt>,
}

impl Default for BackupManager {
    fn default() -> Self {
        Self::new()
    }
}

impl BackupManager {
    /// Manager with the built-in handlers and a terminal prompt
    pub fn new() -> Self {
        Self::with_registry(HandlerRegistry::new())
    }

    pub fn with_registry(registry: HandlerRegistry) -> Self {
        Self {
            registry,
            prompt: Arc::new(TerminalPrompt),
        }
    }

    pub fn with_prompt(mut self, prompt: Arc<dyn ConfirmPrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    /// Back up one target and return the path of the compressed artifact
    pub async fn perform_backup(&self, target: &Target) -> Result<PathBuf> {
        validate_target(target)
            .with_context(|| format!("Invalid configuration for target '{}'", target.id))?;

        let mut lock = TargetLock::open(target)?;
        let _guard = lock.try_acquire()?;

        let db_handler = self.registry.database(target.database.db_type)?;
        let storage = self.registry.storage(target.backup.cloud.cloud_type)?;

        let start_time = Instant::now();
        info!(
            "Starting {} backup for target: {}",
            db_handler.name(),
            target.id
        );

        let raw = db_handler
            .backup(target)
            .await
            .with_context(|| format!("{} backup failed for target '{}'", db_handler.name(), target.id))?;

        let to_compress = raw.clone();
        let compressed = match tokio::task::spawn_blocking(move || compress_backup(&to_compress))
            .await
            .context("Compression task panicked")?
        {
            Ok(path) => path,
            Err(e) => {
                if let Err(rm) = std::fs::remove_file(&raw) {
                    warn!("Failed to remove uncompressed artifact {:?}: {}", raw, rm);
                }
                return Err(e.context(format!("Compression failed for target '{}'", target.id)));
            }
        };

        if let Err(e) = storage.store(&compressed, target).await {
            // An unstored zip must not be picked up as the latest backup
            if let Err(rm) = tokio::fs::remove_file(&compressed).await {
                warn!("Failed to remove unstored artifact {:?}: {}", compressed, rm);
            }
            return Err(e.context(format!("Storing {} failed", compressed.display())));
        }

        info!(
            "Backup completed for target '{}' in {:.2}s: {}",
            target.id,
            start_time.elapsed().as_secs_f64(),
            compressed.display()
        );
        Ok(compressed)
    }

    /// Restore one target from `backup_file` (local path or storage object name)
    ///
    /// Without `force` the user is asked first. The working directory used for
    /// the fetched and extracted files is removed however the call ends.
    pub async fn perform_restore(
        &self,
        target: &Target,
        backup_file: &str,
        force: bool,
    ) -> Result<RestoreOutcome> {
        validate_target(target)
            .with_context(|| format!("Invalid configuration for target '{}'", target.id))?;

        if !force {
            let question = format!(
                "Restore target '{}' from {}? This overwrites the current {} database",
                target.id, backup_file, target.database.db_type
            );
            if !self.prompt.confirm(&question)? {
                info!("Restore cancelled");
                return Ok(RestoreOutcome::Cancelled);
            }
        }

        let mut lock = TargetLock::open(target)?;
        let _guard = lock.try_acquire()?;

        let db_handler = self.registry.database(target.database.db_type)?;
        let storage = self.registry.storage(target.backup.cloud.cloud_type)?;

        info!("Starting restore for target '{}' from {}", target.id, backup_file);

        let work_dir = TempDir::new().context("Failed to create restore working directory")?;
        let fetched = storage
            .retrieve(backup_file, target, work_dir.path())
            .await
            .with_context(|| format!("Retrieving {} failed", backup_file))?;

        let extract_dir = work_dir.path().to_path_buf();
        let extracted = tokio::task::spawn_blocking(move || decompress_backup(&fetched, &extract_dir))
            .await
            .context("Decompression task panicked")??;

        let expected = target.database.db_type.artifact_extension();
        let actual = extracted
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_default();
        if actual != expected {
            error!(
                "Invalid backup file extension for target '{}': expected .{}, got .{}",
                target.id, expected, actual
            );
            return Err(BackupError::integrity(format!(
                "Invalid backup file extension: expected .{}, got {}",
                expected,
                extracted.display()
            ))
            .into());
        }

        db_handler
            .restore(target, &extracted, force)
            .await
            .with_context(|| format!("{} restore failed for target '{}'", db_handler.name(), target.id))?;

        info!("Restore completed for target: {}", target.id);
        Ok(RestoreOutcome::Restored)
    }

    /// Most recent compressed artifact for `target` in `dir`
    pub fn find_latest_backup(&self, target: &Target, dir: &Path) -> Result<Option<PathBuf>> {
        utils::find_latest_backup(target, dir)
    }

    /// Every artifact of `target` in its staging directory, newest name first
    pub fn list_backups(&self, target: &Target) -> Result<Vec<PathBuf>> {
        utils::list_backups(target)
    }

    /// Back up each target in turn, continuing past failures
    pub async fn backup_all(&self, targets: &[Target]) -> Result<Vec<PathBuf>> {
        let mut artifacts = Vec::new();
        let mut errors = Vec::new();

        for target in targets {
            match self.perform_backup(target).await {
                Ok(path) => artifacts.push(path),
                Err(e) => {
                    error!("Backup failed for target '{}': {:#}", target.id, e);
                    errors.push(format!("{}: {}", target.id, e));
                }
            }
        }

        if !errors.is_empty() {
            anyhow::bail!(
                "Backup failed for {} target(s): {}",
                errors.len(),
                errors.join(", ")
            );
        }

        Ok(artifacts)
    }
}
