//! File-based locking to prevent concurrent runs against one target
//!
//! Manual and scheduled runs of the same target share a staging directory.
//! Both `perform_backup` and `perform_restore` hold an exclusive lock for the
//! whole run. The lock file lives in the system temp directory, keyed by the
//! target id and its staging path, so the staging directory only ever holds
//! artifacts.

use crate::config::Target;
use crate::error::BackupError;
use anyhow::{Context, Result};
use fd_lock::{RwLock, RwLockWriteGuard};
use std::collections::hash_map::DefaultHasher;
use std::fs::{File, OpenOptions};
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Lock file for a target
pub struct TargetLock {
    lock: RwLock<File>,
    target_id: String,
    lock_path: PathBuf,
}

impl TargetLock {
    /// Open (or create) the target's lock file
    pub fn open(target: &Target) -> Result<Self> {
        let lock_path = Self::lock_path(target);
        debug!("Opening lock file: {:?}", lock_path);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .with_context(|| format!("Failed to open lock file: {:?}", lock_path))?;

        Ok(Self {
            lock: RwLock::new(file),
            target_id: target.id.clone(),
            lock_path,
        })
    }

    /// Take the exclusive lock without waiting
    ///
    /// Fails with [`BackupError::Locked`] if another run holds it.
    pub fn try_acquire(&mut self) -> Result<RwLockWriteGuard<'_, File>> {
        let guard = self.lock.try_write().map_err(|_| BackupError::Locked {
            target: self.target_id.clone(),
            path: self.lock_path.clone(),
        })?;

        info!("Acquired lock for target: {}", self.target_id);
        Ok(guard)
    }

    fn lock_path(target: &Target) -> PathBuf {
        let mut hasher = DefaultHasher::new();
        target.backup.local_path.hash(&mut hasher);

        std::env::temp_dir().join(format!(
            "db-backup-{}-{:016x}.lock",
            target.id,
            hasher.finish()
        ))
    }

    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for TargetLock {
    fn drop(&mut self) {
        debug!("Released lock: {:?}", self.lock_path);
    }
}
