//! Artifact naming and discovery
//!
//! Every backup produces `{db_type}_{target_id}_{db_name}_{YYYYMMDD_HHMMSS}.{ext}`
//! in the staging directory, and `.zip` is appended after compression. The
//! filename is the only index: "latest backup" means the newest matching file.

use crate::config::Target;
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
pub const COMPRESSED_SUFFIX: &str = ".zip";

/// `{db_type}_{target_id}_{db_name}_`
fn target_prefix(target: &Target) -> String {
    format!(
        "{}_{}_{}_",
        target.database.db_type,
        target.id,
        target.database.artifact_name()
    )
}

/// Build the filename for a fresh uncompressed artifact
pub fn artifact_file_name(target: &Target, ext: &str, at: DateTime<Local>) -> String {
    format!(
        "{}{}.{}",
        target_prefix(target),
        at.format(TIMESTAMP_FORMAT),
        ext
    )
}

/// Allocate a new artifact path under the staging directory, creating it if needed
pub fn new_artifact_path(target: &Target, ext: &str) -> Result<PathBuf> {
    let dir = &target.backup.local_path;
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create backup directory: {:?}", dir))?;

    Ok(dir.join(artifact_file_name(target, ext, Local::now())))
}

/// Does `file_name` follow the naming contract for `target` (compressed form)?
pub fn matches_target(target: &Target, file_name: &str) -> bool {
    let Some(rest) = file_name.strip_prefix(&target_prefix(target)) else {
        return false;
    };
    let Some(rest) = rest.strip_suffix(COMPRESSED_SUFFIX) else {
        return false;
    };

    // rest = YYYYMMDD_HHMMSS.ext
    let Some((stamp, ext)) = rest.split_once('.') else {
        return false;
    };
    is_timestamp(stamp) && !ext.is_empty()
}

fn is_timestamp(stamp: &str) -> bool {
    let bytes = stamp.as_bytes();
    bytes.len() == 15
        && bytes[8] == b'_'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 8 || b.is_ascii_digit())
}

/// Newest compressed artifact for `target` in `dir`, by modification time
pub fn find_latest_backup(target: &Target, dir: &Path) -> Result<Option<PathBuf>> {
    if !dir.exists() {
        return Ok(None);
    }

    let mut candidates: Vec<(SystemTime, PathBuf)> = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to list {:?}", dir))? {
        let entry = entry?;
        let name = entry.file_name();
        if !matches_target(target, &name.to_string_lossy()) {
            continue;
        }
        let modified = entry
            .metadata()
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        candidates.push((modified, entry.path()));
    }

    // Newest first; ties broken by name so the later timestamp wins
    candidates.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));
    Ok(candidates.into_iter().next().map(|(_, path)| path))
}

/// Every `{db_type}_{target_id}_*.zip` in the staging directory, newest name first
pub fn list_backups(target: &Target) -> Result<Vec<PathBuf>> {
    let dir = &target.backup.local_path;
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let prefix = format!("{}_{}_", target.database.db_type, target.id);
    let mut backups: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("Failed to list {:?}", dir))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            let name = entry.file_name().to_string_lossy().to_string();
            name.starts_with(&prefix) && name.ends_with(COMPRESSED_SUFFIX)
        })
        .map(|entry| entry.path())
        .collect();

    backups.sort();
    backups.reverse();
    Ok(backups)
}
