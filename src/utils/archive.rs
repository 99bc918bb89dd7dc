//! Single-entry zip compression for backup artifacts

use crate::error::BackupError;
use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Compress `file_path` into `<file_path>.zip` and delete the original
///
/// The archive holds exactly one member named after the original file.
pub fn compress_backup(file_path: &Path) -> Result<PathBuf> {
    let file_name = file_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .with_context(|| format!("Invalid backup file path: {:?}", file_path))?;

    let compressed = file_path.with_file_name(format!("{}.zip", file_name));

    let mut source = File::open(file_path)
        .with_context(|| format!("Failed to open backup file: {:?}", file_path))?;
    let out = File::create(&compressed)
        .with_context(|| format!("Failed to create archive: {:?}", compressed))?;

    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(true);

    let mut zip = ZipWriter::new(out);
    zip.start_file(file_name.as_str(), options)
        .context("Failed to start archive entry")?;
    io::copy(&mut source, &mut zip).context("Failed to write archive entry")?;
    zip.finish().context("Failed to finalize archive")?;

    fs::remove_file(file_path)
        .with_context(|| format!("Failed to remove uncompressed file: {:?}", file_path))?;

    info!("Backup compressed: {}", compressed.display());
    Ok(compressed)
}

/// Extract the artifact from `compressed` into `extract_dir`
///
/// The expected member is the archive name minus `.zip`; a missing member or
/// an unreadable archive is a data integrity error.
pub fn decompress_backup(compressed: &Path, extract_dir: &Path) -> Result<PathBuf> {
    let archive_name = compressed
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let member = archive_name
        .strip_suffix(".zip")
        .ok_or_else(|| {
            BackupError::integrity(format!("Not a zip artifact: {}", compressed.display()))
        })?
        .to_string();

    let file = File::open(compressed)
        .with_context(|| format!("Failed to open archive: {:?}", compressed))?;
    let mut archive = ZipArchive::new(file).map_err(|e| {
        BackupError::integrity(format!("Malformed archive {}: {}", compressed.display(), e))
    })?;

    let mut entry = archive.by_name(&member).map_err(|_| {
        BackupError::integrity(format!(
            "Decompressed file not found: {} is missing entry '{}'",
            compressed.display(),
            member
        ))
    })?;

    let extracted = extract_dir.join(&member);
    let mut out = File::create(&extracted)
        .with_context(|| format!("Failed to create {:?}", extracted))?;
    io::copy(&mut entry, &mut out).map_err(|e| {
        BackupError::integrity(format!("Corrupt archive entry '{}': {}", member, e))
    })?;

    info!("Backup decompressed: {}", extracted.display());
    Ok(extracted)
}
