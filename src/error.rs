//! Error taxonomy for backup and restore runs
//!
//! Configuration problems live in [`crate::config::ConfigError`]. Everything a
//! handler or the pipeline can fail with at run time is a [`BackupError`].
//! Orchestration code passes these around inside `anyhow::Error`, so callers
//! classify a failure with `err.downcast_ref::<BackupError>()`.

use std::path::PathBuf;

/// Boxed driver error kept as the `source` of a [`BackupError`]
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    /// Engine or object store unreachable, or authentication refused
    #[error("Failed to connect to {engine} at {endpoint}: {source}")]
    Connectivity {
        engine: &'static str,
        endpoint: String,
        #[source]
        source: BoxError,
    },

    /// Backup file missing, wrong extension or malformed archive
    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    /// A single table, collection or statement failed during restore
    #[error("Restore of '{object}' failed: {source}")]
    PartialFailure {
        object: String,
        #[source]
        source: BoxError,
    },

    /// Query or command rejected by the engine
    #[error("{engine} error while {action}: {source}")]
    Engine {
        engine: &'static str,
        action: String,
        #[source]
        source: BoxError,
    },

    /// Upload or download failure in a storage handler
    #[error("Storage transfer failed for '{object}': {message}")]
    Storage { object: String, message: String },

    /// Handler variant not compiled into this binary
    #[error("Unsupported {kind}: {name}")]
    Unsupported { kind: &'static str, name: String },

    /// Another run holds the target's staging lock
    #[error("Target '{target}' is already being backed up or restored (lock held at {path:?})")]
    Locked { target: String, path: PathBuf },
}

impl BackupError {
    pub fn connectivity(
        engine: &'static str,
        endpoint: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::Connectivity {
            engine,
            endpoint: endpoint.into(),
            source: source.into(),
        }
    }

    pub fn engine(
        engine: &'static str,
        action: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::Engine {
            engine,
            action: action.into(),
            source: source.into(),
        }
    }

    pub fn partial(object: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::PartialFailure {
            object: object.into(),
            source: source.into(),
        }
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Self::DataIntegrity(message.into())
    }
}
