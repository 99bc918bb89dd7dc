//! Configuration module for db-backup
//!
//! Handles the target model plus loading, saving and validating the
//! configuration file.
//!
//! ## File format
//!
//! JSON by default (`~/.db_backup/config.json`); a path ending in `.toml` is
//! read and written as TOML instead. A legacy single-target JSON document is
//! migrated in place on first load.
//!
//! ## Example Usage
//!
//! ```no_run
//! use db_backup::config;
//!
//! let config = config::load_config(config::default_config_path())?;
//! for target in &config.targets {
//!     config::validate_target(target)?;
//!     println!("Target: {} ({})", target.id, target.database.db_type);
//! }
//! # Ok::<(), config::ConfigError>(())
//! ```

mod loader;
mod types;

pub use loader::{
    load_config, sanitize_id, save_config, select_targets, validate_target, ConfigError,
    Result,
};
pub use types::*;

use std::path::{Path, PathBuf};

/// Directory holding the config file and logs (`~/.db_backup`)
pub fn default_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".db_backup")
}

pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.json")
}

/// Expand tilde (~) in path
pub fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    path.to_path_buf()
}
