//! db-backup library
//!
//! Backup, restore and interval scheduling for PostgreSQL, MySQL, MongoDB and
//! SQLite databases, with artifacts kept locally or pushed to S3.

pub mod config;
pub mod databases;
pub mod error;
pub mod managers;
pub mod storage;
pub mod utils;

// Re-export commonly used types
pub use config::{load_config, save_config, Config, ConfigError, Target};
pub use error::BackupError;
pub use managers::backup::{BackupManager, RestoreOutcome};
pub use managers::logging::{init_console_logging, init_logging, LogGuard, LoggingConfig};
pub use managers::registry::HandlerRegistry;
pub use managers::scheduler::{schedule_backups, BackupRunner, Scheduler};
