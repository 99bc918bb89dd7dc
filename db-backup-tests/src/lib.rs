//! Test utilities for db-backup
//!
//! Shared builders, fixtures and helpers for the `unit`, `commands` and
//! `integration` test binaries.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use test_utils::{TargetBuilder, TestContext};
//!
//! #[tokio::test]
//! async fn my_test() {
//!     let ctx = TestContext::new();
//!     let db = ctx.seed_sqlite("app.db", 3);
//!     let target = TargetBuilder::sqlite("app", &db)
//!         .backup_path(&ctx.create_subdir("backups"))
//!         .build();
//!     // ... test code
//! }
//! ```

pub mod fixtures;
pub mod target_builder;
pub mod test_context;

// Re-export commonly used items
pub use fixtures::*;
pub use target_builder::{ConfigBuilder, TargetBuilder};
pub use test_context::{OptionAssertions, ResultAssertions, TestContext};

// Re-export types from the main crate for convenience
pub use db_backup::config::{
    BackupConfig, CloudConfig, CloudType, Config, DatabaseConfig, DatabaseType, GlobalConfig,
    S3Config, Schedule, Target,
};

// Re-export mock implementations from the main crate
pub use db_backup::databases::mock::{HandlerCall, MockDatabaseHandler};
pub use db_backup::databases::DatabaseHandler;
pub use db_backup::storage::mock::{MockStorage, StorageCall};
pub use db_backup::storage::StorageHandler;

/// Common test result type
pub type TestResult<T = ()> = anyhow::Result<T>;
