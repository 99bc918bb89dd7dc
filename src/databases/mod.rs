//! Database engine handlers
//!
//! One handler per engine. A handler turns a live database into an
//! uncompressed artifact in the target's staging directory, and replays such
//! an artifact back into the database. Compression, naming of the archive and
//! storage transfer are the pipeline's job, not the handler's.
//!
//! Engines other than SQLite sit behind cargo features (`postgres`, `mysql`,
//! `mongodb`); asking for a compiled-out engine yields
//! [`BackupError::Unsupported`].

#[cfg(feature = "mongodb")]
pub mod mongo;
#[cfg(feature = "mysql")]
pub mod mysql;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod sqlite;

use crate::config::{DatabaseType, Target};
use crate::error::BackupError;
use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Engine-specific dump and replay
#[async_trait]
pub trait DatabaseHandler: Send + Sync {
    /// Human-readable engine name for logs
    fn name(&self) -> &'static str;

    /// Extension of the uncompressed artifact (`db`, `sql`, `archive`)
    fn extension(&self) -> &'static str;

    /// Dump the target database into a fresh artifact and return its path
    async fn backup(&self, target: &Target) -> Result<PathBuf>;

    /// Replay `backup_file` into the target database
    ///
    /// `force` allows destructive steps the engine would otherwise skip.
    async fn restore(&self, target: &Target, backup_file: &Path, force: bool) -> Result<()>;
}

/// Built-in handler for `db_type`
pub fn handler_for(db_type: DatabaseType) -> Result<Arc<dyn DatabaseHandler>> {
    match db_type {
        DatabaseType::Sqlite => Ok(Arc::new(sqlite::SqliteHandler)),
        #[cfg(feature = "postgres")]
        DatabaseType::Postgresql => Ok(Arc::new(postgres::PostgresHandler)),
        #[cfg(feature = "mysql")]
        DatabaseType::Mysql => Ok(Arc::new(mysql::MysqlHandler)),
        #[cfg(feature = "mongodb")]
        DatabaseType::Mongodb => Ok(Arc::new(mongo::MongoHandler)),
        #[allow(unreachable_patterns)]
        other => Err(BackupError::Unsupported {
            kind: "DBMS",
            name: other.to_string(),
        }
        .into()),
    }
}

/// Mock handler for testing the pipeline without a database
pub mod mock {
    use super::*;
    use crate::utils::artifact::new_artifact_path;
    use std::sync::Mutex;

    /// Recorded handler call
    #[derive(Clone, Debug, PartialEq)]
    pub enum HandlerCall {
        Backup { target: String },
        Restore { target: String, file: PathBuf, force: bool },
    }

    /// Writes a small artifact on backup and records every call
    #[derive(Clone)]
    pub struct MockDatabaseHandler {
        pub calls: Arc<Mutex<Vec<HandlerCall>>>,
        pub extension: &'static str,
        pub payload: Arc<Mutex<Vec<u8>>>,
        pub should_fail_backup: Arc<Mutex<bool>>,
        pub should_fail_restore: Arc<Mutex<bool>>,
        /// Contents of each file passed to `restore`, read before it is cleaned up
        pub restored_payloads: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl MockDatabaseHandler {
        pub fn new(extension: &'static str) -> Self {
            Self {
                calls: Arc::default(),
                extension,
                payload: Arc::new(Mutex::new(b"mock dump".to_vec())),
                should_fail_backup: Arc::default(),
                should_fail_restore: Arc::default(),
                restored_payloads: Arc::default(),
            }
        }

        /// Configure the bytes written into each artifact
        pub fn with_payload(self, payload: &[u8]) -> Self {
            *self.payload.lock().unwrap() = payload.to_vec();
            self
        }

        pub fn with_failing_backup(self) -> Self {
            *self.should_fail_backup.lock().unwrap() = true;
            self
        }

        pub fn with_failing_restore(self) -> Self {
            *self.should_fail_restore.lock().unwrap() = true;
            self
        }

        pub fn get_calls(&self) -> Vec<HandlerCall> {
            self.calls.lock().unwrap().clone()
        }

        pub fn backup_count(&self) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|c| matches!(c, HandlerCall::Backup { .. }))
                .count()
        }

        pub fn restore_called(&self) -> bool {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .any(|c| matches!(c, HandlerCall::Restore { .. }))
        }

        fn record_call(&self, call: HandlerCall) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl DatabaseHandler for MockDatabaseHandler {
        fn name(&self) -> &'static str {
            "Mock"
        }

        fn extension(&self) -> &'static str {
            self.extension
        }

        async fn backup(&self, target: &Target) -> Result<PathBuf> {
            self.record_call(HandlerCall::Backup {
                target: target.id.clone(),
            });
            if *self.should_fail_backup.lock().unwrap() {
                anyhow::bail!("Mock backup failure for target {}", target.id);
            }

            let path = new_artifact_path(target, self.extension)?;
            let payload = self.payload.lock().unwrap().clone();
            std::fs::write(&path, payload)?;
            Ok(path)
        }

        async fn restore(&self, target: &Target, backup_file: &Path, force: bool) -> Result<()> {
            self.record_call(HandlerCall::Restore {
                target: target.id.clone(),
                file: backup_file.to_path_buf(),
                force,
            });
            if *self.should_fail_restore.lock().unwrap() {
                anyhow::bail!("Mock restore failure for target {}", target.id);
            }

            let content = std::fs::read(backup_file)?;
            self.restored_payloads.lock().unwrap().push(content);
            Ok(())
        }
    }
}
