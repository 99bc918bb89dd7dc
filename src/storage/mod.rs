//! Storage handlers: where compressed artifacts go after a backup
//!
//! The staging directory always keeps a copy. A storage handler may
//! additionally push the artifact somewhere else and fetch it back for a
//! restore. Artifacts are addressed by their base filename.

pub mod local;
#[cfg(feature = "s3")]
pub mod s3;

use crate::config::{CloudType, Target};
use crate::error::BackupError;
use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[async_trait]
pub trait StorageHandler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Push a compressed artifact to the storage location
    async fn store(&self, file_path: &Path, target: &Target) -> Result<()>;

    /// Fetch the artifact referenced by `reference` into `dest_dir`
    ///
    /// Returns the local path of the fetched copy.
    async fn retrieve(&self, reference: &str, target: &Target, dest_dir: &Path) -> Result<PathBuf>;
}

/// Built-in handler for `cloud_type`; `none` and `local` both keep files in place
pub fn handler_for(cloud_type: CloudType) -> Result<Arc<dyn StorageHandler>> {
    match cloud_type {
        CloudType::None | CloudType::Local => Ok(Arc::new(local::LocalStorage)),
        #[cfg(feature = "s3")]
        CloudType::S3 => Ok(Arc::new(s3::S3Storage)),
        #[allow(unreachable_patterns)]
        other => Err(BackupError::Unsupported {
            kind: "storage",
            name: other.to_string(),
        }
        .into()),
    }
}

/// Base filename of a storage reference (path or object key)
pub fn reference_name(reference: &str) -> Result<String> {
    Path::new(reference)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| BackupError::integrity(format!("Invalid backup reference: {}", reference)).into())
}

/// Mock storage for testing the pipeline
pub mod mock {
    use super::*;
    use std::sync::Mutex;

    #[derive(Clone, Debug, PartialEq)]
    pub enum StorageCall {
        Store { file: PathBuf },
        Retrieve { reference: String, dest_dir: PathBuf },
    }

    /// Keeps artifacts in memory, keyed by base filename
    #[derive(Clone, Default)]
    pub struct MockStorage {
        pub calls: Arc<Mutex<Vec<StorageCall>>>,
        pub objects: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
        pub should_fail_store: Arc<Mutex<bool>>,
    }

    impl MockStorage {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_failing_store(self) -> Self {
            *self.should_fail_store.lock().unwrap() = true;
            self
        }

        pub fn get_calls(&self) -> Vec<StorageCall> {
            self.calls.lock().unwrap().clone()
        }

        pub fn stored_names(&self) -> Vec<String> {
            self.objects
                .lock()
                .unwrap()
                .iter()
                .map(|(name, _)| name.clone())
                .collect()
        }

        fn record_call(&self, call: StorageCall) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl StorageHandler for MockStorage {
        fn name(&self) -> &'static str {
            "mock"
        }

        async fn store(&self, file_path: &Path, _target: &Target) -> Result<()> {
            self.record_call(StorageCall::Store {
                file: file_path.to_path_buf(),
            });
            if *self.should_fail_store.lock().unwrap() {
                anyhow::bail!("Mock upload failure for {}", file_path.display());
            }

            let name = reference_name(&file_path.to_string_lossy())?;
            let data = std::fs::read(file_path)?;
            self.objects.lock().unwrap().push((name, data));
            Ok(())
        }

        async fn retrieve(&self, reference: &str, _target: &Target, dest_dir: &Path) -> Result<PathBuf> {
            self.record_call(StorageCall::Retrieve {
                reference: reference.to_string(),
                dest_dir: dest_dir.to_path_buf(),
            });

            let name = reference_name(reference)?;
            let data = self
                .objects
                .lock()
                .unwrap()
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, d)| d.clone())
                .ok_or_else(|| BackupError::Storage {
                    object: name.clone(),
                    message: "no such object".to_string(),
                })?;

            let dest = dest_dir.join(&name);
            std::fs::write(&dest, data)?;
            Ok(dest)
        }
    }
}
