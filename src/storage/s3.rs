//! S3-compatible object storage (AWS S3, MinIO, R2)
//!
//! Objects are stored at the bucket root under the artifact's base filename.

use super::{reference_name, StorageHandler};
use crate::config::{S3Config, Target};
use crate::error::BackupError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use std::path::{Path, PathBuf};
use tracing::{error, info};

pub struct S3Storage;

async fn client(config: &S3Config) -> Client {
    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(config.region().to_string()));
    if let Some(endpoint) = &config.endpoint {
        loader = loader.endpoint_url(endpoint);
    }
    let shared = loader.load().await;

    let mut builder = aws_sdk_s3::config::Builder::from(&shared).credentials_provider(
        Credentials::new(&config.access_key, &config.secret_key, None, None, "db-backup"),
    );
    // Custom endpoints are usually MinIO-style and need path addressing
    if config.endpoint.is_some() {
        builder = builder.force_path_style(true);
    }
    Client::from_conf(builder.build())
}

fn transfer_error(object: &str, message: String) -> anyhow::Error {
    BackupError::Storage {
        object: object.to_string(),
        message,
    }
    .into()
}

#[async_trait]
impl StorageHandler for S3Storage {
    fn name(&self) -> &'static str {
        "s3"
    }

    async fn store(&self, file_path: &Path, target: &Target) -> Result<()> {
        let s3 = &target.backup.cloud.s3;
        let key = reference_name(&file_path.to_string_lossy())?;
        let body = ByteStream::from_path(file_path)
            .await
            .with_context(|| format!("Failed to read {:?}", file_path))?;

        client(s3)
            .await
            .put_object()
            .bucket(&s3.bucket)
            .key(&key)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                error!("S3 upload failed: {}", DisplayErrorContext(&e));
                transfer_error(&key, DisplayErrorContext(&e).to_string())
            })?;

        info!("Backup uploaded to S3: s3://{}/{}", s3.bucket, key);
        Ok(())
    }

    async fn retrieve(&self, reference: &str, target: &Target, dest_dir: &Path) -> Result<PathBuf> {
        let s3 = &target.backup.cloud.s3;
        let key = reference_name(reference)?;
        let dest = dest_dir.join(&key);

        let response = client(s3)
            .await
            .get_object()
            .bucket(&s3.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| {
                error!("S3 download failed: {}", DisplayErrorContext(&e));
                transfer_error(&key, DisplayErrorContext(&e).to_string())
            })?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| transfer_error(&key, e.to_string()))?
            .into_bytes();
        tokio::fs::write(&dest, &data)
            .await
            .with_context(|| format!("Failed to write {:?}", dest))?;

        info!("Backup retrieved from S3: {}", dest.display());
        Ok(dest)
    }
}
