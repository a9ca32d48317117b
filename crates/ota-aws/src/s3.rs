//! S3 object storage

use std::path::Path;

use anyhow::{Context, Result};
use aws_sdk_s3::types::ObjectVersion;
use aws_sdk_s3::{Client, primitives::ByteStream};
use ota_update::service::ObjectStore;
use tracing::{debug, info};

/// Object store backed by a versioned S3 bucket
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    /// Create a store from shared AWS configuration
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }

    /// Wrap an existing client
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl ObjectStore for S3ObjectStore {
    async fn upload(&self, bucket: &str, key: &str, path: &Path) -> Result<()> {
        let body = ByteStream::from_path(path)
            .await
            .with_context(|| format!("Failed to open {}", path.display()))?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .with_context(|| format!("Failed to upload s3://{bucket}/{key}"))?;

        info!(bucket, key, "Uploaded firmware to S3");
        Ok(())
    }

    async fn latest_version(&self, bucket: &str, key: &str) -> Result<Option<String>> {
        let output = self
            .client
            .list_object_versions()
            .bucket(bucket)
            .prefix(key)
            .send()
            .await
            .with_context(|| format!("Failed to list versions of s3://{bucket}/{key}"))?;

        let version = pick_latest_version(output.versions(), key);
        debug!(bucket, key, version = ?version, "Resolved latest object version");
        Ok(version)
    }
}

/// Latest version id for `key`, falling back to the first latest entry under
/// the prefix when no key matches exactly.
pub fn pick_latest_version(versions: &[ObjectVersion], key: &str) -> Option<String> {
    let latest = || versions.iter().filter(|v| v.is_latest() == Some(true));

    latest()
        .find(|v| v.key() == Some(key))
        .or_else(|| latest().next())
        .and_then(|v| v.version_id())
        .map(str::to_string)
}
