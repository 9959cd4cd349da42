//! Storage-backend head probe.
//!
//! The gateway never moves object bytes itself; the only storage operation
//! this core performs is a head/existence lookup against the S3-compatible
//! backend, merged with persisted metadata by the resource loader.

use crate::config::StorageConfig;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{Credentials, Region};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::instrument;

#[derive(Error, Debug)]
pub enum StorageError {
    /// The backend has no object under the probed key
    #[error("Object not found in storage backend")]
    NotFound,

    /// Any other backend failure
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Result of a head probe against the storage backend.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct StorageHead {
    pub content_length: Option<i64>,
    pub content_type: Option<String>,
    pub e_tag: Option<String>,
    pub s3_version_id: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Trait for storage backends that can answer head probes
#[async_trait]
pub trait StorageProber: Send + Sync {
    /// Probe existence and metadata of the object stored under `key`
    async fn head_object(&self, key: &str) -> Result<StorageHead>;
}

/// S3-compatible storage backend
pub struct S3Storage {
    client: Client,
    bucket: String,
    key_prefix: Option<String>,
}

impl S3Storage {
    /// Build a client from configuration.
    ///
    /// Static credentials and a custom endpoint are used when configured
    /// (MinIO, Ceph RGW, localstack); otherwise the SDK provider chain
    /// applies.
    pub async fn from_config(config: &StorageConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(Region::new(config.region.clone()));

        if let (Some(access_key_id), Some(secret_access_key)) = (&config.access_key_id, &config.secret_access_key) {
            loader = loader.credentials_provider(Credentials::new(
                access_key_id,
                secret_access_key,
                None,
                None,
                "objctl-config",
            ));
        }

        let shared_config = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared_config).force_path_style(config.force_path_style);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint.as_str());
        }

        Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
            key_prefix: config.key_prefix.clone(),
        }
    }

    fn object_key(&self, key: &str) -> String {
        match &self.key_prefix {
            Some(prefix) => format!("{}/{}", prefix.trim_end_matches('/'), key),
            None => key.to_string(),
        }
    }
}

#[async_trait]
impl StorageProber for S3Storage {
    #[instrument(skip(self), fields(bucket = %self.bucket), err)]
    async fn head_object(&self, key: &str) -> Result<StorageHead> {
        let output = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(self.object_key(key))
            .send()
            .await
            .map_err(|err| {
                let service_err = err.into_service_error();
                if service_err.is_not_found() {
                    StorageError::NotFound
                } else {
                    StorageError::Backend(anyhow::Error::new(service_err))
                }
            })?;

        Ok(StorageHead {
            content_length: output.content_length(),
            content_type: output.content_type().map(|s| s.to_string()),
            e_tag: output.e_tag().map(|s| s.to_string()),
            s3_version_id: output.version_id().map(|s| s.to_string()),
            last_modified: output
                .last_modified()
                .and_then(|t| DateTime::from_timestamp(t.secs(), t.subsec_nanos())),
        })
    }
}
