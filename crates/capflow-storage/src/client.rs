//! Storage contract and R2 client implementation.

use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use aws_sdk_s3::Client;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};

/// Default lifetime of URLs returned by `put` when no public base URL is set.
const DEFAULT_URL_TTL: Duration = Duration::from_secs(3600);

/// Object storage consumed by the pipeline.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store bytes under `key` and return a URL for the object.
    async fn put(&self, data: Vec<u8>, key: &str, content_type: &str) -> StorageResult<String>;

    /// Temporary signed URL for reading `key`.
    async fn signed_url(&self, key: &str, ttl: Duration) -> StorageResult<String>;

    /// Whether an object exists under `key`.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Delete objects, returning how many were requested for deletion.
    async fn remove(&self, keys: &[String]) -> StorageResult<u32>;
}

/// Configuration for R2 client.
#[derive(Debug, Clone)]
pub struct R2Config {
    /// R2 endpoint URL (S3 API endpoint)
    pub endpoint_url: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket_name: String,
    /// Region (usually "auto" for R2)
    pub region: String,
    /// Public base URL for the bucket, if it is served publicly
    pub public_url: Option<String>,
}

impl R2Config {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self {
            endpoint_url: std::env::var("R2_ENDPOINT_URL")
                .map_err(|_| StorageError::config_error("R2_ENDPOINT_URL not set"))?,
            access_key_id: std::env::var("R2_ACCESS_KEY_ID")
                .map_err(|_| StorageError::config_error("R2_ACCESS_KEY_ID not set"))?,
            secret_access_key: std::env::var("R2_SECRET_ACCESS_KEY")
                .map_err(|_| StorageError::config_error("R2_SECRET_ACCESS_KEY not set"))?,
            bucket_name: std::env::var("R2_BUCKET_NAME")
                .map_err(|_| StorageError::config_error("R2_BUCKET_NAME not set"))?,
            region: std::env::var("R2_REGION").unwrap_or_else(|_| "auto".to_string()),
            public_url: std::env::var("R2_PUBLIC_URL")
                .ok()
                .filter(|s| !s.is_empty())
                .map(|s| s.trim_end_matches('/').to_string()),
        })
    }
}

/// Cloudflare R2 storage client.
#[derive(Clone)]
pub struct R2Client {
    client: Client,
    bucket: String,
    public_url: Option<String>,
}

impl R2Client {
    /// Create a new R2 client from configuration.
    pub async fn new(config: R2Config) -> StorageResult<Self> {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "r2",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(sdk_config),
            bucket: config.bucket_name,
            public_url: config.public_url,
        })
    }

    /// Create from environment variables.
    pub async fn from_env() -> StorageResult<Self> {
        let config = R2Config::from_env()?;
        Self::new(config).await
    }

    /// Upload bytes to R2.
    pub async fn upload_bytes(&self, data: Vec<u8>, key: &str, content_type: &str) -> StorageResult<()> {
        debug!("Uploading {} bytes to {}", data.len(), key);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        Ok(())
    }

    /// Generate a presigned URL for GET.
    pub async fn presign_get(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
        let presign_config =
            PresigningConfig::expires_in(expires_in).map_err(|e| StorageError::PresignFailed(e.to_string()))?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presign_config)
            .await
            .map_err(|e| StorageError::PresignFailed(e.to_string()))?;

        Ok(presigned.uri().to_string())
    }

    /// Delete multiple objects.
    pub async fn delete_objects(&self, keys: &[String]) -> StorageResult<u32> {
        if keys.is_empty() {
            return Ok(0);
        }

        debug!("Deleting {} objects", keys.len());

        let objects = keys
            .iter()
            .map(|k| {
                ObjectIdentifier::builder()
                    .key(k)
                    .build()
                    .map_err(|e| StorageError::delete_failed(e.to_string()))
            })
            .collect::<StorageResult<Vec<_>>>()?;

        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(true)
            .build()
            .map_err(|e| StorageError::delete_failed(e.to_string()))?;

        self.client
            .delete_objects()
            .bucket(&self.bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| StorageError::delete_failed(e.to_string()))?;

        info!("Deleted {} objects", keys.len());
        Ok(keys.len() as u32)
    }

    /// Check if an object exists.
    pub async fn head(&self, key: &str) -> StorageResult<bool> {
        match self.client.head_object().bucket(&self.bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(e) => {
                let msg = e.to_string();
                if msg.contains("NotFound") || msg.contains("NoSuchKey") {
                    Ok(false)
                } else {
                    Err(StorageError::AwsSdk(msg))
                }
            }
        }
    }
}

#[async_trait]
impl ObjectStorage for R2Client {
    async fn put(&self, data: Vec<u8>, key: &str, content_type: &str) -> StorageResult<String> {
        self.upload_bytes(data, key, content_type).await?;
        match &self.public_url {
            Some(base) => Ok(format!("{}/{}", base, key)),
            None => self.presign_get(key, DEFAULT_URL_TTL).await,
        }
    }

    async fn signed_url(&self, key: &str, ttl: Duration) -> StorageResult<String> {
        self.presign_get(key, ttl).await
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.head(key).await
    }

    async fn remove(&self, keys: &[String]) -> StorageResult<u32> {
        self.delete_objects(keys).await
    }
}
