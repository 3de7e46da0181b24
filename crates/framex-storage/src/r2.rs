//! Archive output to a Cloudflare R2 bucket over the S3 API.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{debug, info};

use crate::error::{validate_name, StorageError, StorageResult};
use crate::output::OutputStore;

#[derive(Debug, Clone)]
pub struct R2Config {
    pub endpoint_url: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket_name: String,
    /// `auto` for R2.
    pub region: String,
    /// Key prefix archives are written under.
    pub output_prefix: String,
}

fn required(key: &str) -> StorageResult<String> {
    std::env::var(key).map_err(|_| StorageError::config_error(format!("{} must be set", key)))
}

impl R2Config {
    /// Reads `R2_ENDPOINT_URL`, `R2_ACCESS_KEY_ID`, `R2_SECRET_ACCESS_KEY`
    /// and `R2_BUCKET_NAME` (required) plus `R2_REGION` and
    /// `R2_OUTPUT_PREFIX`.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self {
            endpoint_url: required("R2_ENDPOINT_URL")?,
            access_key_id: required("R2_ACCESS_KEY_ID")?,
            secret_access_key: required("R2_SECRET_ACCESS_KEY")?,
            bucket_name: required("R2_BUCKET_NAME")?,
            region: std::env::var("R2_REGION").unwrap_or_else(|_| "auto".into()),
            output_prefix: std::env::var("R2_OUTPUT_PREFIX").unwrap_or_else(|_| "outputs".into()),
        })
    }

    /// Object key of archive `name`.
    pub fn key_for(&self, name: &str) -> String {
        match self.output_prefix.trim_matches('/') {
            "" => name.to_string(),
            prefix => format!("{}/{}", prefix, name),
        }
    }
}

#[derive(Clone)]
pub struct R2OutputStore {
    client: Client,
    config: R2Config,
}

impl R2OutputStore {
    pub fn new(config: R2Config) -> Self {
        let credentials = Credentials::new(
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
            None,
            None,
            "framex-r2",
        );
        let s3 = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(config.endpoint_url.clone())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(s3),
            config,
        }
    }
}

#[async_trait]
impl OutputStore for R2OutputStore {
    async fn store(&self, name: &str, bytes: Vec<u8>) -> StorageResult<()> {
        validate_name(name)?;
        let key = self.config.key_for(name);
        let size = bytes.len();
        debug!(%key, size, "Uploading archive");

        self.client
            .put_object()
            .bucket(&self.config.bucket_name)
            .key(&key)
            .content_type("application/zip")
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(format!("{}: {}", key, e)))?;

        info!(bucket = %self.config.bucket_name, %key, size, "Archive uploaded");
        Ok(())
    }
}
