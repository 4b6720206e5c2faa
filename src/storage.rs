use async_trait::async_trait;
use aws_sdk_s3::{
    error::{DisplayErrorContext, ProvideErrorMetadata},
    presigning::PresigningConfig,
};
use std::{future::Future, time::Duration};
use thiserror::Error;

use crate::config::StorageConfig;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("object {container}/{key} not found")]
    NotFound { container: String, key: String },
    #[error("storage rejected credentials: {0}")]
    Auth(String),
    #[error("storage call timed out after {0:?}")]
    Timeout(Duration),
    #[error("{0}")]
    Other(String),
}

/// Object storage as seen by the resolver and the quiz fetcher.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get_object(&self, container: &str, key: &str) -> Result<Vec<u8>, StorageError>;

    async fn sign_get_url(
        &self,
        container: &str,
        key: &str,
        ttl: Duration,
    ) -> Result<String, StorageError>;
}

const AUTH_CODES: &[&str] = &[
    "AccessDenied",
    "InvalidAccessKeyId",
    "SignatureDoesNotMatch",
    "ExpiredToken",
];

pub struct S3Store {
    client: aws_sdk_s3::Client,
    timeout: Duration,
}

impl S3Store {
    pub async fn from_config(cfg: &StorageConfig, timeout: Duration) -> Self {
        let region = aws_sdk_s3::config::Region::new(cfg.region.clone());
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest()).region(region);
        if let (Some(access_key), Some(secret_key)) = (&cfg.access_key_id, &cfg.secret_access_key) {
            loader = loader.credentials_provider(aws_sdk_s3::config::Credentials::new(
                access_key.clone(),
                secret_key.clone(),
                None,
                None,
                "static",
            ));
        }
        let shared = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(ep) = &cfg.endpoint {
            builder = builder.endpoint_url(ep).force_path_style(true);
        }

        Self {
            client: aws_sdk_s3::Client::from_conf(builder.build()),
            timeout,
        }
    }
}

async fn bounded<T, F>(timeout: Duration, fut: F) -> Result<T, StorageError>
where
    F: Future<Output = Result<T, StorageError>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| StorageError::Timeout(timeout))?
}

fn classify<E>(container: &str, key: &str, err: E) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    match err.code() {
        Some("NoSuchKey") | Some("NotFound") => StorageError::NotFound {
            container: container.to_string(),
            key: key.to_string(),
        },
        Some(code) if AUTH_CODES.contains(&code) => {
            StorageError::Auth(DisplayErrorContext(&err).to_string())
        }
        _ => StorageError::Other(DisplayErrorContext(&err).to_string()),
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn get_object(&self, container: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        bounded(self.timeout, async {
            let output = self
                .client
                .get_object()
                .bucket(container)
                .key(key)
                .send()
                .await
                .map_err(|e| classify(container, key, e))?;
            let data = output
                .body
                .collect()
                .await
                .map_err(|e| StorageError::Other(e.to_string()))?
                .into_bytes();
            Ok::<_, StorageError>(data.to_vec())
        })
        .await
    }

    async fn sign_get_url(
        &self,
        container: &str,
        key: &str,
        ttl: Duration,
    ) -> Result<String, StorageError> {
        let presign = PresigningConfig::expires_in(ttl).map_err(|e| StorageError::Other(e.to_string()))?;
        bounded(self.timeout, async {
            let req = self
                .client
                .get_object()
                .bucket(container)
                .key(key)
                .presigned(presign)
                .await
                .map_err(|e| classify(container, key, e))?;
            Ok::<_, StorageError>(req.uri().to_string())
        })
        .await
    }
}

#[cfg(test)]
pub use memory::MemoryStore;
