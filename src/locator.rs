use std::{fmt, str::FromStr, time::Duration};

use crate::{
    error::{AppError, AppResult},
    storage::ObjectStore,
};

pub const STORAGE_SCHEME: &str = "s3";

/// `s3://container/key-path`, split once at parse time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageLocator {
    container: String,
    key: String,
}

impl StorageLocator {
    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl FromStr for StorageLocator {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scheme, rest) = s
            .split_once("://")
            .ok_or_else(|| AppError::InvalidLocatorScheme(s.to_string()))?;
        if scheme != STORAGE_SCHEME {
            return Err(AppError::InvalidLocatorScheme(s.to_string()));
        }

        let (container, path) = rest.split_once('/').unwrap_or((rest, ""));
        let key = path.trim_start_matches('/');
        if container.is_empty() || key.is_empty() {
            return Err(AppError::InvalidLocator(s.to_string()));
        }

        Ok(Self {
            container: container.to_string(),
            key: key.to_string(),
        })
    }
}

impl fmt::Display for StorageLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/{}", STORAGE_SCHEME, self.container, self.key)
    }
}

/// Time-limited retrieval URL for the object behind `locator`.
///
/// Only a signing request goes out; the object itself is never read.
pub async fn resolve(
    store: &dyn ObjectStore,
    locator: &StorageLocator,
    ttl: Duration,
) -> AppResult<String> {
    store
        .sign_get_url(locator.container(), locator.key(), ttl)
        .await
        .map_err(AppError::ResolutionFailed)
}
