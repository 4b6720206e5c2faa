use anyhow::{anyhow, Context, Result};
use std::{path::PathBuf, str::FromStr, time::Duration};

#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    pub base_url: String,
    pub api_key: String,
    pub user: String,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub workflow: WorkflowConfig,
    pub storage: StorageConfig,
    /// Lifetime of presigned video urls.
    pub presign_ttl: Duration,
    /// Applied to every outbound call.
    pub http_timeout: Duration,
    /// Sessions unseen for this long are dropped.
    pub session_idle: Duration,
    pub max_sessions: usize,
    pub static_dir: PathBuf,
    pub port: u16,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let require = |name: &str| get(name).ok_or_else(|| anyhow!("{} not set", name));

        Ok(Self {
            workflow: WorkflowConfig {
                base_url: require("WORKFLOW_API_URL")?.trim_end_matches('/').to_string(),
                api_key: require("WORKFLOW_API_KEY")?,
                user: get("WORKFLOW_USER").unwrap_or_else(|| "kb-video-search".into()),
            },
            storage: StorageConfig {
                region: get("AWS_REGION").unwrap_or_else(|| "us-east-1".into()),
                access_key_id: get("AWS_ACCESS_KEY_ID"),
                secret_access_key: get("AWS_SECRET_ACCESS_KEY"),
                endpoint: get("S3_ENDPOINT"),
            },
            presign_ttl: Duration::from_secs(parse_or(get("PRESIGN_TTL_SECS"), "PRESIGN_TTL_SECS", 3600)?),
            http_timeout: Duration::from_secs(parse_or(get("HTTP_TIMEOUT_SECS"), "HTTP_TIMEOUT_SECS", 30)?),
            session_idle: Duration::from_secs(parse_or(get("SESSION_IDLE_SECS"), "SESSION_IDLE_SECS", 3600)?),
            max_sessions: parse_or(get("MAX_SESSIONS"), "MAX_SESSIONS", 10_000)?,
            static_dir: PathBuf::from(get("STATIC_DIR").unwrap_or_else(|| "./static".into())),
            port: parse_or(get("PORT"), "PORT", 8081)?,
        })
    }
}

fn parse_or<T>(raw: Option<String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        Some(v) => v.trim().parse().with_context(|| format!("invalid {}: {:?}", name, v)),
        None => Ok(default),
    }
}
