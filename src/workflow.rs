use serde::{Deserialize, Serialize};
use serde_with::{serde_as, NoneAsEmptyString};
use std::time::Duration;

use crate::{
    config::WorkflowConfig,
    error::{AppError, AppResult},
};

/// One hit from the workflow run. Fields stay raw and optional here so a bad
/// or missing one only fails its own item.
#[serde_as]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SearchResultItem {
    #[serde(rename = "s3_url", default)]
    #[serde_as(as = "NoneAsEmptyString")]
    pub content_locator: Option<String>,
    #[serde(rename = "checklist_url", default)]
    #[serde_as(as = "NoneAsEmptyString")]
    pub quiz_locator: Option<String>,
    #[serde(default)]
    #[serde_as(as = "NoneAsEmptyString")]
    pub title: Option<String>,
    #[serde(default)]
    #[serde_as(as = "NoneAsEmptyString")]
    pub description: Option<String>,
    #[serde(rename = "start_time", default)]
    #[serde_as(as = "NoneAsEmptyString")]
    pub start_timestamp: Option<String>,
}

#[derive(Serialize)]
struct RunRequest<'a> {
    inputs: RunInputs<'a>,
    response_mode: &'static str,
    user: &'a str,
}

#[derive(Serialize)]
struct RunInputs<'a> {
    input: &'a str,
}

#[derive(Deserialize)]
struct RunResponse {
    data: RunData,
}

#[derive(Deserialize)]
struct RunData {
    status: String,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    outputs: Option<RunOutputs>,
}

#[derive(Deserialize)]
struct RunOutputs {
    #[serde(default)]
    res: Vec<SearchResultItem>,
}

#[derive(Clone)]
pub struct WorkflowClient {
    http: reqwest::Client,
    cfg: WorkflowConfig,
}

impl WorkflowClient {
    pub fn new(cfg: WorkflowConfig, timeout: Duration) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::ExternalApiError(e.to_string()))?;
        Ok(Self { http, cfg })
    }

    /// Runs the search workflow in blocking mode.
    pub async fn run(&self, question: &str) -> AppResult<Vec<SearchResultItem>> {
        let url = format!("{}/workflows/run", self.cfg.base_url);
        let body = RunRequest {
            inputs: RunInputs { input: question },
            response_mode: "blocking",
            user: &self.cfg.user,
        };

        let res = self
            .http
            .post(&url)
            .bearer_auth(&self.cfg.api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport)?;

        let status = res.status();
        if status != reqwest::StatusCode::OK {
            let detail = res.text().await.unwrap_or_default();
            tracing::error!(%status, %detail, "workflow run rejected");
            return Err(AppError::ExternalApiError(format!("HTTP {}", status.as_u16())));
        }

        let parsed: RunResponse = res.json().await.map_err(transport)?;
        if parsed.data.status != "succeeded" {
            return Err(AppError::ExternalApiError(match parsed.data.error {
                Some(e) if !e.is_empty() => format!("run {}: {}", parsed.data.status, e),
                _ => format!("run {}", parsed.data.status),
            }));
        }

        Ok(parsed.data.outputs.map(|o| o.res).unwrap_or_default())
    }
}

fn transport(e: reqwest::Error) -> AppError {
    if e.is_timeout() {
        AppError::ExternalApiError("request timed out".into())
    } else {
        AppError::ExternalApiError(e.to_string())
    }
}
