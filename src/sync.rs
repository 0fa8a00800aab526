//! HTTP client for the remote backup endpoint.
//!
//! `POST <url>/backup` uploads the whole collection, `GET <url>/restore`
//! downloads it. The token travels in the `X-API-Token` header only.

use crate::backup::entries_from_value;
use crate::config::WorkerConfig;
use crate::entry::Entry;
use crate::error::{Error, Result};
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

pub const TOKEN_HEADER: &str = "X-API-Token";
pub const BACKUP_ENDPOINT: &str = "backup";
pub const RESTORE_ENDPOINT: &str = "restore";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Successful push; `response` holds the endpoint's JSON reply if it sent one.
#[derive(Debug, Clone, PartialEq)]
pub struct PushOutcome {
    pub status: u16,
    pub response: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct SyncClient {
    client: reqwest::Client,
    config: WorkerConfig,
}

impl SyncClient {
    pub fn new(config: WorkerConfig) -> Result<Self> {
        Self::with_timeout(config, DEFAULT_TIMEOUT)
    }

    /// Fails with `Error::Config` before any request when url or token is
    /// missing or the url does not parse.
    pub fn with_timeout(config: WorkerConfig, timeout: Duration) -> Result<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("cannot create HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub async fn push(&self, entries: &[Entry]) -> Result<PushOutcome> {
        let url = self.config.endpoint(BACKUP_ENDPOINT);
        debug!(%url, count = entries.len(), "pushing entries");

        let resp = self
            .client
            .post(&url)
            .header(TOKEN_HEADER, &self.config.token)
            .json(entries)
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(remote_error(resp).await);
        }

        let response = if is_json(&resp) {
            match resp.json::<Value>().await {
                Ok(v) => Some(v),
                Err(e) => {
                    debug!("ignoring unreadable backup response body: {e}");
                    None
                }
            }
        } else {
            None
        };

        info!(status = status.as_u16(), count = entries.len(), "remote backup stored");
        Ok(PushOutcome {
            status: status.as_u16(),
            response,
        })
    }

    pub async fn pull(&self) -> Result<Vec<Entry>> {
        let url = self.config.endpoint(RESTORE_ENDPOINT);
        debug!(%url, "pulling entries");

        let resp = self
            .client
            .get(&url)
            .header(TOKEN_HEADER, &self.config.token)
            .send()
            .await
            .map_err(transport_error)?;

        if !resp.status().is_success() {
            return Err(remote_error(resp).await);
        }

        let body = resp.text().await.map_err(transport_error)?;
        let value: Value = serde_json::from_str(&body)
            .map_err(|e| Error::Format(format!("restore response is not JSON: {e}")))?;
        if !value.is_array() {
            return Err(Error::Format(
                "restore response is not an entry array".to_string(),
            ));
        }

        let entries = entries_from_value(value)?;
        info!(count = entries.len(), "remote backup fetched");
        Ok(entries)
    }
}

fn is_json(resp: &reqwest::Response) -> bool {
    resp.headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("application/json"))
        .unwrap_or(false)
}

fn transport_error(e: reqwest::Error) -> Error {
    let status = e.status().map(|s| s.as_u16());
    if e.is_timeout() {
        Error::remote(status, "request timed out")
    } else {
        Error::remote(status, e.to_string())
    }
}

/// Prefer `{"error": "..."}` from the body, else the status line.
async fn remote_error(resp: reqwest::Response) -> Error {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    let message = error_message(&body).unwrap_or_else(|| {
        format!(
            "HTTP error {}: {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown")
        )
    });
    Error::remote(Some(status.as_u16()), message)
}

fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value.get("error")?.as_str().map(str::to_string)
}
