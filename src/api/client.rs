//! HTTP client for the upstream stats API.
//!
//! The query pool is written against the [`RemoteSource`] seam rather
//! than the concrete client, so executor and pipeline tests can run
//! against scripted documents without a socket.

use anyhow::Context;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use super::QueryError;
use crate::config::ApiConfig;

/// Anything that can resolve a path into a remote JSON document.
pub trait RemoteSource {
    /// Fetch the document behind `path`. Transport problems surface as
    /// [`QueryError::Transport`]; business errors stay inside the
    /// document for the pool to inspect.
    fn fetch(&self, path: &str) -> impl Future<Output = Result<Value, QueryError>>;
}

/// Client for the real service: one pooled `reqwest::Client` carrying
/// the API key header and a generous per-request ceiling sized for
/// large pagination walks.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// Build a client from configuration. The API key, when present,
    /// is attached to every request as the `X-API-Key` header.
    pub fn new(config: &ApiConfig) -> anyhow::Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();

        if let Some(ref key) = config.key {
            let mut value = reqwest::header::HeaderValue::from_str(key)
                .context("API key is not a valid header value")?;
            value.set_sensitive(true);
            headers.insert("X-API-Key", value);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl RemoteSource for ApiClient {
    async fn fetch(&self, path: &str) -> Result<Value, QueryError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);

        let response = self.http.get(&url).send().await.map_err(|e| {
            warn!("request to {} failed: {}", path, e);
            QueryError::Transport(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!("request to {} returned HTTP {}", path, status);
            return Err(QueryError::Transport(format!("HTTP {status}")));
        }

        response.json::<Value>().await.map_err(|e| {
            warn!("response from {} is not valid JSON: {}", path, e);
            QueryError::Transport(e.to_string())
        })
    }
}
