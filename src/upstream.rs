//! HTTP access to the upstream indexer.
//!
//! One pooled `reqwest` client per process, a bounded per-request timeout and
//! translation of failures into [`FetchError`].

use crate::cache::Blob;
use crate::error::FetchError;
use serde_json::Value;
use std::sync::OnceLock;
use std::time::Duration;

static HTTP: OnceLock<reqwest::Client> = OnceLock::new();

pub fn http_client() -> &'static reqwest::Client {
    HTTP.get_or_init(|| {
        reqwest::Client::builder()
            .pool_max_idle_per_host(8)
            .tcp_nodelay(true)
            .build()
            .unwrap_or_default()
    })
}

/// Raw upstream answer, whatever its status.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl UpstreamResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone)]
pub struct UpstreamClient {
    base_url: String,
    auth_token: Option<String>,
    timeout: Duration,
}

impl UpstreamClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_token: None,
            timeout,
        }
    }

    pub fn with_auth_token(mut self, token: Option<String>) -> Self {
        self.auth_token = token;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn url_for(&self, path_and_query: &str) -> String {
        if path_and_query.starts_with('/') {
            format!("{}{}", self.base_url, path_and_query)
        } else {
            format!("{}/{}", self.base_url, path_and_query)
        }
    }

    /// GET without interpreting the status. Only transport failures are errors.
    pub async fn get_raw(&self, path_and_query: &str) -> Result<UpstreamResponse, FetchError> {
        let url = self.url_for(path_and_query);
        let mut req = http_client()
            .get(&url)
            .header("Accept", "application/json")
            .timeout(self.timeout);

        if let Some(token) = &self.auth_token {
            req = req.header("Authorization", format!("Bearer {token}"));
        }

        log::debug!("📡 GET {url}");
        let res = req.send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::timeout(self.timeout)
            } else {
                FetchError::from(e)
            }
        })?;

        let status = res.status().as_u16();
        let content_type = res
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = res
            .bytes()
            .await
            .map_err(|e| FetchError::Network(format!("failed to read body: {e}")))?
            .to_vec();

        Ok(UpstreamResponse {
            status,
            content_type,
            body,
        })
    }

    /// GET expecting a 2xx; anything else becomes [`FetchError::Upstream`].
    pub async fn get(&self, path_and_query: &str) -> Result<Blob, FetchError> {
        let res = self.get_raw(path_and_query).await?;
        if res.is_success() {
            Ok(Blob::from(res.body))
        } else {
            Err(upstream_error(res.status, &res.body))
        }
    }
}

/// Build an `Upstream` error, lifting `message`/`error` and `code` out of a JSON
/// body when the indexer sent one.
pub fn upstream_error(status: u16, body: &[u8]) -> FetchError {
    let reason = reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("upstream error");

    let parsed: Option<Value> = serde_json::from_slice(body).ok();
    let message = parsed
        .as_ref()
        .and_then(|v| {
            v.get("message")
                .or_else(|| v.get("error"))
                .and_then(Value::as_str)
        })
        .map(str::to_string)
        .unwrap_or_else(|| {
            let text = String::from_utf8_lossy(body);
            let text = text.trim();
            if text.is_empty() || text.len() > 200 {
                reason.to_string()
            } else {
                text.to_string()
            }
        });
    let code = parsed.as_ref().and_then(|v| match v.get("code") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    });

    FetchError::Upstream {
        status_code: status,
        message,
        code,
    }
}
