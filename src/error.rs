//! Error taxonomy for the data synchronization layer.
//!
//! - [`FetchError`] is the only error a consumer ever sees. It comes out of the
//!   gateway (and the typed API on top of it) and tells the caller whether a
//!   response was received at all (`Network`) or the indexer refused the
//!   request (`Upstream`).
//! - [`CacheUnavailable`] and [`ChannelError`] are absorbed where they happen.
//!   They are logged and turn into degraded behaviour (cache pass-through,
//!   polling fallback), never into a failed call.

use thiserror::Error;

/// Failure of a single read against the upstream indexer.
///
/// `Clone` so that one in-flight result can be handed to every caller that
/// joined the same deduplicated request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// No response received: timeout, DNS failure, refused connection, broken body.
    #[error("network error: {0}")]
    Network(String),

    /// The indexer answered with a non-2xx status.
    #[error("upstream returned {status_code}: {message}")]
    Upstream {
        status_code: u16,
        message: String,
        code: Option<String>,
    },

    /// A 2xx response whose body did not match the expected shape.
    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl FetchError {
    pub fn timeout(after: std::time::Duration) -> Self {
        FetchError::Network(format!("request timed out after {}ms", after.as_millis()))
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            FetchError::Upstream { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }

    /// Whether a consumer's retry affordance makes sense for this failure.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Network(_) => true,
            FetchError::Upstream { status_code, .. } => {
                *status_code == 429 || (500..600).contains(status_code)
            }
            FetchError::Decode(_) => false,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            return FetchError::Decode(e.to_string());
        }
        if let Some(status) = e.status() {
            return FetchError::Upstream {
                status_code: status.as_u16(),
                message: status.canonical_reason().unwrap_or("error").to_string(),
                code: None,
            };
        }
        if e.is_timeout() {
            FetchError::Network(format!("timeout: {e}"))
        } else if e.is_connect() {
            FetchError::Network(format!("unreachable: {e}"))
        } else {
            FetchError::Network(e.to_string())
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(e: serde_json::Error) -> Self {
        FetchError::Decode(e.to_string())
    }
}

/// The backing cache store is unreachable or not configured.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cache unavailable: {0}")]
pub struct CacheUnavailable(pub String);

impl From<reqwest::Error> for CacheUnavailable {
    fn from(e: reqwest::Error) -> Self {
        CacheUnavailable(e.to_string())
    }
}

/// Push channel failures. Only ever logged; consumers observe them through
/// connection state transitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("connection closed: {0}")]
    Closed(String),

    #[error("gave up after {attempts} reconnect attempts")]
    Exhausted { attempts: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(FetchError::Network("refused".into()).is_retryable());
        assert!(FetchError::Upstream {
            status_code: 503,
            message: "unavailable".into(),
            code: None
        }
        .is_retryable());
        assert!(FetchError::Upstream {
            status_code: 429,
            message: "slow down".into(),
            code: Some("rate_limited".into())
        }
        .is_retryable());
        assert!(!FetchError::Upstream {
            status_code: 404,
            message: "not found".into(),
            code: None
        }
        .is_retryable());
        assert!(!FetchError::Decode("eof".into()).is_retryable());
    }

    #[test]
    fn test_timeout_is_network_error() {
        let err = FetchError::timeout(std::time::Duration::from_secs(5));
        assert!(matches!(err, FetchError::Network(ref m) if m.contains("5000ms")));
        assert_eq!(err.status_code(), None);
    }
}
