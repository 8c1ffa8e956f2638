//! Redis-compatible store reached over HTTP.
//!
//! For deployments that cannot hold a raw TCP connection to the cache. Each
//! command is POSTed as a JSON array (`["SET","k","v","PX","2000"]`) and the
//! answer comes back as `{"result": ..}` or `{"error": ".."}`. Values are
//! base64-encoded so arbitrary bytes survive the JSON round trip.

use super::store::{info_field, CacheStore, StoreStats};
use crate::cache::Blob;
use crate::error::CacheUnavailable;
use crate::upstream::http_client;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct CommandReply {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RestStore {
    url: String,
    token: Option<String>,
    timeout: Duration,
}

impl RestStore {
    pub fn new(url: impl Into<String>, token: Option<String>, timeout: Duration) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            token,
            timeout,
        }
    }

    async fn command(&self, args: &[&str]) -> Result<Value, CacheUnavailable> {
        let mut req = http_client()
            .post(&self.url)
            .timeout(self.timeout)
            .json(&args);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await?;
        let status = resp.status();
        let reply: CommandReply = resp.json().await.map_err(|e| {
            CacheUnavailable(format!("{} returned {status}: {e}", args.first().unwrap_or(&"?")))
        })?;
        if let Some(err) = reply.error {
            return Err(CacheUnavailable(err));
        }
        if !status.is_success() {
            return Err(CacheUnavailable(format!("store returned {status}")));
        }
        Ok(reply.result)
    }
}

fn as_count(v: &Value) -> u64 {
    v.as_u64()
        .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
        .unwrap_or(0)
}

#[async_trait]
impl CacheStore for RestStore {
    async fn get(&self, key: &str) -> Result<Option<Blob>, CacheUnavailable> {
        match self.command(&["GET", key]).await? {
            Value::String(encoded) => B64
                .decode(encoded.as_bytes())
                .map(|bytes| Some(Blob::from(bytes)))
                .map_err(|e| CacheUnavailable(format!("corrupt value under {key}: {e}"))),
            _ => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Blob, ttl: Duration) -> Result<(), CacheUnavailable> {
        let encoded = B64.encode(&value);
        if ttl.is_zero() {
            self.command(&["SET", key, &encoded]).await?;
        } else {
            let px = ttl.as_millis().to_string();
            self.command(&["SET", key, &encoded, "PX", &px]).await?;
        }
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<bool, CacheUnavailable> {
        Ok(as_count(&self.command(&["DEL", key]).await?) > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheUnavailable> {
        Ok(as_count(&self.command(&["EXISTS", key]).await?) > 0)
    }

    async fn clear(&self) -> Result<(), CacheUnavailable> {
        self.command(&["FLUSHDB"]).await?;
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats, CacheUnavailable> {
        let keys = as_count(&self.command(&["DBSIZE"]).await?);
        let info = self.command(&["INFO"]).await?;
        let info = info.as_str().unwrap_or_default();
        Ok(StoreStats {
            keys,
            memory_bytes: info_field(info, "used_memory"),
            hits: info_field(info, "keyspace_hits"),
            misses: info_field(info, "keyspace_misses"),
        })
    }

    fn backend(&self) -> &'static str {
        "rest"
    }
}
