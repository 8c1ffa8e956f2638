//! Read-through cache in front of the upstream indexer.
//!
//! Transport independent: the axum server in `server.rs` is one front end,
//! tests drive [`EdgeCache::handle`] directly.

use super::store::CacheStore;
use crate::cache::Blob;
use crate::error::{CacheUnavailable, FetchError};
use crate::upstream::UpstreamClient;
use crate::volatility::ResourceClass;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
    /// No usable store: the request went straight upstream.
    Bypass,
}

impl CacheStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
            CacheStatus::Bypass => "BYPASS",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub status: u16,
    pub body: Blob,
    pub content_type: Option<String>,
    pub cache: CacheStatus,
    pub key: String,
    pub ttl: Duration,
    /// 2xx bodies only; drives the `Cache-Control` header.
    pub cacheable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AdminStats {
    pub keys: u64,
    pub memory: u64,
    pub hits: u64,
    pub misses: u64,
    #[serde(rename = "hitRate")]
    pub hit_rate: f64,
    pub enabled: bool,
}

#[derive(Serialize, Deserialize)]
struct StoredMeta {
    status: u16,
    #[serde(default)]
    content_type: Option<String>,
    ttl_ms: u64,
}

/// One cached upstream answer. Stored as a JSON metadata line, `\n`, then the
/// raw body.
struct StoredResponse {
    status: u16,
    content_type: Option<String>,
    ttl: Duration,
    body: Blob,
}

impl StoredResponse {
    fn encode(&self) -> Option<Blob> {
        let meta = StoredMeta {
            status: self.status,
            content_type: self.content_type.clone(),
            ttl_ms: self.ttl.as_millis() as u64,
        };
        let mut out = serde_json::to_vec(&meta).ok()?;
        out.push(b'\n');
        out.extend_from_slice(&self.body);
        Some(Blob::from(out))
    }

    fn decode(raw: &[u8]) -> Option<Self> {
        let split = raw.iter().position(|b| *b == b'\n')?;
        let meta: StoredMeta = serde_json::from_slice(&raw[..split]).ok()?;
        Some(Self {
            status: meta.status,
            content_type: meta.content_type,
            ttl: Duration::from_millis(meta.ttl_ms),
            body: Blob::from(&raw[split + 1..]),
        })
    }
}

/// Deterministic cache key: upper-cased method, path without trailing slash,
/// query pairs sorted.
pub fn cache_key(method: &str, path: &str, query: Option<&str>) -> String {
    let method = method.to_ascii_uppercase();
    let trimmed = path.trim_end_matches('/');
    let path = if trimmed.is_empty() { "/" } else { trimmed };

    let mut pairs: Vec<&str> = query
        .unwrap_or_default()
        .split('&')
        .filter(|p| !p.is_empty())
        .collect();
    pairs.sort_unstable();

    if pairs.is_empty() {
        format!("edge:{method}:{path}")
    } else {
        format!("edge:{method}:{path}?{}", pairs.join("&"))
    }
}

pub struct EdgeCache {
    store: Option<Arc<dyn CacheStore>>,
    upstream: UpstreamClient,
}

impl EdgeCache {
    pub fn new(store: Option<Arc<dyn CacheStore>>, upstream: UpstreamClient) -> Self {
        Self { store, upstream }
    }

    pub fn backend(&self) -> &'static str {
        self.store.as_ref().map_or("none", |s| s.backend())
    }

    pub fn upstream(&self) -> &UpstreamClient {
        &self.upstream
    }

    /// Serve one GET. Only a transport failure toward the upstream is an
    /// error; upstream non-2xx answers are passed through uncached.
    pub async fn handle(&self, path: &str, query: Option<&str>) -> Result<ProxyResponse, FetchError> {
        let key = cache_key("GET", path, query);
        let class = ResourceClass::classify(path);

        let mut cache = CacheStatus::Bypass;
        if let Some(store) = &self.store {
            match store.get(&key).await {
                Ok(Some(raw)) => match StoredResponse::decode(&raw) {
                    Some(stored) => {
                        log::debug!("edge HIT {key}");
                        return Ok(ProxyResponse {
                            status: stored.status,
                            body: stored.body,
                            content_type: stored.content_type,
                            cache: CacheStatus::Hit,
                            key,
                            ttl: stored.ttl,
                            cacheable: true,
                        });
                    }
                    None => {
                        log::debug!("edge entry {key} unreadable; refetching");
                        cache = CacheStatus::Miss;
                    }
                },
                Ok(None) => cache = CacheStatus::Miss,
                Err(e) => log::warn!("⚠️ Edge store {}: {e}; passing through", store.backend()),
            }
        }

        let target = match query.filter(|q| !q.is_empty()) {
            Some(q) => format!("{path}?{q}"),
            None => path.to_string(),
        };
        let started = Instant::now();
        let resp = self.upstream.get_raw(&target).await.map_err(|e| {
            log::error!("❌ Upstream forward failed for {target}: {e}");
            e
        })?;

        let success = resp.is_success();
        let ttl = class.ttl_for_body(&resp.body);
        let body: Blob = Blob::from(resp.body);
        if success {
            if let Some(store) = self.store.as_ref().filter(|_| cache == CacheStatus::Miss) {
                let stored = StoredResponse {
                    status: resp.status,
                    content_type: resp.content_type.clone(),
                    ttl,
                    body: body.clone(),
                };
                store_response(store.as_ref(), &key, &stored, started).await;
            }
            log::debug!("edge {} {key} ({} ttl)", cache.as_str(), class.label());
        } else {
            log::debug!("edge upstream {} for {key}; not cached", resp.status);
        }

        Ok(ProxyResponse {
            status: resp.status,
            body,
            content_type: resp.content_type,
            cache,
            key,
            ttl,
            cacheable: success,
        })
    }

    pub async fn stats(&self) -> AdminStats {
        let Some(store) = &self.store else {
            return AdminStats::disabled();
        };
        match store.stats().await {
            Ok(s) => {
                let lookups = s.hits + s.misses;
                let hit_rate = if lookups == 0 {
                    0.0
                } else {
                    s.hits as f64 / lookups as f64
                };
                AdminStats {
                    keys: s.keys,
                    memory: s.memory_bytes,
                    hits: s.hits,
                    misses: s.misses,
                    hit_rate,
                    enabled: true,
                }
            }
            Err(e) => {
                log::warn!("⚠️ Edge store {}: {e}", store.backend());
                AdminStats::disabled()
            }
        }
    }

    /// Drop every cached response. `Ok(false)` when there is no store.
    pub async fn clear(&self) -> Result<bool, CacheUnavailable> {
        let Some(store) = &self.store else {
            return Ok(false);
        };
        store.clear().await?;
        log::info!("🧹 Edge cache cleared ({})", store.backend());
        Ok(true)
    }
}

/// The entry ages from when the upstream request went out, so the store only
/// gets what is left of its TTL.
async fn store_response(
    store: &dyn CacheStore,
    key: &str,
    stored: &StoredResponse,
    started: Instant,
) {
    let remaining = if stored.ttl.is_zero() {
        stored.ttl
    } else {
        stored.ttl.saturating_sub(started.elapsed())
    };
    if !stored.ttl.is_zero() && remaining.is_zero() {
        log::debug!("edge {key} already stale on arrival; not cached");
        return;
    }

    let Some(raw) = stored.encode() else {
        return;
    };
    if let Err(e) = store.set(key, raw, remaining).await {
        log::warn!("⚠️ Edge store {}: {e}; response not cached", store.backend());
    }
}

impl AdminStats {
    fn disabled() -> Self {
        Self {
            keys: 0,
            memory: 0,
            hits: 0,
            misses: 0,
            hit_rate: 0.0,
            enabled: false,
        }
    }
}
