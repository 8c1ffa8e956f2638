//! Remote data gateway
//!
//! Entry point for every upstream read made by the client side. A single
//! `Gateway` instance is built once and cloned into whoever needs it; clones
//! share one local cache and one pending-request table.
//!
//! `fetch(key, request_fn, ttl)`:
//! 1. `ttl` given and a valid entry cached under `key` → return it, no network.
//! 2. A request for `key` started less than `dedup_window` ago is still in
//!    flight → join it. Every joined caller sees the identical result.
//! 3. Otherwise run `request_fn`, register it as the pending request, cache a
//!    success (when `ttl` is given) and clear the pending slot either way.
//!    A cached value ages from the moment its request started, so a caller
//!    polling once per TTL always gets a fresh read.
//!
//! In-flight requests are driven on their own task, so a caller that goes away
//! mid-flight does not cancel the upstream call; its result is simply dropped.

use crate::cache::{Blob, TtlCache};
use crate::error::FetchError;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

type SharedFetch = Shared<BoxFuture<'static, Result<Blob, FetchError>>>;

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    /// Calls for the same key started within this span collapse into one.
    pub dedup_window: Duration,
    /// Hard bound on a single upstream call.
    pub request_timeout: Duration,
    /// Calls slower than this are logged.
    pub slow_request_threshold: Duration,
    /// Period of the expired-entry sweep.
    pub sweep_interval: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            dedup_window: Duration::from_millis(100),
            request_timeout: Duration::from_secs(5),
            slow_request_threshold: Duration::from_secs(2),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

struct PendingRequest {
    id: u64,
    started_at: Instant,
    future: SharedFetch,
}

struct Inner {
    config: GatewayConfig,
    cache: Mutex<TtlCache>,
    pending: Mutex<HashMap<String, PendingRequest>>,
    next_id: AtomicU64,
}

#[derive(Clone)]
pub struct Gateway {
    inner: Arc<Inner>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Gateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                cache: Mutex::new(TtlCache::new()),
                pending: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.inner.config
    }

    pub async fn fetch<F, Fut>(
        &self,
        key: &str,
        request_fn: F,
        cache_ttl: Option<Duration>,
    ) -> Result<Blob, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Blob, FetchError>> + Send + 'static,
    {
        if cache_ttl.is_some() {
            if let Some(hit) = lock(&self.inner.cache).get(key) {
                log::trace!("gateway cache hit: {key}");
                return Ok(hit);
            }
        }

        let shared = {
            let mut pending = lock(&self.inner.pending);
            let joinable = pending
                .get(key)
                .filter(|p| p.started_at.elapsed() < self.inner.config.dedup_window)
                .map(|p| p.future.clone());
            match joinable {
                Some(future) => {
                    log::trace!("gateway joined in-flight request: {key}");
                    future
                }
                None => {
                    let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
                    let started = Instant::now();
                    let future = self
                        .clone()
                        .run(key.to_string(), id, started, request_fn(), cache_ttl)
                        .boxed()
                        .shared();
                    pending.insert(
                        key.to_string(),
                        PendingRequest {
                            id,
                            started_at: started,
                            future: future.clone(),
                        },
                    );
                    tokio::spawn(future.clone());
                    future
                }
            }
        };

        shared.await
    }

    /// `fetch` followed by JSON decoding at the call site.
    pub async fn fetch_json<T, F, Fut>(
        &self,
        key: &str,
        request_fn: F,
        cache_ttl: Option<Duration>,
    ) -> Result<T, FetchError>
    where
        T: DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Blob, FetchError>> + Send + 'static,
    {
        let blob = self.fetch(key, request_fn, cache_ttl).await?;
        Ok(serde_json::from_slice(&blob)?)
    }

    /// Warm the cache in the background. Never blocks and never reports failure.
    pub fn prefetch<F, Fut>(&self, key: impl Into<String>, request_fn: F, ttl: Duration)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Blob, FetchError>> + Send + 'static,
    {
        let gateway = self.clone();
        let key = key.into();
        tokio::spawn(async move {
            if let Err(e) = gateway.fetch(&key, request_fn, Some(ttl)).await {
                log::debug!("prefetch {key} failed: {e}");
            }
        });
    }

    async fn run<Fut>(
        self,
        key: String,
        id: u64,
        started: Instant,
        request: Fut,
        cache_ttl: Option<Duration>,
    ) -> Result<Blob, FetchError>
    where
        Fut: Future<Output = Result<Blob, FetchError>> + Send + 'static,
    {
        let config = &self.inner.config;

        let result = match tokio::time::timeout(config.request_timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::timeout(config.request_timeout)),
        };

        let elapsed = started.elapsed();
        if elapsed > config.slow_request_threshold {
            log::warn!(
                "🐢 Slow upstream call for {key}: {}ms (threshold {}ms)",
                elapsed.as_millis(),
                config.slow_request_threshold.as_millis()
            );
        }

        if let (Ok(value), Some(ttl)) = (&result, cache_ttl) {
            lock(&self.inner.cache).insert_at(key.as_str(), value.clone(), ttl, started);
        }

        // A newer request may have replaced this one after the dedup window.
        let mut pending = lock(&self.inner.pending);
        if pending.get(&key).is_some_and(|p| p.id == id) {
            pending.remove(&key);
        }
        drop(pending);

        if let Err(e) = &result {
            log::debug!("upstream call for {key} failed: {e}");
        }
        result
    }

    /// Give a cached value a new lifetime, e.g. once its body shows it is not
    /// final yet. Returns false when nothing valid is cached under `key`.
    pub fn expire_after(&self, key: &str, ttl: Duration) -> bool {
        lock(&self.inner.cache).set_ttl(key, ttl)
    }

    pub fn invalidate(&self, key: &str) -> bool {
        lock(&self.inner.cache).remove(key)
    }

    pub fn clear(&self) {
        lock(&self.inner.cache).clear();
    }

    pub fn cached_len(&self) -> usize {
        lock(&self.inner.cache).len()
    }

    pub fn pending_len(&self) -> usize {
        lock(&self.inner.pending).len()
    }

    pub fn sweep_expired(&self) -> usize {
        lock(&self.inner.cache).sweep_expired()
    }

    /// Periodically drop expired cache entries. The task ends once every
    /// `Gateway` clone has been dropped.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let period = self.inner.config.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let removed = lock(&inner.cache).sweep_expired();
                if removed > 0 {
                    log::debug!("🧹 Swept {removed} expired gateway cache entries");
                }
            }
        })
    }
}

impl Default for Gateway {
    fn default() -> Self {
        Self::new(GatewayConfig::default())
    }
}
