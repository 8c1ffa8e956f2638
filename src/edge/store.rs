//! Backing store seam for the edge proxy.

use crate::cache::{Blob, TtlCache};
use crate::error::CacheUnavailable;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub keys: u64,
    pub memory_bytes: u64,
    pub hits: u64,
    pub misses: u64,
}

/// A shared key/value store with per-key TTL. A zero TTL stores the value
/// without expiry.
///
/// Every operation may fail with [`CacheUnavailable`]; callers treat that as a
/// miss and carry on without the cache.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Blob>, CacheUnavailable>;

    async fn set(&self, key: &str, value: Blob, ttl: Duration) -> Result<(), CacheUnavailable>;

    /// Returns whether a value was removed.
    async fn del(&self, key: &str) -> Result<bool, CacheUnavailable>;

    async fn exists(&self, key: &str) -> Result<bool, CacheUnavailable>;

    async fn clear(&self) -> Result<(), CacheUnavailable>;

    async fn stats(&self) -> Result<StoreStats, CacheUnavailable>;

    /// Short name reported in the `X-Cache-Backend` header.
    fn backend(&self) -> &'static str;
}

/// Pull `field:value` out of a Redis `INFO` reply.
pub(crate) fn info_field(info: &str, field: &str) -> u64 {
    info.lines()
        .filter_map(|line| line.trim().split_once(':'))
        .find(|(name, _)| *name == field)
        .and_then(|(_, v)| v.trim().parse().ok())
        .unwrap_or(0)
}

/// In-process store. Only shared by the handlers of one proxy process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<TtlCache>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, TtlCache> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn sweep_expired(&self) -> usize {
        self.entries().sweep_expired()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Blob>, CacheUnavailable> {
        let value = self.entries().get(key);
        let counter = if value.is_some() {
            &self.hits
        } else {
            &self.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(value)
    }

    async fn set(&self, key: &str, value: Blob, ttl: Duration) -> Result<(), CacheUnavailable> {
        self.entries().insert(key, value, ttl);
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<bool, CacheUnavailable> {
        Ok(self.entries().remove(key))
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheUnavailable> {
        Ok(self.entries().contains(key))
    }

    async fn clear(&self) -> Result<(), CacheUnavailable> {
        self.entries().clear();
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats, CacheUnavailable> {
        let entries = self.entries();
        Ok(StoreStats {
            keys: entries.len() as u64,
            memory_bytes: entries.memory_bytes() as u64,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        })
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
