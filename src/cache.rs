//! TTL-bounded key/value cache with opaque byte values.
//!
//! Used as the gateway's local cache and as the in-memory backing store of the
//! edge proxy. Values are never interpreted here; decoding happens at the call
//! site that asked for them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Opaque cached payload. Cheap to clone into many readers.
pub type Blob = Arc<[u8]>;

/// TTL meaning "never expires".
pub const PERMANENT: Duration = Duration::ZERO;

#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub key: String,
    pub value: Blob,
    pub written_at: Instant,
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn new(key: impl Into<String>, value: Blob, ttl: Duration) -> Self {
        Self::written_at(key, value, ttl, Instant::now())
    }

    /// Entry whose age counts from `written_at` rather than from now.
    pub fn written_at(
        key: impl Into<String>,
        value: Blob,
        ttl: Duration,
        written_at: Instant,
    ) -> Self {
        Self {
            key: key.into(),
            value,
            written_at,
            ttl,
        }
    }

    pub fn is_permanent(&self) -> bool {
        self.ttl.is_zero()
    }

    /// `ttl == 0 || now - written_at < ttl`
    pub fn is_valid_at(&self, now: Instant) -> bool {
        self.is_permanent() || now.saturating_duration_since(self.written_at) < self.ttl
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Instant::now())
    }

    /// Time left before expiry; `None` for permanent entries.
    pub fn remaining(&self) -> Option<Duration> {
        if self.is_permanent() {
            return None;
        }
        Some(self.ttl.saturating_sub(self.written_at.elapsed()))
    }

    fn footprint(&self) -> usize {
        self.key.len() + self.value.len()
    }
}

#[derive(Debug, Default)]
pub struct TtlCache {
    entries: HashMap<String, CacheEntry>,
}

impl TtlCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value only while the entry is valid. An expired entry is
    /// dropped on the spot.
    pub fn get(&mut self, key: &str) -> Option<Blob> {
        let now = Instant::now();
        match self.entries.get(key) {
            Some(entry) if entry.is_valid_at(now) => Some(entry.value.clone()),
            Some(_) => {
                self.entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn entry(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key).filter(|e| e.is_valid())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Blob, ttl: Duration) {
        self.insert_at(key, value, ttl, Instant::now());
    }

    /// Insert a value fetched by a request that started at `started`, so its
    /// age includes the time spent waiting for the answer.
    pub fn insert_at(
        &mut self,
        key: impl Into<String>,
        value: Blob,
        ttl: Duration,
        started: Instant,
    ) {
        let entry = CacheEntry::written_at(key, value, ttl, started);
        self.entries.insert(entry.key.clone(), entry);
    }

    /// Change the lifetime of a live entry. Age still counts from its
    /// original write.
    pub fn set_ttl(&mut self, key: &str, ttl: Duration) -> bool {
        let now = Instant::now();
        match self.entries.get_mut(key) {
            Some(entry) if entry.is_valid_at(now) => {
                entry.ttl = ttl;
                true
            }
            _ => false,
        }
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entry(key).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn sweep_expired(&mut self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, e| e.is_valid_at(now));
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Approximate bytes held (keys + values).
    pub fn memory_bytes(&self) -> usize {
        self.entries.values().map(CacheEntry::footprint).sum()
    }
}
