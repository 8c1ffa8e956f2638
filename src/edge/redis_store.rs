//! Redis store spoken over the native protocol (`proxy` feature).
//!
//! Shared by every proxy instance pointed at the same server. The connection
//! is opened on first use and kept by a [`ConnectionManager`], which
//! reconnects on its own after a drop. Until the server answers, every call
//! fails with [`CacheUnavailable`] and the proxy passes requests through.

use super::store::{info_field, CacheStore, StoreStats};
use crate::cache::Blob;
use crate::error::CacheUnavailable;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, Cmd, FromRedisValue, RedisError};
use std::time::Duration;
use tokio::sync::OnceCell;

fn unavailable(e: RedisError) -> CacheUnavailable {
    CacheUnavailable(format!("redis: {e}"))
}

pub struct RedisStore {
    client: Client,
    manager: OnceCell<ConnectionManager>,
    timeout: Duration,
}

impl RedisStore {
    /// Only the URL is checked here; nothing is dialled until the first call.
    pub fn new(url: &str, timeout: Duration) -> Result<Self, CacheUnavailable> {
        Ok(Self {
            client: Client::open(url).map_err(unavailable)?,
            manager: OnceCell::new(),
            timeout,
        })
    }

    async fn connection(&self) -> Result<ConnectionManager, CacheUnavailable> {
        let connect = self
            .manager
            .get_or_try_init(|| ConnectionManager::new(self.client.clone()));
        let manager = tokio::time::timeout(self.timeout, connect)
            .await
            .map_err(|_| {
                CacheUnavailable(format!(
                    "redis connect timed out after {}ms",
                    self.timeout.as_millis()
                ))
            })?
            .map_err(unavailable)?;
        Ok(manager.clone())
    }

    async fn query<T: FromRedisValue>(&self, cmd: &Cmd) -> Result<T, CacheUnavailable> {
        let mut conn = self.connection().await?;
        tokio::time::timeout(self.timeout, cmd.query_async(&mut conn))
            .await
            .map_err(|_| {
                CacheUnavailable(format!(
                    "redis command timed out after {}ms",
                    self.timeout.as_millis()
                ))
            })?
            .map_err(unavailable)
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Blob>, CacheUnavailable> {
        let value: Option<Vec<u8>> = self.query(redis::cmd("GET").arg(key)).await?;
        Ok(value.map(Blob::from))
    }

    async fn set(&self, key: &str, value: Blob, ttl: Duration) -> Result<(), CacheUnavailable> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(&value[..]);
        if !ttl.is_zero() {
            cmd.arg("PX").arg(ttl.as_millis() as u64);
        }
        self.query::<()>(&cmd).await
    }

    async fn del(&self, key: &str) -> Result<bool, CacheUnavailable> {
        let removed: u64 = self.query(redis::cmd("DEL").arg(key)).await?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheUnavailable> {
        let found: u64 = self.query(redis::cmd("EXISTS").arg(key)).await?;
        Ok(found > 0)
    }

    async fn clear(&self) -> Result<(), CacheUnavailable> {
        self.query::<()>(&redis::cmd("FLUSHDB")).await
    }

    async fn stats(&self) -> Result<StoreStats, CacheUnavailable> {
        let keys: u64 = self.query(&redis::cmd("DBSIZE")).await?;
        let info: String = self.query(&redis::cmd("INFO")).await?;
        Ok(StoreStats {
            keys,
            memory_bytes: info_field(&info, "used_memory"),
            hits: info_field(&info, "keyspace_hits"),
            misses: info_field(&info, "keyspace_misses"),
        })
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}
