//! Edge cache proxy
//!
//! Sits between callers and the upstream indexer. GET responses are keyed by
//! method, path and query and kept for as long as the path's volatility class
//! allows (see [`crate::volatility`]). The backing store is swappable: an
//! in-process [`MemoryStore`], a shared Redis server spoken to directly
//! (`RedisStore`, `proxy` feature) or a Redis-compatible [`RestStore`] over HTTP.
//! When the store is unreachable every request passes straight through.

pub mod proxy;
#[cfg(feature = "proxy")]
pub mod redis_store;
pub mod rest_store;
#[cfg(feature = "proxy")]
pub mod server;
pub mod store;

pub use proxy::{cache_key, AdminStats, CacheStatus, EdgeCache, ProxyResponse};
#[cfg(feature = "proxy")]
pub use redis_store::RedisStore;
pub use rest_store::RestStore;
pub use store::{CacheStore, MemoryStore, StoreStats};
