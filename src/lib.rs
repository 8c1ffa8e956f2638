//! Chainview - real-time data sync layer for a blockchain explorer
//!
//! This library keeps explorer views (latest blocks, transactions, pending
//! transactions, chain stats) fresh with as little upstream load as possible.
//!
//! ## Architecture
//!
//! ```text
//! consumer -> LiveFeed -> { PushChannel (event stream)
//!                           Gateway (initial load + polling fallback) }
//!                                  -> edge proxy (optional hop) -> indexer
//! ```
//!
//! - [`gateway`]: deduplicated, cached, timed reads of the upstream indexer
//! - [`channel`]: one reconnecting push connection with a handler registry
//! - [`live`]: feeds that merge pushed and polled records into one list
//! - [`edge`]: read-through HTTP cache in front of the indexer
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin chainview -- --feed blocks
//! cargo run --bin chainview-proxy -- --cache-backend memory
//! ```

// Core modules (available on all platforms)
pub mod cache;
pub mod config;
pub mod error;
pub mod types;
pub mod volatility;

// Remote data access
pub mod api;
pub mod gateway;
pub mod upstream;

// Push channel (WebSocket connector is native-only)
pub mod channel;

// Hybrid subscriptions
pub mod live;

// Edge cache proxy (HTTP server is behind the `proxy` feature)
pub mod edge;

// Re-export commonly used types
pub use api::IndexerApi;
pub use channel::{ConnectionState, PushChannel, ReconnectPolicy};
pub use config::{Config, FeedKind};
pub use error::{CacheUnavailable, ChannelError, FetchError};
pub use gateway::{Gateway, GatewayConfig};
pub use live::{FeedConfig, FeedSnapshot, LiveFeed};
