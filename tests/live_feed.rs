//! Hybrid subscription controller: push/poll switching, merge rules, disposal.

mod common;

use async_trait::async_trait;
use chainview::channel::{PushChannel, ReconnectPolicy};
use chainview::cache::Blob;
use chainview::error::FetchError;
use chainview::gateway::Gateway;
use chainview::live::{FeedConfig, FeedSource, LiveFeed};
use chainview::types::{events, BlockSummary};
use chainview::volatility::ttl_for;
use common::{settle, TestConnector};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn block(height: u64) -> BlockSummary {
    serde_json::from_value(json!({ "height": height, "hash": format!("0x{height:x}") })).unwrap()
}

fn heights(items: &[BlockSummary]) -> Vec<u64> {
    items.iter().map(|b| b.height).collect()
}

/// Block source whose snapshot the test controls.
#[derive(Clone, Default)]
struct ScriptedBlocks {
    snapshot: Arc<Mutex<Vec<BlockSummary>>>,
    loads: Arc<AtomicUsize>,
}

impl ScriptedBlocks {
    fn with(heights: &[u64]) -> Self {
        let source = Self::default();
        source.set(heights);
        source
    }

    fn set(&self, heights: &[u64]) {
        *self.snapshot.lock().unwrap() = heights.iter().copied().map(block).collect();
    }

    fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedSource for ScriptedBlocks {
    type Item = BlockSummary;

    fn name(&self) -> &'static str {
        "test-blocks"
    }

    fn event(&self) -> &'static str {
        events::NEW_BLOCK
    }

    async fn load(&self) -> Result<Vec<BlockSummary>, FetchError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.snapshot.lock().unwrap().clone())
    }
}

/// Block source reading through a real gateway, with upstream latency.
#[derive(Clone)]
struct GatewayBlocks {
    gateway: Gateway,
    upstream_calls: Arc<AtomicUsize>,
    latency: Duration,
}

impl GatewayBlocks {
    const PATH: &'static str = "/blocks?limit=10";

    fn new(latency: Duration) -> Self {
        Self {
            gateway: Gateway::default(),
            upstream_calls: Arc::default(),
            latency,
        }
    }

    fn upstream_calls(&self) -> usize {
        self.upstream_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedSource for GatewayBlocks {
    type Item = BlockSummary;

    fn name(&self) -> &'static str {
        "gateway-blocks"
    }

    fn event(&self) -> &'static str {
        events::NEW_BLOCK
    }

    async fn load(&self) -> Result<Vec<BlockSummary>, FetchError> {
        let calls = self.upstream_calls.clone();
        let latency = self.latency;
        self.gateway
            .fetch_json(
                Self::PATH,
                move || async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst) as u64 + 1;
                    tokio::time::sleep(latency).await;
                    let body = serde_json::to_vec(&vec![block(n)]).unwrap();
                    Ok(Blob::from(body))
                },
                Some(ttl_for(Self::PATH)),
            )
            .await
    }
}

fn no_retry() -> ReconnectPolicy {
    ReconnectPolicy {
        max_attempts: 0,
        jitter: Duration::ZERO,
        ..ReconnectPolicy::default()
    }
}

fn feed_config(capacity: usize) -> FeedConfig {
    FeedConfig {
        capacity,
        seen_capacity: capacity * 2,
        grace_period: Duration::from_secs(2),
        poll_interval: Duration::from_secs(2),
    }
}

#[tokio::test(start_paused = true)]
async fn disconnected_channel_falls_back_to_polling_at_fixed_cadence() {
    let server = TestConnector::refusing();
    let channel = PushChannel::new(server.clone(), no_retry());
    let source = ScriptedBlocks::with(&[3, 2, 1]);

    let feed = LiveFeed::start(source.clone(), channel.clone(), feed_config(10));
    settle().await;
    assert_eq!(source.loads(), 1, "initial load happens right away");
    assert!(!feed.is_loading());
    assert!(!feed.is_polling());
    assert_eq!(heights(&feed.items()), vec![3, 2, 1]);

    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert!(feed.is_polling());
    assert!(!feed.is_connected());
    assert_eq!(source.loads(), 2);

    tokio::time::sleep(Duration::from_millis(4000)).await;
    assert_eq!(source.loads(), 4, "one poll per interval");
    assert!(feed.last_updated().is_some());
    assert_eq!(server.connect_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn connected_channel_prepends_pushed_items_without_polling() {
    let server = TestConnector::accepting();
    let channel = PushChannel::new(server.clone(), no_retry());
    let source = ScriptedBlocks::with(&[3, 2, 1]);

    let feed = LiveFeed::start(source.clone(), channel.clone(), feed_config(10));
    settle().await;
    assert!(feed.is_connected());

    server.push(events::NEW_BLOCK, json!({ "height": 4, "hash": "0x4" }));
    settle().await;
    assert_eq!(heights(&feed.items()), vec![4, 3, 2, 1]);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(!feed.is_polling());
    assert_eq!(source.loads(), 1);
}

#[tokio::test(start_paused = true)]
async fn same_block_via_push_and_poll_is_kept_once() {
    let server = TestConnector::accepting();
    let channel = PushChannel::new(server.clone(), no_retry());
    let source = ScriptedBlocks::with(&[3, 2, 1]);

    let feed = LiveFeed::start(source.clone(), channel.clone(), feed_config(10));
    settle().await;

    // push first, then a snapshot that contains the same block
    server.push(events::NEW_BLOCK, json!({ "height": 4, "hash": "0x4" }));
    settle().await;
    source.set(&[5, 4, 3]);
    feed.refresh();
    settle().await;
    assert_eq!(heights(&feed.items()), vec![5, 4, 3, 2, 1]);

    // snapshot first, then the push for a block it already delivered
    server.push(events::NEW_BLOCK, json!([{ "height": 5, "hash": "0x5" }]));
    settle().await;
    assert_eq!(heights(&feed.items()), vec![5, 4, 3, 2, 1]);
}

#[tokio::test(start_paused = true)]
async fn list_never_exceeds_capacity() {
    let server = TestConnector::accepting();
    let channel = PushChannel::new(server.clone(), no_retry());
    let source = ScriptedBlocks::with(&[]);

    let feed = LiveFeed::start(source, channel.clone(), feed_config(3));
    settle().await;

    for h in 1..=10u64 {
        server.push(events::NEW_BLOCK, json!({ "height": h, "hash": format!("0x{h:x}") }));
        settle().await;
        assert!(feed.items().len() <= 3);
    }
    assert_eq!(heights(&feed.items()), vec![10, 9, 8]);
}

#[tokio::test(start_paused = true)]
async fn polling_stops_when_channel_connects() {
    let server = TestConnector::refusing();
    let channel = PushChannel::new(server.clone(), no_retry());
    let source = ScriptedBlocks::with(&[1]);

    let feed = LiveFeed::start(source.clone(), channel.clone(), feed_config(10));
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert!(feed.is_polling());

    server.set_refuse(false);
    channel.connect();
    settle().await;
    assert!(feed.is_connected());
    assert!(!feed.is_polling());

    let loads = source.loads();
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(source.loads(), loads);

    server.push(events::NEW_BLOCK, json!({ "height": 2, "hash": "0x2" }));
    settle().await;
    assert_eq!(heights(&feed.items()), vec![2, 1]);
}

#[tokio::test(start_paused = true)]
async fn dropped_connection_rearms_grace_period() {
    let server = TestConnector::accepting();
    let channel = PushChannel::new(server.clone(), no_retry());
    let source = ScriptedBlocks::with(&[1]);

    let feed = LiveFeed::start(source.clone(), channel.clone(), feed_config(10));
    settle().await;
    assert!(feed.is_connected());

    server.drop_connection();
    settle().await;
    assert!(!feed.is_connected());
    assert!(!feed.is_polling());

    tokio::time::sleep(Duration::from_millis(2100)).await;
    assert!(feed.is_polling());
}

#[tokio::test(start_paused = true)]
async fn closing_one_feed_leaves_others_on_the_same_channel() {
    let server = TestConnector::refusing();
    let channel = PushChannel::new(server.clone(), no_retry());
    let left_source = ScriptedBlocks::with(&[1]);
    let right_source = ScriptedBlocks::with(&[1]);

    let left = LiveFeed::start(left_source.clone(), channel.clone(), feed_config(10));
    let right = LiveFeed::start(right_source.clone(), channel.clone(), feed_config(10));
    settle().await;
    assert_eq!(channel.handler_count(events::NEW_BLOCK), 2);

    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert!(left.is_polling() && right.is_polling());

    left.close();
    settle().await;
    assert_eq!(channel.handler_count(events::NEW_BLOCK), 1);

    let left_loads = left_source.loads();
    let right_loads = right_source.loads();
    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(left_source.loads(), left_loads, "closed feed stopped polling");
    assert_eq!(right_source.loads(), right_loads + 2);
    assert!(right.is_polling());
}

#[tokio::test(start_paused = true)]
async fn polling_through_gateway_refreshes_every_interval() {
    let server = TestConnector::refusing();
    let channel = PushChannel::new(server.clone(), no_retry());
    let source = GatewayBlocks::new(Duration::from_millis(100));
    assert_eq!(ttl_for(GatewayBlocks::PATH), Duration::from_secs(2));

    let feed = LiveFeed::start(source.clone(), channel.clone(), feed_config(50));
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert!(feed.is_polling());
    assert_eq!(source.upstream_calls(), 2, "initial load plus first poll");

    // polls at 4s, 6s, ... 22s each reach the upstream
    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(source.upstream_calls(), 12);
    assert_eq!(feed.items().first().map(|b| b.height), Some(12));
}
