//! Shared helpers for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chainview::channel::{ChannelIo, Connector};
use chainview::error::ChannelError;
use chainview::types::{ControlMessage, PushEnvelope};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Server half of one in-memory connection.
struct ServerEnd {
    to_client: mpsc::UnboundedSender<String>,
    from_client: mpsc::UnboundedReceiver<String>,
}

/// In-memory stand-in for the indexer's push endpoint.
///
/// Accepts or refuses connections on demand, pushes events to the newest
/// connection and records every frame the client sent.
#[derive(Default)]
pub struct TestConnector {
    refuse: AtomicBool,
    connects: AtomicU32,
    live: Mutex<Option<ServerEnd>>,
    received: Mutex<Vec<String>>,
}

impl TestConnector {
    pub fn accepting() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn refusing() -> Arc<Self> {
        let c = Self::default();
        c.refuse.store(true, Ordering::SeqCst);
        Arc::new(c)
    }

    pub fn set_refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Calls to `connect`, successful or not.
    pub fn connect_calls(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }

    /// Deliver `{event, data}` on the current connection.
    pub fn push(&self, event: &str, data: Value) -> bool {
        let frame = PushEnvelope {
            event: event.to_string(),
            data,
        };
        let text = serde_json::to_string(&frame).unwrap();
        self.live
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|end| end.to_client.send(text).is_ok())
    }

    /// Close the current connection from the server side.
    pub fn drop_connection(&self) {
        self.collect();
        self.live.lock().unwrap().take();
    }

    /// Every frame received from the client so far.
    pub fn received(&self) -> Vec<String> {
        self.collect();
        self.received.lock().unwrap().clone()
    }

    /// Control messages received so far, decoded.
    pub fn control_messages(&self) -> Vec<ControlMessage> {
        self.received()
            .iter()
            .filter_map(|t| serde_json::from_str(t).ok())
            .collect()
    }

    fn collect(&self) {
        let mut live = self.live.lock().unwrap();
        if let Some(end) = live.as_mut() {
            let mut received = self.received.lock().unwrap();
            while let Ok(text) = end.from_client.try_recv() {
                received.push(text);
            }
        }
    }
}

#[async_trait]
impl Connector for TestConnector {
    async fn connect(&self) -> Result<ChannelIo, ChannelError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.refuse.load(Ordering::SeqCst) {
            return Err(ChannelError::Connect("connection refused".into()));
        }
        self.collect();

        let (to_client, incoming) = mpsc::unbounded_channel();
        let (outgoing, from_client) = mpsc::unbounded_channel();
        *self.live.lock().unwrap() = Some(ServerEnd {
            to_client,
            from_client,
        });
        Ok(ChannelIo { outgoing, incoming })
    }
}

/// Let spawned tasks run without moving the paused clock.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
