//! Push channel manager
//!
//! Owns one persistent, reconnecting connection to the indexer's event stream.
//!
//! ```text
//! disconnected --connect()--> connecting --(handshake)--> connected
//!      ^                                                      |
//!      +---------------------(error | close)------------------+
//! ```
//!
//! - `connect()` is a no-op while connecting or connected.
//! - After an unexpected drop the manager retries with capped exponential
//!   backoff. Once `max_attempts` retries have failed it stays disconnected
//!   until somebody calls `connect()` again, which resets the counter.
//! - Failures never reach `subscribe`/`emit` callers. They are logged and show
//!   up only as state transitions (see [`PushChannel::watch_state`]).
//! - `emit` is best-effort: nothing is queued while disconnected.
//!
//! The socket itself sits behind [`Connector`]; `ws::WsConnector` is the
//! WebSocket implementation.

pub mod registry;
#[cfg(feature = "native")]
pub mod ws;

use crate::error::ChannelError;
use crate::types::{ControlMessage, PushEnvelope};
use async_trait::async_trait;
use rand::Rng;
use registry::{Handler, HandlerRegistry};
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

/// Text frames in both directions of an established connection. The
/// connection is over when `incoming` yields `None`.
pub struct ChannelIo {
    pub outgoing: mpsc::UnboundedSender<String>,
    pub incoming: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a connection. Returning `Ok` is the acknowledgement that moves the
    /// channel to `connected`.
    async fn connect(&self) -> Result<ChannelIo, ChannelError>;
}

#[derive(Clone, Debug)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Automatic retries per outage.
    pub max_attempts: u32,
    /// Upper bound of random delay added to each retry.
    pub jitter: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
            jitter: Duration::from_millis(250),
        }
    }
}

impl ReconnectPolicy {
    /// Un-jittered delay before retry number `attempt` (1-based):
    /// `initial * 2^(attempt-1)`, capped at `max_delay`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(20);
        self.initial_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay)
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        self.backoff(attempt) + Duration::from_millis(jitter)
    }
}

#[derive(Default)]
struct Link {
    outgoing: Option<mpsc::UnboundedSender<String>>,
    attempts: u32,
    exhausted: bool,
    generation: u64,
    driver: Option<JoinHandle<()>>,
}

struct ChannelInner {
    connector: Arc<dyn Connector>,
    policy: ReconnectPolicy,
    state: watch::Sender<ConnectionState>,
    link: Mutex<Link>,
    registry: Mutex<HandlerRegistry>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Clone)]
pub struct PushChannel {
    inner: Arc<ChannelInner>,
}

impl PushChannel {
    pub fn new(connector: Arc<dyn Connector>, policy: ReconnectPolicy) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(ChannelInner {
                connector,
                policy,
                state,
                link: Mutex::new(Link::default()),
                registry: Mutex::new(HandlerRegistry::new()),
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Automatic retries made during the current outage.
    pub fn reconnect_attempts(&self) -> u32 {
        lock(&self.inner.link).attempts
    }

    /// True once the retry budget ran out; cleared by `connect()`.
    pub fn is_exhausted(&self) -> bool {
        lock(&self.inner.link).exhausted
    }

    pub fn connect(&self) {
        let mut link = lock(&self.inner.link);
        let state = self.state();
        if state != ConnectionState::Disconnected {
            log::debug!("push channel connect() ignored: already {state}");
            return;
        }
        if let Some(stale) = link.driver.take() {
            stale.abort();
        }
        link.attempts = 0;
        link.exhausted = false;
        link.generation += 1;
        let generation = link.generation;

        self.inner.set_state(ConnectionState::Connecting);
        link.driver = Some(tokio::spawn(drive(
            Arc::downgrade(&self.inner),
            generation,
        )));
    }

    /// Close the connection and stop retrying.
    pub fn disconnect(&self) {
        let mut link = lock(&self.inner.link);
        link.generation += 1;
        if let Some(driver) = link.driver.take() {
            driver.abort();
        }
        link.outgoing = None;
        self.inner.set_state(ConnectionState::Disconnected);
    }

    /// Register `handler` for `event`. Handlers for one event run in
    /// registration order, synchronously, as each message is received.
    pub fn subscribe<F>(&self, event: &str, handler: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(handler);
        let (id, first) = lock(&self.inner.registry).add(event, handler);
        if first {
            self.inner.send_control(&ControlMessage::Subscribe {
                event: event.to_string(),
            });
        }
        Subscription {
            channel: Arc::downgrade(&self.inner),
            event: event.to_string(),
            id,
        }
    }

    /// Send an event upstream. Only while connected; otherwise dropped.
    pub fn emit(&self, event: &str, payload: Value) -> bool {
        let link = lock(&self.inner.link);
        let state = self.state();
        let Some(tx) = link.outgoing.as_ref().filter(|_| state == ConnectionState::Connected)
        else {
            log::debug!("emit({event}) dropped: push channel {state}");
            return false;
        };

        let frame = PushEnvelope {
            event: event.to_string(),
            data: payload,
        };
        match serde_json::to_string(&frame) {
            Ok(text) => tx.send(text).is_ok(),
            Err(e) => {
                log::warn!("emit({event}) could not be encoded: {e}");
                false
            }
        }
    }

    pub fn handler_count(&self, event: &str) -> usize {
        lock(&self.inner.registry).count(event)
    }
}

impl ChannelInner {
    fn set_state(&self, next: ConnectionState) {
        let mut prev = next;
        let changed = self.state.send_if_modified(|s| {
            prev = *s;
            if *s != next {
                *s = next;
                true
            } else {
                false
            }
        });
        if changed {
            log::info!("🔌 Push channel {prev} → {next}");
        }
    }

    fn send_control(&self, msg: &ControlMessage) {
        let link = lock(&self.link);
        if let Some(tx) = &link.outgoing {
            if let Ok(text) = serde_json::to_string(msg) {
                let _ = tx.send(text);
            }
        }
    }

    fn on_connected(&self, outgoing: mpsc::UnboundedSender<String>, generation: u64) -> bool {
        let mut link = lock(&self.link);
        if link.generation != generation {
            return false;
        }
        for event in lock(&self.registry).events() {
            if let Ok(text) = serde_json::to_string(&ControlMessage::Subscribe { event }) {
                let _ = outgoing.send(text);
            }
        }
        link.attempts = 0;
        link.exhausted = false;
        link.outgoing = Some(outgoing);
        self.set_state(ConnectionState::Connected);
        true
    }

    /// Back to `disconnected`; returns the delay before the next retry, or
    /// `None` when the budget is spent or this driver has been superseded.
    fn on_disconnected(&self, generation: u64) -> Option<Duration> {
        let mut link = lock(&self.link);
        if link.generation != generation {
            return None;
        }
        link.outgoing = None;
        self.set_state(ConnectionState::Disconnected);

        if link.attempts >= self.policy.max_attempts {
            link.exhausted = true;
            log::error!(
                "❌ Push channel: {}",
                ChannelError::Exhausted {
                    attempts: link.attempts
                }
            );
            return None;
        }
        link.attempts += 1;
        let delay = self.policy.delay_for(link.attempts);
        log::info!(
            "🔁 Push channel reconnecting in {}ms (attempt {}/{})",
            delay.as_millis(),
            link.attempts,
            self.policy.max_attempts
        );
        Some(delay)
    }

    fn begin_retry(&self, generation: u64) -> bool {
        let link = lock(&self.link);
        if link.generation != generation || *self.state.borrow() != ConnectionState::Disconnected
        {
            return false;
        }
        self.set_state(ConnectionState::Connecting);
        true
    }

    fn dispatch(&self, text: &str) {
        let frame: PushEnvelope = match serde_json::from_str(text) {
            Ok(f) => f,
            Err(e) => {
                log::debug!("ignoring unrecognised push frame: {e}");
                return;
            }
        };
        let handlers = lock(&self.registry).handlers_for(&frame.event);
        for handler in handlers {
            handler(&frame.data);
        }
    }
}

impl Drop for ChannelInner {
    fn drop(&mut self) {
        if let Some(driver) = lock(&self.link).driver.take() {
            driver.abort();
        }
    }
}

async fn drive(weak: Weak<ChannelInner>, generation: u64) {
    loop {
        let Some(connector) = weak.upgrade().map(|inner| inner.connector.clone()) else {
            return;
        };
        let outcome = connector.connect().await;

        match outcome {
            Ok(ChannelIo {
                outgoing,
                mut incoming,
            }) => {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                if !inner.on_connected(outgoing, generation) {
                    return;
                }
                drop(inner);

                while let Some(text) = incoming.recv().await {
                    let Some(inner) = weak.upgrade() else {
                        return;
                    };
                    inner.dispatch(&text);
                }
                log::warn!(
                    "⚠️ Push channel: {}",
                    ChannelError::Closed("stream ended".into())
                );
            }
            Err(e) => log::warn!("⚠️ Push channel: {e}"),
        }

        let Some(delay) = weak.upgrade().and_then(|inner| inner.on_disconnected(generation))
        else {
            return;
        };
        tokio::time::sleep(delay).await;

        let Some(inner) = weak.upgrade() else {
            return;
        };
        if !inner.begin_retry(generation) {
            return;
        }
    }
}

/// Handle for one registered handler. Dropping it (or calling
/// [`Subscription::unsubscribe`]) removes exactly that handler.
#[must_use = "dropping a Subscription removes its handler"]
pub struct Subscription {
    channel: Weak<ChannelInner>,
    event: String,
    id: u64,
}

impl Subscription {
    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(inner) = self.channel.upgrade() else {
            return;
        };
        let now_empty = lock(&inner.registry).remove(&self.event, self.id);
        if now_empty {
            inner.send_control(&ControlMessage::Unsubscribe {
                event: std::mem::take(&mut self.event),
            });
        }
    }
}
