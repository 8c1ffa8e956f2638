//! Hybrid subscription controller
//!
//! A [`LiveFeed`] gives one consumer a continuously refreshed list of records
//! (blocks, transactions, stats) whatever the state of the push channel:
//!
//! - An initial load goes through the gateway right away, independent of the
//!   channel.
//! - While the channel is connected, pushed events are inserted directly.
//! - If the channel is not connected `grace_period` after start (or after it
//!   drops), the feed switches to polling the gateway every `poll_interval`
//!   until the channel comes back.
//! - Push and poll share one [`MaintainedList`], so an id observed through
//!   both paths is kept once.
//!
//! Channel trouble never surfaces as an error; consumers see `connected`,
//! `loading`, `polling` and `last_updated`. Dropping a feed releases its
//! handler and its poll timer without touching other feeds on the same channel.

pub mod feeds;
pub mod list;

pub use feeds::{BlocksFeed, PendingTransactionsFeed, StatsFeed, TransactionsFeed};
pub use list::MaintainedList;

use crate::channel::{ConnectionState, PushChannel};
use crate::error::FetchError;
use crate::types::Identified;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};

/// A domain stream a feed can follow.
#[async_trait]
pub trait FeedSource: Send + Sync + 'static {
    type Item: Identified + DeserializeOwned + Clone + Send + Sync + 'static;

    fn name(&self) -> &'static str;

    /// Push event carrying new items.
    fn event(&self) -> &'static str;

    /// Snapshot read through the gateway (initial load and polling).
    async fn load(&self) -> Result<Vec<Self::Item>, FetchError>;

    /// Items carried by one push event: a single record or an array of them.
    fn decode(&self, data: &Value) -> Vec<Self::Item> {
        let decoded = if data.is_array() {
            serde_json::from_value::<Vec<Self::Item>>(data.clone())
        } else {
            serde_json::from_value::<Self::Item>(data.clone()).map(|item| vec![item])
        };
        decoded.unwrap_or_else(|e| {
            log::debug!("[{}] undecodable push payload: {e}", self.name());
            Vec::new()
        })
    }
}

#[derive(Clone, Debug)]
pub struct FeedConfig {
    pub capacity: usize,
    /// Ids remembered for duplicate suppression (at least `capacity`).
    pub seen_capacity: usize,
    pub grace_period: Duration,
    pub poll_interval: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            capacity: 50,
            seen_capacity: 100,
            grace_period: Duration::from_secs(2),
            poll_interval: Duration::from_secs(2),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct FeedSnapshot<T> {
    pub items: Vec<T>,
    pub connected: bool,
    pub loading: bool,
    pub polling: bool,
    pub last_updated: Option<DateTime<Utc>>,
}

enum Command {
    Refresh,
}

pub struct LiveFeed<T> {
    name: &'static str,
    view: watch::Receiver<FeedSnapshot<T>>,
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl<T> LiveFeed<T>
where
    T: Identified + Clone + Send + Sync + 'static,
{
    /// Start following `source`. Calls `connect()` on the channel (a no-op
    /// when it is already up) and kicks off the initial load.
    pub fn start<S>(source: S, channel: PushChannel, config: FeedConfig) -> Self
    where
        S: FeedSource<Item = T>,
    {
        let name = source.name();
        let (view_tx, view) = watch::channel(FeedSnapshot {
            items: Vec::new(),
            connected: channel.is_connected(),
            loading: true,
            polling: false,
            last_updated: None,
        });
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_feed(
            Arc::new(source),
            channel,
            config,
            view_tx,
            commands_rx,
        ));
        log::info!("📺 Live feed '{name}' started");
        Self {
            name,
            view,
            commands,
            task,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn snapshot(&self) -> FeedSnapshot<T> {
        self.view.borrow().clone()
    }

    pub fn items(&self) -> Vec<T> {
        self.view.borrow().items.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.view.borrow().connected
    }

    pub fn is_loading(&self) -> bool {
        self.view.borrow().loading
    }

    pub fn is_polling(&self) -> bool {
        self.view.borrow().polling
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.view.borrow().last_updated
    }

    /// Receiver notified after every change to the snapshot.
    pub fn watch(&self) -> watch::Receiver<FeedSnapshot<T>> {
        self.view.clone()
    }

    /// Re-read through the gateway now (retry affordance). Ignored while a
    /// load is already in flight.
    pub fn refresh(&self) {
        let _ = self.commands.send(Command::Refresh);
    }

    pub fn close(self) {}
}

impl<T> Drop for LiveFeed<T> {
    fn drop(&mut self) {
        self.task.abort();
        log::debug!("live feed '{}' closed", self.name);
    }
}

type LoadFuture<T> = BoxFuture<'static, Result<Vec<T>, FetchError>>;

struct FeedState<T> {
    list: MaintainedList<T>,
    view: watch::Sender<FeedSnapshot<T>>,
    connected: bool,
    loading: bool,
    polling: bool,
    last_updated: Option<DateTime<Utc>>,
}

impl<T: Identified + Clone> FeedState<T> {
    fn merge_snapshot(&mut self, items: Vec<T>) {
        self.list.merge(items);
        self.last_updated = Some(Utc::now());
    }

    fn merge_pushed(&mut self, items: Vec<T>) {
        for item in items {
            self.list.insert(item);
        }
        self.last_updated = Some(Utc::now());
    }

    fn publish(&self) {
        self.view.send_replace(FeedSnapshot {
            items: self.list.to_vec(),
            connected: self.connected,
            loading: self.loading,
            polling: self.polling,
            last_updated: self.last_updated,
        });
    }
}

fn start_load<S: FeedSource>(source: &Arc<S>) -> LoadFuture<S::Item> {
    let source = source.clone();
    async move { source.load().await }.boxed()
}

async fn next_load<T>(slot: &mut Option<LoadFuture<T>>) -> Result<Vec<T>, FetchError> {
    match slot.as_mut() {
        Some(load) => {
            let result = load.await;
            *slot = None;
            result
        }
        None => std::future::pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(d).await,
        None => std::future::pending().await,
    }
}

async fn tick_opt(ticker: &mut Option<Interval>) {
    match ticker.as_mut() {
        Some(t) => {
            t.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn poll_ticker(period: Duration) -> Interval {
    // first tick fires immediately
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

async fn run_feed<S: FeedSource>(
    source: Arc<S>,
    channel: PushChannel,
    config: FeedConfig,
    view: watch::Sender<FeedSnapshot<S::Item>>,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    let name = source.name();
    let mut state = FeedState {
        list: MaintainedList::new(config.capacity, config.seen_capacity),
        view,
        connected: false,
        loading: true,
        polling: false,
        last_updated: None,
    };

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Vec<S::Item>>();
    let decoder = source.clone();
    let _subscription = channel.subscribe(source.event(), move |data| {
        let items = decoder.decode(data);
        if !items.is_empty() {
            let _ = event_tx.send(items);
        }
    });

    let mut link = channel.watch_state();
    channel.connect();

    let mut inflight: Option<LoadFuture<S::Item>> = Some(start_load(&source));
    let mut ticker: Option<Interval> = None;
    let mut grace: Option<Instant> = None;

    if *link.borrow_and_update() == ConnectionState::Connected {
        state.connected = true;
    } else {
        grace = Some(Instant::now() + config.grace_period);
    }
    state.publish();

    loop {
        tokio::select! {
            changed = link.changed() => {
                if changed.is_err() {
                    break;
                }
                let now = *link.borrow_and_update();
                if now == ConnectionState::Connected {
                    grace = None;
                    if state.polling {
                        ticker = None;
                        state.polling = false;
                        log::info!("[{name}] push channel connected; polling stopped");
                    }
                    state.connected = true;
                } else {
                    state.connected = false;
                    if !state.polling && grace.is_none() {
                        grace = Some(Instant::now() + config.grace_period);
                    }
                }
            }
            _ = sleep_until_opt(grace) => {
                grace = None;
                if !state.connected && !state.polling {
                    log::warn!(
                        "[{name}] push channel not connected after {}ms; polling every {}ms",
                        config.grace_period.as_millis(),
                        config.poll_interval.as_millis()
                    );
                    state.polling = true;
                    ticker = Some(poll_ticker(config.poll_interval));
                }
            }
            _ = tick_opt(&mut ticker) => {
                if inflight.is_none() {
                    inflight = Some(start_load(&source));
                } else {
                    log::debug!("[{name}] poll skipped; previous load still in flight");
                }
            }
            result = next_load(&mut inflight) => {
                state.loading = false;
                match result {
                    Ok(items) => state.merge_snapshot(items),
                    Err(e) => log::warn!("[{name}] load failed: {e}"),
                }
            }
            Some(items) = event_rx.recv() => {
                if state.polling {
                    log::trace!("[{name}] push event ignored while polling");
                } else {
                    state.merge_pushed(items);
                }
            }
            cmd = commands.recv() => match cmd {
                Some(Command::Refresh) => {
                    if inflight.is_none() {
                        inflight = Some(start_load(&source));
                    }
                }
                None => break,
            },
        }
        state.publish();
    }
}
