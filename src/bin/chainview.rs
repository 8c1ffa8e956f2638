// Native binary for Chainview - follows one live feed and logs its updates

use anyhow::{Context, Result};
use std::sync::Arc;

use chainview::{
    api::IndexerApi,
    channel::{ws::WsConnector, PushChannel},
    config::{load, Config, FeedKind},
    gateway::Gateway,
    live::{
        BlocksFeed, FeedSource, LiveFeed, PendingTransactionsFeed, StatsFeed, TransactionsFeed,
    },
    types::{BlockSummary, ChainStats, Identified, TransactionSummary},
    upstream::UpstreamClient,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (safe to ignore if not found)
    let _ = dotenvy::dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = load().context("Failed to load configuration")?;
    log::info!("🦀 Chainview {}", env!("CARGO_PKG_VERSION"));
    cfg.print_summary();

    let gateway = Gateway::new(cfg.gateway_config());
    let sweeper = gateway.spawn_sweeper();
    let upstream = UpstreamClient::new(cfg.api_url.clone(), cfg.request_timeout())
        .with_auth_token(cfg.auth_token.clone());
    let api = IndexerApi::new(gateway, upstream);

    let connector = WsConnector::new(cfg.ws_url.clone(), cfg.request_timeout());
    let channel = PushChannel::new(Arc::new(connector), cfg.reconnect_policy());

    let result = match cfg.feed {
        FeedKind::Blocks => {
            let source = BlocksFeed::new(api, cfg.keep_items);
            follow(source, channel.clone(), &cfg, describe_block).await
        }
        FeedKind::Transactions => {
            let source = TransactionsFeed::new(api, cfg.keep_items);
            follow(source, channel.clone(), &cfg, describe_tx).await
        }
        FeedKind::Pending => {
            let source = PendingTransactionsFeed::new(api, cfg.keep_items);
            follow(source, channel.clone(), &cfg, describe_tx).await
        }
        FeedKind::Stats => {
            let source = StatsFeed::new(api);
            follow(source, channel.clone(), &cfg, describe_stats).await
        }
    };

    channel.disconnect();
    sweeper.abort();
    result
}

/// Log every snapshot change until Ctrl+C.
async fn follow<S>(
    source: S,
    channel: PushChannel,
    cfg: &Config,
    describe: fn(&S::Item) -> String,
) -> Result<()>
where
    S: FeedSource,
{
    let feed = LiveFeed::start(source, channel, cfg.feed_config(cfg.feed));
    let mut updates = feed.watch();
    let mut newest: Option<String> = None;
    let mut mode = (false, false);

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snap = updates.borrow_and_update().clone();

                if (snap.connected, snap.polling) != mode {
                    mode = (snap.connected, snap.polling);
                    let label = match mode {
                        (true, _) => "live",
                        (false, true) => "polling",
                        (false, false) => "waiting",
                    };
                    log::info!("📶 {} feed is {label}", feed.name());
                }

                let head = snap.items.first().map(Identified::id);
                if head.is_some() && head != newest {
                    newest = head;
                    if let Some(item) = snap.items.first() {
                        log::info!("🆕 {} ({} kept)", describe(item), snap.items.len());
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("👋 Shutting down");
                break;
            }
        }
    }

    feed.close();
    Ok(())
}

fn describe_block(b: &BlockSummary) -> String {
    format!("block #{} {} ({} txs)", b.height, short(&b.hash), b.tx_count)
}

fn describe_tx(t: &TransactionSummary) -> String {
    format!(
        "tx {} {} -> {}",
        short(&t.hash),
        t.from.as_deref().unwrap_or("?"),
        t.to.as_deref().unwrap_or("?")
    )
}

fn describe_stats(s: &ChainStats) -> String {
    format!(
        "stats: head #{}, {} txs, {} addresses",
        s.latest_block, s.total_transactions, s.total_addresses
    )
}

fn short(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}
