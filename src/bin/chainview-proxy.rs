//! Edge cache proxy server for Chainview
//!
//! Forwards read requests to the upstream indexer and caches successful
//! responses for as long as the requested resource can change.
//!
//! ## Endpoints
//! - GET /health - Health check
//! - GET /api/*path - Cached pass-through (`X-Cache`, `X-Cache-Key`, `X-Cache-TTL`)
//! - GET /admin/cache - Cache statistics
//! - POST /admin/cache - `{"action":"clear"}` (needs CACHE_ADMIN_TOKEN)
//!
//! ## Usage
//! ```bash
//! cargo run --bin chainview-proxy --features proxy
//! ```

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

use chainview::{
    config::{load_proxy, CacheBackend, ProxyConfig},
    edge::{server, CacheStore, EdgeCache, MemoryStore, RedisStore, RestStore},
    upstream::UpstreamClient,
};

const MEMORY_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (safe to ignore if not found)
    let _ = dotenvy::dotenv();

    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = load_proxy().context("Failed to load proxy configuration")?;

    log::info!("🦀 Chainview Edge Proxy");
    log::info!("Upstream: {}", cfg.upstream_url);
    log::info!("Upstream timeout: {}ms", cfg.upstream_timeout_ms);
    log::info!("Cache backend: {}", cfg.cache_backend);
    log::info!(
        "Cache admin: {}",
        if cfg.cache_admin_token.is_some() {
            "token configured"
        } else {
            "clear disabled"
        }
    );
    log::info!("Port: {}", cfg.port);

    let store = build_store(&cfg)?;
    let upstream = UpstreamClient::new(cfg.upstream_url.clone(), cfg.upstream_timeout());
    let state = server::ProxyState {
        edge: Arc::new(EdgeCache::new(store, upstream)),
        admin_token: cfg.cache_admin_token.clone(),
    };
    let app = server::router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", cfg.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    log::info!("🚀 Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn build_store(cfg: &ProxyConfig) -> Result<Option<Arc<dyn CacheStore>>> {
    let store: Option<Arc<dyn CacheStore>> = match cfg.cache_backend {
        CacheBackend::Memory => {
            let store = Arc::new(MemoryStore::new());
            let weak = Arc::downgrade(&store);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(MEMORY_SWEEP_INTERVAL);
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    let Some(store) = weak.upgrade() else {
                        break;
                    };
                    let removed = store.sweep_expired();
                    if removed > 0 {
                        log::debug!("swept {removed} expired edge entries");
                    }
                }
            });
            Some(store as Arc<dyn CacheStore>)
        }
        CacheBackend::Redis => {
            let url = cfg
                .cache_redis_url
                .as_deref()
                .context("CACHE_REDIS_URL is required when CACHE_BACKEND=redis")?;
            let store = RedisStore::new(url, cfg.upstream_timeout())
                .context("Invalid CACHE_REDIS_URL")?;
            Some(Arc::new(store) as Arc<dyn CacheStore>)
        }
        CacheBackend::Rest => cfg.cache_rest_url.as_ref().map(|url| {
            Arc::new(RestStore::new(
                url.clone(),
                cfg.cache_rest_token.clone(),
                cfg.upstream_timeout(),
            )) as Arc<dyn CacheStore>
        }),
        CacheBackend::None => None,
    };
    Ok(store)
}
