use crate::channel::ReconnectPolicy;
use crate::gateway::GatewayConfig;
use crate::live::FeedConfig;
use anyhow::{anyhow, Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedKind {
    Blocks,
    Transactions,
    Pending,
    Stats,
}

impl std::str::FromStr for FeedKind {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "blocks" => Ok(FeedKind::Blocks),
            "transactions" | "txs" => Ok(FeedKind::Transactions),
            "pending" => Ok(FeedKind::Pending),
            "stats" => Ok(FeedKind::Stats),
            _ => Err(anyhow!(
                "Invalid feed '{s}'. Valid options: blocks, transactions, pending, stats"
            )),
        }
    }
}

impl std::fmt::Display for FeedKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedKind::Blocks => write!(f, "blocks"),
            FeedKind::Transactions => write!(f, "transactions"),
            FeedKind::Pending => write!(f, "pending"),
            FeedKind::Stats => write!(f, "stats"),
        }
    }
}

/// Chainview - live block explorer data feed
///
/// Follows one live feed (blocks, transactions, pending transactions or stats)
/// over the indexer's push channel, falling back to polling when it is down.
/// Configuration priority: CLI args > Environment variables > Config file > Defaults
#[derive(Parser, Debug, Default)]
#[command(name = "chainview")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Real-time blockchain explorer feed", long_about = None)]
pub struct CliArgs {
    /// TOML config file
    #[arg(short, long, env = "CHAINVIEW_CONFIG")]
    pub config: Option<PathBuf>,

    /// Feed to follow: blocks, transactions, pending or stats
    #[arg(short, long, env = "FEED", value_parser = clap::value_parser!(FeedKind))]
    pub feed: Option<FeedKind>,

    /// Indexer REST base URL (or the edge proxy's /api prefix)
    #[arg(long, env = "INDEXER_API_URL")]
    pub api_url: Option<String>,

    /// Indexer push channel (WebSocket) URL
    #[arg(long, env = "INDEXER_WS_URL")]
    pub ws_url: Option<String>,

    /// Bearer token sent to the indexer
    #[arg(long, env = "INDEXER_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// Upstream request timeout in milliseconds (500-60000)
    #[arg(long, env = "REQUEST_TIMEOUT_MS")]
    pub request_timeout_ms: Option<u64>,

    /// Window in which identical requests share one upstream call (0-5000)
    #[arg(long, env = "DEDUP_WINDOW_MS")]
    pub dedup_window_ms: Option<u64>,

    /// Calls slower than this are logged (100-60000)
    #[arg(long, env = "SLOW_REQUEST_MS")]
    pub slow_request_ms: Option<u64>,

    /// Seconds between expired cache entry sweeps (1-3600)
    #[arg(long, env = "CACHE_SWEEP_SECS")]
    pub cache_sweep_secs: Option<u64>,

    /// How long the push channel may take to connect before polling starts (100-60000)
    #[arg(long, env = "GRACE_PERIOD_MS")]
    pub grace_period_ms: Option<u64>,

    /// Block feed polling interval in milliseconds (250-60000)
    #[arg(long, env = "BLOCK_POLL_MS")]
    pub block_poll_ms: Option<u64>,

    /// Transaction feed polling interval in milliseconds (250-60000)
    #[arg(long, env = "TX_POLL_MS")]
    pub tx_poll_ms: Option<u64>,

    /// Pending transaction feed polling interval in milliseconds (250-60000)
    #[arg(long, env = "PENDING_POLL_MS")]
    pub pending_poll_ms: Option<u64>,

    /// Stats feed polling interval in milliseconds (250-60000)
    #[arg(long, env = "STATS_POLL_MS")]
    pub stats_poll_ms: Option<u64>,

    /// Items kept per feed (1-1000)
    #[arg(long, env = "KEEP_ITEMS")]
    pub keep_items: Option<usize>,

    /// First reconnect delay in milliseconds (100-60000)
    #[arg(long, env = "RECONNECT_INITIAL_MS")]
    pub reconnect_initial_ms: Option<u64>,

    /// Reconnect delay cap in milliseconds (100-600000)
    #[arg(long, env = "RECONNECT_MAX_MS")]
    pub reconnect_max_ms: Option<u64>,

    /// Automatic reconnect attempts before giving up (0-100)
    #[arg(long, env = "RECONNECT_MAX_ATTEMPTS")]
    pub reconnect_max_attempts: Option<u32>,
}

/// Keys accepted in the TOML config file. Same names as the CLI flags, in
/// snake_case; the proxy reads its own `[proxy]` table.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub feed: Option<FeedKind>,
    pub api_url: Option<String>,
    pub ws_url: Option<String>,
    pub auth_token: Option<String>,
    pub request_timeout_ms: Option<u64>,
    pub dedup_window_ms: Option<u64>,
    pub slow_request_ms: Option<u64>,
    pub cache_sweep_secs: Option<u64>,
    pub grace_period_ms: Option<u64>,
    pub block_poll_ms: Option<u64>,
    pub tx_poll_ms: Option<u64>,
    pub pending_poll_ms: Option<u64>,
    pub stats_poll_ms: Option<u64>,
    pub keep_items: Option<usize>,
    pub reconnect_initial_ms: Option<u64>,
    pub reconnect_max_ms: Option<u64>,
    pub reconnect_max_attempts: Option<u32>,
    pub proxy: Option<ProxyFileConfig>,
}

impl FileConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("invalid config file")
    }

    pub fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("in {}", path.display()))
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub feed: FeedKind,
    pub api_url: String,
    pub ws_url: String,
    pub auth_token: Option<String>,
    pub request_timeout_ms: u64,
    pub dedup_window_ms: u64,
    pub slow_request_ms: u64,
    pub cache_sweep_secs: u64,
    pub grace_period_ms: u64,
    pub block_poll_ms: u64,
    pub tx_poll_ms: u64,
    pub pending_poll_ms: u64,
    pub stats_poll_ms: u64,
    pub keep_items: usize,
    pub reconnect_initial_ms: u64,
    pub reconnect_max_ms: u64,
    pub reconnect_max_attempts: u32,
}

/// Validate that a value is within a given range (inclusive)
fn validate_in_range<T>(val: T, min: T, max: T, name: &str) -> Result<T>
where
    T: PartialOrd + std::fmt::Display + Copy,
{
    if val < min || val > max {
        Err(anyhow!("{name} must be in range [{min}, {max}], got {val}"))
    } else {
        Ok(val)
    }
}

/// Validate URL format (basic check)
fn validate_url(url: &str, name: &str, schemes: &[&str]) -> Result<()> {
    if url.is_empty() {
        return Err(anyhow!("{name} cannot be empty"));
    }
    if schemes.iter().any(|s| url.starts_with(&format!("{s}://"))) {
        Ok(())
    } else {
        let list = schemes
            .iter()
            .map(|s| format!("{s}://"))
            .collect::<Vec<_>>()
            .join(", ");
        Err(anyhow!("{name} must start with {list}"))
    }
}

/// CLI/env value first, then the config file, then the default.
fn pick<T>(cli: Option<T>, file: Option<T>, default: T) -> T {
    cli.or(file).unwrap_or(default)
}

/// Load configuration from CLI args, environment variables and an optional
/// config file. Priority: CLI args > Environment variables > Config file > Defaults
pub fn load() -> Result<Config> {
    Config::from_args(CliArgs::parse())
}

impl Config {
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let file = match &args.config {
            Some(path) => FileConfig::read(path)?,
            None => FileConfig::default(),
        };
        Self::resolve(args, file)
    }

    /// Merge already-parsed arguments over a config file and validate.
    pub fn resolve(args: CliArgs, file: FileConfig) -> Result<Self> {
        let api_url = pick(
            args.api_url,
            file.api_url,
            "http://127.0.0.1:3030/api".to_string(),
        );
        validate_url(&api_url, "INDEXER_API_URL", &["http", "https"])?;

        let ws_url = pick(args.ws_url, file.ws_url, "ws://127.0.0.1:3001/ws".to_string());
        validate_url(&ws_url, "INDEXER_WS_URL", &["ws", "wss"])?;

        let request_timeout_ms = validate_in_range(
            pick(args.request_timeout_ms, file.request_timeout_ms, 5000),
            500,
            60000,
            "REQUEST_TIMEOUT_MS",
        )?;
        let dedup_window_ms = validate_in_range(
            pick(args.dedup_window_ms, file.dedup_window_ms, 100),
            0,
            5000,
            "DEDUP_WINDOW_MS",
        )?;
        let slow_request_ms = validate_in_range(
            pick(args.slow_request_ms, file.slow_request_ms, 2000),
            100,
            60000,
            "SLOW_REQUEST_MS",
        )?;
        let cache_sweep_secs = validate_in_range(
            pick(args.cache_sweep_secs, file.cache_sweep_secs, 60),
            1,
            3600,
            "CACHE_SWEEP_SECS",
        )?;
        let grace_period_ms = validate_in_range(
            pick(args.grace_period_ms, file.grace_period_ms, 2000),
            100,
            60000,
            "GRACE_PERIOD_MS",
        )?;

        let block_poll_ms = validate_in_range(
            pick(args.block_poll_ms, file.block_poll_ms, 2000),
            250,
            60000,
            "BLOCK_POLL_MS",
        )?;
        let tx_poll_ms = validate_in_range(
            pick(args.tx_poll_ms, file.tx_poll_ms, 2000),
            250,
            60000,
            "TX_POLL_MS",
        )?;
        let pending_poll_ms = validate_in_range(
            pick(args.pending_poll_ms, file.pending_poll_ms, 2000),
            250,
            60000,
            "PENDING_POLL_MS",
        )?;
        let stats_poll_ms = validate_in_range(
            pick(args.stats_poll_ms, file.stats_poll_ms, 5000),
            250,
            60000,
            "STATS_POLL_MS",
        )?;

        let keep_items = validate_in_range(
            pick(args.keep_items, file.keep_items, 50),
            1,
            1000,
            "KEEP_ITEMS",
        )?;

        let reconnect_initial_ms = validate_in_range(
            pick(args.reconnect_initial_ms, file.reconnect_initial_ms, 1000),
            100,
            60000,
            "RECONNECT_INITIAL_MS",
        )?;
        let reconnect_max_ms = validate_in_range(
            pick(args.reconnect_max_ms, file.reconnect_max_ms, 30000),
            100,
            600000,
            "RECONNECT_MAX_MS",
        )?;
        if reconnect_max_ms < reconnect_initial_ms {
            return Err(anyhow!(
                "RECONNECT_MAX_MS ({reconnect_max_ms}) must not be below RECONNECT_INITIAL_MS ({reconnect_initial_ms})"
            ));
        }
        let reconnect_max_attempts = validate_in_range(
            pick(args.reconnect_max_attempts, file.reconnect_max_attempts, 5),
            0,
            100,
            "RECONNECT_MAX_ATTEMPTS",
        )?;

        Ok(Config {
            feed: pick(args.feed, file.feed, FeedKind::Blocks),
            api_url,
            ws_url,
            auth_token: args.auth_token.or(file.auth_token),
            request_timeout_ms,
            dedup_window_ms,
            slow_request_ms,
            cache_sweep_secs,
            grace_period_ms,
            block_poll_ms,
            tx_poll_ms,
            pending_poll_ms,
            stats_poll_ms,
            keep_items,
            reconnect_initial_ms,
            reconnect_max_ms,
            reconnect_max_attempts,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            dedup_window: Duration::from_millis(self.dedup_window_ms),
            request_timeout: self.request_timeout(),
            slow_request_threshold: Duration::from_millis(self.slow_request_ms),
            sweep_interval: Duration::from_secs(self.cache_sweep_secs),
        }
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            initial_delay: Duration::from_millis(self.reconnect_initial_ms),
            max_delay: Duration::from_millis(self.reconnect_max_ms),
            max_attempts: self.reconnect_max_attempts,
            ..ReconnectPolicy::default()
        }
    }

    pub fn poll_interval(&self, kind: FeedKind) -> Duration {
        Duration::from_millis(match kind {
            FeedKind::Blocks => self.block_poll_ms,
            FeedKind::Transactions => self.tx_poll_ms,
            FeedKind::Pending => self.pending_poll_ms,
            FeedKind::Stats => self.stats_poll_ms,
        })
    }

    /// Stats keep only the latest figures.
    pub fn feed_config(&self, kind: FeedKind) -> FeedConfig {
        let capacity = match kind {
            FeedKind::Stats => 1,
            _ => self.keep_items,
        };
        FeedConfig {
            capacity,
            seen_capacity: capacity * 2,
            grace_period: Duration::from_millis(self.grace_period_ms),
            poll_interval: self.poll_interval(kind),
        }
    }

    pub fn print_summary(&self) {
        log::info!("Chainview Configuration:");
        log::info!("  Feed: {}", self.feed);
        log::info!("  Indexer API: {}", self.api_url);
        log::info!("  Push channel: {}", self.ws_url);
        log::info!(
            "  Request timeout: {}ms (dedup window {}ms)",
            self.request_timeout_ms,
            self.dedup_window_ms
        );
        log::info!(
            "  Grace period: {}ms, poll every {}ms",
            self.grace_period_ms,
            self.poll_interval(self.feed).as_millis()
        );
        log::info!(
            "  Reconnect: {}ms..{}ms, {} attempts",
            self.reconnect_initial_ms,
            self.reconnect_max_ms,
            self.reconnect_max_attempts
        );
        log::info!("  Keep items: {}", self.keep_items);
        if self.auth_token.is_some() {
            log::info!("  Indexer auth: configured");
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Memory,
    Redis,
    Rest,
    None,
}

impl std::str::FromStr for CacheBackend {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "memory" | "mem" => Ok(CacheBackend::Memory),
            "redis" => Ok(CacheBackend::Redis),
            "rest" | "redis-rest" => Ok(CacheBackend::Rest),
            "none" | "off" => Ok(CacheBackend::None),
            _ => Err(anyhow!(
                "Invalid cache backend '{s}'. Valid options: memory, redis, rest, none"
            )),
        }
    }
}

impl std::fmt::Display for CacheBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheBackend::Memory => write!(f, "memory"),
            CacheBackend::Redis => write!(f, "redis"),
            CacheBackend::Rest => write!(f, "rest"),
            CacheBackend::None => write!(f, "none"),
        }
    }
}

/// Chainview edge cache proxy
///
/// Caching pass-through in front of the upstream indexer.
/// Configuration priority: CLI args > Environment variables > Config file > Defaults
#[derive(Parser, Debug, Default)]
#[command(name = "chainview-proxy")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Edge cache proxy for the blockchain indexer", long_about = None)]
pub struct ProxyArgs {
    /// TOML config file (reads the `[proxy]` table)
    #[arg(short, long, env = "CHAINVIEW_CONFIG")]
    pub config: Option<PathBuf>,

    /// Upstream indexer base URL
    #[arg(long, env = "UPSTREAM_URL")]
    pub upstream_url: Option<String>,

    /// Listen port
    #[arg(short, long, env = "PORT")]
    pub port: Option<u16>,

    /// Upstream request timeout in milliseconds (500-60000)
    #[arg(long, env = "UPSTREAM_TIMEOUT_MS")]
    pub upstream_timeout_ms: Option<u64>,

    /// Backing store: memory, redis, rest or none
    #[arg(long, env = "CACHE_BACKEND", value_parser = clap::value_parser!(CacheBackend))]
    pub cache_backend: Option<CacheBackend>,

    /// Redis server URL, redis:// or rediss:// (required for the redis backend)
    #[arg(long, env = "CACHE_REDIS_URL")]
    pub cache_redis_url: Option<String>,

    /// Redis-over-HTTP endpoint (required for the rest backend)
    #[arg(long, env = "CACHE_REST_URL")]
    pub cache_rest_url: Option<String>,

    /// Bearer token for the Redis-over-HTTP endpoint
    #[arg(long, env = "CACHE_REST_TOKEN")]
    pub cache_rest_token: Option<String>,

    /// Token required to clear the cache; clearing is refused when unset
    #[arg(long, env = "CACHE_ADMIN_TOKEN")]
    pub cache_admin_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProxyFileConfig {
    pub upstream_url: Option<String>,
    pub port: Option<u16>,
    pub upstream_timeout_ms: Option<u64>,
    pub cache_backend: Option<CacheBackend>,
    pub cache_redis_url: Option<String>,
    pub cache_rest_url: Option<String>,
    pub cache_rest_token: Option<String>,
    pub cache_admin_token: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ProxyConfig {
    pub upstream_url: String,
    pub port: u16,
    pub upstream_timeout_ms: u64,
    pub cache_backend: CacheBackend,
    pub cache_redis_url: Option<String>,
    pub cache_rest_url: Option<String>,
    pub cache_rest_token: Option<String>,
    pub cache_admin_token: Option<String>,
}

pub fn load_proxy() -> Result<ProxyConfig> {
    ProxyConfig::from_args(ProxyArgs::parse())
}

impl ProxyConfig {
    pub fn from_args(args: ProxyArgs) -> Result<Self> {
        let file = match &args.config {
            Some(path) => FileConfig::read(path)?.proxy.unwrap_or_default(),
            None => ProxyFileConfig::default(),
        };
        Self::resolve(args, file)
    }

    pub fn resolve(args: ProxyArgs, file: ProxyFileConfig) -> Result<Self> {
        let upstream_url = pick(
            args.upstream_url,
            file.upstream_url,
            "http://127.0.0.1:4000".to_string(),
        );
        validate_url(&upstream_url, "UPSTREAM_URL", &["http", "https"])?;

        let upstream_timeout_ms = validate_in_range(
            pick(args.upstream_timeout_ms, file.upstream_timeout_ms, 5000),
            500,
            60000,
            "UPSTREAM_TIMEOUT_MS",
        )?;

        let cache_backend = pick(args.cache_backend, file.cache_backend, CacheBackend::Memory);
        let cache_redis_url = args.cache_redis_url.or(file.cache_redis_url);
        match (&cache_backend, &cache_redis_url) {
            (CacheBackend::Redis, None) => {
                return Err(anyhow!("CACHE_REDIS_URL is required when CACHE_BACKEND=redis"))
            }
            (_, Some(url)) => validate_url(url, "CACHE_REDIS_URL", &["redis", "rediss"])?,
            _ => {}
        }

        let cache_rest_url = args.cache_rest_url.or(file.cache_rest_url);
        match (&cache_backend, &cache_rest_url) {
            (CacheBackend::Rest, None) => {
                return Err(anyhow!("CACHE_REST_URL is required when CACHE_BACKEND=rest"))
            }
            (_, Some(url)) => validate_url(url, "CACHE_REST_URL", &["http", "https"])?,
            _ => {}
        }

        Ok(ProxyConfig {
            upstream_url,
            port: pick(args.port, file.port, 3030),
            upstream_timeout_ms,
            cache_backend,
            cache_redis_url,
            cache_rest_url,
            cache_rest_token: args.cache_rest_token.or(file.cache_rest_token),
            cache_admin_token: args
                .cache_admin_token
                .or(file.cache_admin_token)
                .filter(|t| !t.is_empty()),
        })
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> CliArgs {
        let mut argv = vec!["chainview"];
        argv.extend_from_slice(list);
        CliArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let cfg = Config::resolve(CliArgs::default(), FileConfig::default()).unwrap();
        assert_eq!(cfg.feed, FeedKind::Blocks);
        assert_eq!(cfg.request_timeout_ms, 5000);
        assert_eq!(cfg.dedup_window_ms, 100);
        assert_eq!(cfg.keep_items, 50);
        assert_eq!(cfg.reconnect_max_attempts, 5);

        let stats = cfg.feed_config(FeedKind::Stats);
        assert_eq!(stats.capacity, 1);
        assert_eq!(stats.poll_interval, Duration::from_secs(5));
        assert_eq!(
            cfg.feed_config(FeedKind::Blocks).poll_interval,
            Duration::from_secs(2)
        );
    }

    #[test]
    fn test_cli_overrides_config_file() {
        let file = FileConfig::from_toml(
            r#"
            feed = "stats"
            keep_items = 20
            grace_period_ms = 3000
            "#,
        )
        .unwrap();
        let cfg = Config::resolve(args(&["--keep-items", "30"]), file).unwrap();
        assert_eq!(cfg.keep_items, 30);
        assert_eq!(cfg.feed, FeedKind::Stats);
        assert_eq!(cfg.grace_period_ms, 3000);
    }

    #[test]
    fn test_out_of_range_is_rejected() {
        let err = Config::resolve(args(&["--keep-items", "0"]), FileConfig::default())
            .unwrap_err()
            .to_string();
        assert!(err.contains("KEEP_ITEMS"), "{err}");
    }

    #[test]
    fn test_bad_urls_are_rejected() {
        assert!(
            Config::resolve(args(&["--ws-url", "http://x"]), FileConfig::default()).is_err()
        );
        assert!(
            Config::resolve(args(&["--api-url", "ftp://x"]), FileConfig::default()).is_err()
        );
    }

    #[test]
    fn test_unknown_file_keys_are_rejected() {
        assert!(FileConfig::from_toml("kep_items = 3").is_err());
    }

    #[test]
    fn test_feed_kind_parsing() {
        assert_eq!("Pending".parse::<FeedKind>().unwrap(), FeedKind::Pending);
        assert_eq!("txs".parse::<FeedKind>().unwrap(), FeedKind::Transactions);
        assert!("mempool".parse::<FeedKind>().is_err());
    }

    #[test]
    fn test_reconnect_policy_from_config() {
        let cfg = Config::resolve(
            args(&["--reconnect-initial-ms", "500", "--reconnect-max-attempts", "3"]),
            FileConfig::default(),
        )
        .unwrap();
        let policy = cfg.reconnect_policy();
        assert_eq!(policy.initial_delay, Duration::from_millis(500));
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.max_delay, Duration::from_secs(30));
    }

    #[test]
    fn test_proxy_rest_backend_needs_url() {
        let args = ProxyArgs::try_parse_from(["chainview-proxy", "--cache-backend", "rest"]).unwrap();
        assert!(ProxyConfig::resolve(args, ProxyFileConfig::default()).is_err());
    }

    #[test]
    fn test_proxy_redis_backend() {
        let args = ProxyArgs::try_parse_from(["chainview-proxy", "--cache-backend", "redis"]).unwrap();
        let err = ProxyConfig::resolve(args, ProxyFileConfig::default()).unwrap_err();
        assert!(err.to_string().contains("CACHE_REDIS_URL"));

        let args = ProxyArgs::try_parse_from([
            "chainview-proxy",
            "--cache-backend",
            "redis",
            "--cache-redis-url",
            "http://cache:6379",
        ])
        .unwrap();
        assert!(ProxyConfig::resolve(args, ProxyFileConfig::default()).is_err());

        let args = ProxyArgs::try_parse_from([
            "chainview-proxy",
            "--cache-backend",
            "redis",
            "--cache-redis-url",
            "redis://cache:6379/0",
        ])
        .unwrap();
        let cfg = ProxyConfig::resolve(args, ProxyFileConfig::default()).unwrap();
        assert_eq!(cfg.cache_backend, CacheBackend::Redis);
        assert_eq!(cfg.cache_redis_url.as_deref(), Some("redis://cache:6379/0"));
    }

    #[test]
    fn test_proxy_reads_file_table() {
        let file = FileConfig::from_toml(
            r#"
            [proxy]
            port = 8080
            cache_backend = "none"
            cache_admin_token = ""
            "#,
        )
        .unwrap();
        let cfg = ProxyConfig::resolve(ProxyArgs::default(), file.proxy.unwrap_or_default()).unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.cache_backend, CacheBackend::None);
        assert_eq!(cfg.cache_admin_token, None);
    }
}
