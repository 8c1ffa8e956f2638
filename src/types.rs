use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Records that can be de-duplicated inside a live feed.
pub trait Identified {
    /// Stable identifier (block hash/height, tx hash, ...).
    fn id(&self) -> String;

    /// Optional ordering key; higher is newer. Items that have one are kept
    /// newest-first in a maintained list.
    fn ordinal(&self) -> Option<u64> {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockSummary {
    pub height: u64,
    pub hash: String,
    #[serde(default)]
    pub parent_hash: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tx_count: u64,
    #[serde(default)]
    pub miner: Option<String>,
    #[serde(default)]
    pub gas_used: Option<String>,
}

impl Identified for BlockSummary {
    fn id(&self) -> String {
        self.height.to_string()
    }

    fn ordinal(&self) -> Option<u64> {
        Some(self.height)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionSummary {
    pub hash: String,
    #[serde(default)]
    pub block_height: Option<u64>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl TransactionSummary {
    /// Still in the mempool, so the record can change.
    pub fn is_pending(&self) -> bool {
        self.status
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case("pending"))
    }
}

impl Identified for TransactionSummary {
    fn id(&self) -> String {
        self.hash.clone()
    }
}

/// Aggregate chain statistics. One snapshot per update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainStats {
    pub latest_block: u64,
    #[serde(default)]
    pub total_transactions: u64,
    #[serde(default)]
    pub total_addresses: u64,
    #[serde(default)]
    pub average_block_time_ms: Option<u64>,
    #[serde(default)]
    pub gas_price_gwei: Option<f64>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Identified for ChainStats {
    /// Snapshots without `updated_at` are told apart by their contents, so a
    /// new total at the same head still counts as an update.
    fn id(&self) -> String {
        match self.updated_at {
            Some(ts) => format!("{}@{}", self.latest_block, ts.timestamp_millis()),
            None => format!(
                "{}:{}:{}:{}:{}",
                self.latest_block,
                self.total_transactions,
                self.total_addresses,
                self.average_block_time_ms.unwrap_or_default(),
                self.gas_price_gwei.map(f64::to_bits).unwrap_or_default(),
            ),
        }
    }

    fn ordinal(&self) -> Option<u64> {
        Some(self.latest_block)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GasPrice {
    pub slow: f64,
    pub average: f64,
    pub fast: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressInfo {
    pub address: String,
    #[serde(default)]
    pub balance: Option<String>,
    #[serde(default)]
    pub tx_count: u64,
    #[serde(default)]
    pub is_contract: bool,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub address: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub decimals: Option<u8>,
    #[serde(default)]
    pub total_supply: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SearchHit {
    Block { height: u64, hash: String },
    Transaction { hash: String },
    Address { address: String },
    Token {
        address: String,
        #[serde(default)]
        symbol: Option<String>,
    },
}

/// List endpoints answer either with a bare array or a `{ "items": [...] }` page.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ListResponse<T> {
    Page { items: Vec<T> },
    Bare(Vec<T>),
}

impl<T> ListResponse<T> {
    pub fn into_items(self) -> Vec<T> {
        match self {
            ListResponse::Page { items } | ListResponse::Bare(items) => items,
        }
    }
}

/// Event names pushed by the indexer.
pub mod events {
    pub const NEW_BLOCK: &str = "newBlock";
    pub const NEW_TRANSACTION: &str = "newTransaction";
    pub const NEW_PENDING_TRANSACTION: &str = "newPendingTransaction";
    pub const ADDRESS_UPDATE: &str = "addressUpdate";
    pub const STATS_UPDATE: &str = "statsUpdate";
}

/// Server → client (and client `emit`) frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushEnvelope {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

/// Client → server subscription control frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlMessage {
    Subscribe { event: String },
    Unsubscribe { event: String },
}
