//! Resource volatility classification
//!
//! Maps an indexer request path to how often the data behind it can change,
//! and from there to a cache TTL. Shared by the gateway (client-side cache)
//! and the edge proxy so both layers agree on freshness.
//!
//! ## Table
//!
//! | Path shape | Class | TTL |
//! |---|---|---|
//! | `/blocks/<height or hash>[/...]` | confirmed block | permanent |
//! | `/transactions/<hash>[/...]` | confirmed transaction | permanent |
//! | `/blocks`, `/blocks/latest` | latest blocks | 2s |
//! | `/transactions` | latest transactions | 2s |
//! | `/transactions/pending`, `/pending-transactions` | pending | 1s |
//! | `/stats/gas`, `/gas-price` | gas price | 3s |
//! | `/stats[/...]` | stats | 5s |
//! | `/addresses/...` | address | 10s |
//! | `/search` | search | 30s |
//! | `/tokens/...` | token metadata | 60s |
//! | anything else | default | 10s |
//!
//! Leading `api` / `v1` / `v2` segments are ignored, as is the query string.
//!
//! A transaction detail is only sealed once it has left the mempool. When the
//! body still reports `"status": "pending"` it gets the pending TTL instead
//! (see [`ttl_for_body`]).

use crate::cache::PERMANENT;
use serde::Deserialize;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceClass {
    ConfirmedBlock,
    ConfirmedTransaction,
    LatestBlocks,
    LatestTransactions,
    PendingTransactions,
    GasPrice,
    Stats,
    Address,
    Search,
    Token,
    Other,
}

impl ResourceClass {
    pub fn classify(path: &str) -> Self {
        let segments = segments(path);
        match segments.as_slice() {
            ["blocks"] | ["blocks", "latest"] => ResourceClass::LatestBlocks,
            ["blocks", id, ..] if is_block_id(id) => ResourceClass::ConfirmedBlock,

            ["transactions", "pending", ..] | ["pending-transactions", ..] => {
                ResourceClass::PendingTransactions
            }
            ["transactions"] | ["transactions", "latest"] => ResourceClass::LatestTransactions,
            ["transactions", _hash, ..] => ResourceClass::ConfirmedTransaction,

            ["stats", "gas", ..] | ["gas-price", ..] => ResourceClass::GasPrice,
            ["stats", ..] => ResourceClass::Stats,
            ["addresses", ..] => ResourceClass::Address,
            ["search", ..] => ResourceClass::Search,
            ["tokens", ..] => ResourceClass::Token,
            _ => ResourceClass::Other,
        }
    }

    pub fn ttl(self) -> Duration {
        match self {
            ResourceClass::ConfirmedBlock | ResourceClass::ConfirmedTransaction => PERMANENT,
            ResourceClass::LatestBlocks | ResourceClass::LatestTransactions => {
                Duration::from_secs(2)
            }
            ResourceClass::PendingTransactions => Duration::from_secs(1),
            ResourceClass::GasPrice => Duration::from_secs(3),
            ResourceClass::Stats => Duration::from_secs(5),
            ResourceClass::Address => Duration::from_secs(10),
            ResourceClass::Search => Duration::from_secs(30),
            ResourceClass::Token => Duration::from_secs(60),
            ResourceClass::Other => Duration::from_secs(10),
        }
    }

    /// TTL once the response body is known.
    pub fn ttl_for_body(self, body: &[u8]) -> Duration {
        if self == ResourceClass::ConfirmedTransaction && reports_pending(body) {
            ResourceClass::PendingTransactions.ttl()
        } else {
            self.ttl()
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ResourceClass::ConfirmedBlock => "confirmed-block",
            ResourceClass::ConfirmedTransaction => "confirmed-tx",
            ResourceClass::LatestBlocks => "latest-blocks",
            ResourceClass::LatestTransactions => "latest-txs",
            ResourceClass::PendingTransactions => "pending-txs",
            ResourceClass::GasPrice => "gas-price",
            ResourceClass::Stats => "stats",
            ResourceClass::Address => "address",
            ResourceClass::Search => "search",
            ResourceClass::Token => "token",
            ResourceClass::Other => "default",
        }
    }
}

/// TTL for a request path. Zero means permanent.
pub fn ttl_for(path: &str) -> Duration {
    ResourceClass::classify(path).ttl()
}

/// TTL for a response to `path` whose body is `body`.
pub fn ttl_for_body(path: &str, body: &[u8]) -> Duration {
    ResourceClass::classify(path).ttl_for_body(body)
}

#[derive(Deserialize)]
struct StatusOnly {
    #[serde(default)]
    status: Option<String>,
}

fn reports_pending(body: &[u8]) -> bool {
    serde_json::from_slice::<StatusOnly>(body)
        .ok()
        .and_then(|b| b.status)
        .is_some_and(|s| s.eq_ignore_ascii_case("pending"))
}

fn segments(path: &str) -> Vec<&str> {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let mut segs: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    while matches!(segs.first(), Some(&"api") | Some(&"v1") | Some(&"v2")) {
        segs.remove(0);
    }
    segs
}

/// Block heights and hashes are sealed; anything else under `/blocks/` is a listing.
fn is_block_id(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_digit())
        || (s.len() > 2 && s.starts_with("0x") && s[2..].bytes().all(|b| b.is_ascii_hexdigit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirmed_resources_are_permanent() {
        assert_eq!(ttl_for("/blocks/100"), PERMANENT);
        assert_eq!(ttl_for("/api/v2/blocks/0xabc123"), PERMANENT);
        assert_eq!(ttl_for("/blocks/100/transactions?page=2"), PERMANENT);
        assert_eq!(ttl_for("/transactions/0xdeadbeef"), PERMANENT);
        assert_eq!(ttl_for("/transactions/0xdeadbeef/logs"), PERMANENT);
    }

    #[test]
    fn test_fast_changing_resources_are_short() {
        let fast = [
            "/blocks",
            "/blocks?page=1",
            "/blocks/latest",
            "/transactions",
            "/transactions/pending",
            "/pending-transactions",
            "/stats/gas",
            "/gas-price",
        ];
        for path in fast {
            let ttl = ttl_for(path);
            assert!(
                !ttl.is_zero() && ttl < Duration::from_secs(5),
                "{path} got {ttl:?}"
            );
        }
        assert_eq!(ttl_for("/stats"), Duration::from_secs(5));
        assert_eq!(
            ResourceClass::classify("/transactions/pending"),
            ResourceClass::PendingTransactions
        );
        assert_eq!(ttl_for("/transactions/pending"), Duration::from_secs(1));
    }

    #[test]
    fn test_classification_table() {
        assert_eq!(ttl_for("/addresses/0x1234"), Duration::from_secs(10));
        assert_eq!(ttl_for("/search?q=vitalik"), Duration::from_secs(30));
        assert_eq!(ttl_for("/tokens/0xa0b8"), Duration::from_secs(60));
        assert_eq!(ttl_for("/validators"), Duration::from_secs(10));
        assert_eq!(ResourceClass::classify("/").label(), "default");
    }

    #[test]
    fn test_pending_transaction_detail_is_not_sealed() {
        let path = "/transactions/0xdeadbeef";
        assert_eq!(
            ttl_for_body(path, br#"{"hash":"0xdeadbeef","status":"pending"}"#),
            Duration::from_secs(1)
        );
        assert_eq!(
            ttl_for_body(path, br#"{"hash":"0xdeadbeef","status":"success"}"#),
            PERMANENT
        );
        assert_eq!(ttl_for_body(path, b"not json"), PERMANENT);
        // only transaction details are re-classified
        assert_eq!(
            ttl_for_body("/addresses/0x1", br#"{"status":"pending"}"#),
            Duration::from_secs(10)
        );
    }

    #[test]
    fn test_blocks_listing_is_not_confirmed() {
        assert_eq!(
            ResourceClass::classify("/blocks/recent"),
            ResourceClass::Other
        );
        assert_eq!(
            ResourceClass::classify("/blocks/latest"),
            ResourceClass::LatestBlocks
        );
    }
}
