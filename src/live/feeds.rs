//! Concrete feed sources over the indexer API.

use super::FeedSource;
use crate::api::IndexerApi;
use crate::error::FetchError;
use crate::types::{events, BlockSummary, ChainStats, TransactionSummary};
use async_trait::async_trait;

/// Latest blocks, newest first.
pub struct BlocksFeed {
    api: IndexerApi,
    limit: usize,
}

impl BlocksFeed {
    pub fn new(api: IndexerApi, limit: usize) -> Self {
        Self { api, limit }
    }
}

#[async_trait]
impl FeedSource for BlocksFeed {
    type Item = BlockSummary;

    fn name(&self) -> &'static str {
        "blocks"
    }

    fn event(&self) -> &'static str {
        events::NEW_BLOCK
    }

    async fn load(&self) -> Result<Vec<BlockSummary>, FetchError> {
        self.api.latest_blocks(self.limit).await
    }
}

pub struct TransactionsFeed {
    api: IndexerApi,
    limit: usize,
}

impl TransactionsFeed {
    pub fn new(api: IndexerApi, limit: usize) -> Self {
        Self { api, limit }
    }
}

#[async_trait]
impl FeedSource for TransactionsFeed {
    type Item = TransactionSummary;

    fn name(&self) -> &'static str {
        "transactions"
    }

    fn event(&self) -> &'static str {
        events::NEW_TRANSACTION
    }

    async fn load(&self) -> Result<Vec<TransactionSummary>, FetchError> {
        self.api.latest_transactions(self.limit).await
    }
}

pub struct PendingTransactionsFeed {
    api: IndexerApi,
    limit: usize,
}

impl PendingTransactionsFeed {
    pub fn new(api: IndexerApi, limit: usize) -> Self {
        Self { api, limit }
    }
}

#[async_trait]
impl FeedSource for PendingTransactionsFeed {
    type Item = TransactionSummary;

    fn name(&self) -> &'static str {
        "pending"
    }

    fn event(&self) -> &'static str {
        events::NEW_PENDING_TRANSACTION
    }

    async fn load(&self) -> Result<Vec<TransactionSummary>, FetchError> {
        self.api.pending_transactions(self.limit).await
    }
}

/// Chain statistics. Run it with a capacity of 1 to keep only the latest
/// figures.
pub struct StatsFeed {
    api: IndexerApi,
}

impl StatsFeed {
    pub fn new(api: IndexerApi) -> Self {
        Self { api }
    }
}

#[async_trait]
impl FeedSource for StatsFeed {
    type Item = ChainStats;

    fn name(&self) -> &'static str {
        "stats"
    }

    fn event(&self) -> &'static str {
        events::STATS_UPDATE
    }

    async fn load(&self) -> Result<Vec<ChainStats>, FetchError> {
        self.api.stats().await.map(|stats| vec![stats])
    }
}
