//! Typed read endpoints of the upstream indexer.
//!
//! Every call goes through the [`Gateway`] with the request path as key and the
//! path's volatility TTL as cache lifetime, so sealed blocks are fetched once
//! per process and fast-moving listings are re-read every couple of seconds.

use crate::error::FetchError;
use crate::gateway::Gateway;
use crate::types::{
    AddressInfo, BlockSummary, ChainStats, GasPrice, ListResponse, SearchHit, TokenInfo,
    TransactionSummary,
};
use crate::upstream::UpstreamClient;
use crate::volatility::{ttl_for, ResourceClass};
use serde::de::DeserializeOwned;
use std::sync::Arc;

#[derive(Clone)]
pub struct IndexerApi {
    gateway: Gateway,
    upstream: Arc<UpstreamClient>,
}

impl IndexerApi {
    pub fn new(gateway: Gateway, upstream: UpstreamClient) -> Self {
        Self {
            gateway,
            upstream: Arc::new(upstream),
        }
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    pub async fn latest_blocks(&self, limit: usize) -> Result<Vec<BlockSummary>, FetchError> {
        self.list(&format!("/blocks?limit={limit}")).await
    }

    pub async fn block(&self, height: u64) -> Result<BlockSummary, FetchError> {
        self.get(&format!("/blocks/{height}")).await
    }

    pub async fn latest_transactions(
        &self,
        limit: usize,
    ) -> Result<Vec<TransactionSummary>, FetchError> {
        self.list(&format!("/transactions?limit={limit}")).await
    }

    pub async fn pending_transactions(
        &self,
        limit: usize,
    ) -> Result<Vec<TransactionSummary>, FetchError> {
        self.list(&format!("/transactions/pending?limit={limit}"))
            .await
    }

    /// A transaction still pending is only cached for the pending TTL.
    pub async fn transaction(&self, hash: &str) -> Result<TransactionSummary, FetchError> {
        let path = format!("/transactions/{}", urlencoding::encode(hash));
        let tx: TransactionSummary = self.get(&path).await?;
        if tx.is_pending() {
            self.gateway
                .expire_after(&path, ResourceClass::PendingTransactions.ttl());
        }
        Ok(tx)
    }

    pub async fn address(&self, address: &str) -> Result<AddressInfo, FetchError> {
        self.get(&format!("/addresses/{}", urlencoding::encode(address)))
            .await
    }

    pub async fn token(&self, address: &str) -> Result<TokenInfo, FetchError> {
        self.get(&format!("/tokens/{}", urlencoding::encode(address)))
            .await
    }

    pub async fn stats(&self) -> Result<ChainStats, FetchError> {
        self.get("/stats").await
    }

    pub async fn gas_price(&self) -> Result<GasPrice, FetchError> {
        self.get("/stats/gas").await
    }

    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>, FetchError> {
        self.list(&format!("/search?q={}", urlencoding::encode(query)))
            .await
    }

    /// Warm a block detail ahead of navigation.
    pub fn prefetch_block(&self, height: u64) {
        self.prefetch(format!("/blocks/{height}"));
    }

    /// Warm a transaction detail ahead of navigation.
    pub fn prefetch_transaction(&self, hash: &str) {
        self.prefetch(format!("/transactions/{}", urlencoding::encode(hash)));
    }

    fn prefetch(&self, path: String) {
        let upstream = self.upstream.clone();
        let ttl = ttl_for(&path);
        let p = path.clone();
        self.gateway
            .prefetch(path, move || async move { upstream.get(&p).await }, ttl);
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, FetchError> {
        let upstream = self.upstream.clone();
        let owned = path.to_string();
        self.gateway
            .fetch_json(
                path,
                move || async move { upstream.get(&owned).await },
                Some(ttl_for(path)),
            )
            .await
    }

    async fn list<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, FetchError> {
        self.get::<ListResponse<T>>(path)
            .await
            .map(ListResponse::into_items)
    }
}
