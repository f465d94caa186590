use crate::types::LogEntry;
use alloy_primitives::{Address, B256};
use anyhow::Result;
use async_trait::async_trait;

/// Inclusive block range filtered by emitting contract and topic 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogQuery {
    pub from_block: u64,
    pub to_block: u64,
    pub address: Address,
    pub topic0: B256,
}

/// Read access to a ledger node. The scanner issues exactly one call at a time
/// and never retries; implementations decide their own transport policy.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    type Transaction: Send + Sync;

    async fn head_height(&self) -> Result<u64>;

    async fn query_logs(&self, query: &LogQuery) -> Result<Vec<LogEntry>>;

    async fn transaction_by_hash(&self, tx_hash: B256) -> Result<Self::Transaction>;

    /// Recovers the account that signed `tx`, which must be included in block
    /// `block_hash` at position `tx_index`.
    async fn resolve_sender(
        &self,
        tx: &Self::Transaction,
        block_hash: B256,
        tx_index: u64,
    ) -> Result<Address>;
}
