use crate::ledger::{LedgerClient, LogQuery};
use crate::types::LogEntry;
use alloy::consensus::transaction::SignerRecoverable;
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::{Filter, Transaction};
use alloy_primitives::{Address, B256};
use anyhow::Result;
use async_trait::async_trait;
use std::fmt::Display;
use std::future::IntoFuture;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::timeout;
use tokio_retry::Retry;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{debug, warn};

/// JSON-RPC ledger client over one or more HTTP endpoints.
///
/// Failing endpoints are rotated out round-robin. Only the head lookup is
/// retried; every other request is a single attempt bounded by the timeout.
#[derive(Clone)]
pub struct RpcClient {
    providers: Vec<DynProvider>,
    urls: Vec<String>,
    current_provider: Arc<AtomicUsize>,
    request_timeout: Duration,
    max_retries: usize,
}

impl RpcClient {
    pub fn new(rpc_urls: &[String], request_timeout: Duration) -> Result<Self> {
        if rpc_urls.is_empty() {
            return Err(anyhow::anyhow!("At least one RPC URL must be provided"));
        }

        let mut providers = Vec::with_capacity(rpc_urls.len());
        for url in rpc_urls {
            let parsed_url = url
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid RPC URL: {}", url))?;
            providers.push(ProviderBuilder::new().connect_http(parsed_url).erased());
        }

        Ok(RpcClient {
            providers,
            urls: rpc_urls.to_vec(),
            current_provider: Arc::new(AtomicUsize::new(0)),
            request_timeout,
            max_retries: 5,
        })
    }

    fn get_provider(&self) -> &DynProvider {
        let index = self.current_provider.load(Ordering::Relaxed) % self.providers.len();
        &self.providers[index]
    }

    fn get_current_url(&self) -> &str {
        let index = self.current_provider.load(Ordering::Relaxed) % self.urls.len();
        &self.urls[index]
    }

    fn rotate_provider(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.providers.len();
        self.current_provider.store(next, Ordering::Relaxed);

        if self.providers.len() > 1 {
            debug!("Rotating to RPC provider #{}", next);
        }
    }

    fn get_retry_strategy(&self) -> impl Iterator<Item = Duration> {
        ExponentialBackoff::from_millis(100)
            .factor(2)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.max_retries)
    }

    fn handle_error(&self, error_str: &str) {
        warn!(
            "RPC error on {}: {}, rotating provider",
            self.get_current_url(),
            error_str
        );
        self.rotate_provider();
    }

    fn handle_timeout(&self) -> anyhow::Error {
        warn!(
            "Request timeout after {} seconds on {}, rotating provider",
            self.request_timeout.as_secs(),
            self.get_current_url()
        );
        self.rotate_provider();
        anyhow::anyhow!(
            "Request timeout after {} seconds",
            self.request_timeout.as_secs()
        )
    }

    /// Runs one request against the current provider, rotating on failure.
    async fn call_once<T, E, F>(&self, request: F) -> Result<T>
    where
        F: IntoFuture<Output = Result<T, E>>,
        E: Display,
    {
        match timeout(self.request_timeout, request).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                let error_str = e.to_string();
                self.handle_error(&error_str);
                Err(anyhow::anyhow!("{}", error_str))
            }
            Err(_) => Err(self.handle_timeout()),
        }
    }

    pub async fn get_latest_block(&self) -> Result<u64> {
        let client = self.clone();
        Retry::spawn(self.get_retry_strategy(), move || {
            let client = client.clone();
            async move {
                client
                    .call_once(client.get_provider().get_block_number())
                    .await
            }
        })
        .await
    }
}

#[async_trait]
impl LedgerClient for RpcClient {
    type Transaction = Transaction;

    async fn head_height(&self) -> Result<u64> {
        self.get_latest_block().await
    }

    async fn query_logs(&self, query: &LogQuery) -> Result<Vec<LogEntry>> {
        let filter = Filter::new()
            .address(query.address)
            .event_signature(query.topic0)
            .from_block(query.from_block)
            .to_block(query.to_block);

        let logs = self.call_once(self.get_provider().get_logs(&filter)).await?;

        let entries = logs
            .iter()
            .filter_map(|log| match LogEntry::try_from(log) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(
                        "Dropping log from blocks {}-{}: {}",
                        query.from_block, query.to_block, e
                    );
                    None
                }
            })
            .collect();
        Ok(entries)
    }

    async fn transaction_by_hash(&self, tx_hash: B256) -> Result<Transaction> {
        self.call_once(self.get_provider().get_transaction_by_hash(tx_hash))
            .await?
            .ok_or_else(|| anyhow::anyhow!("Transaction {:?} not found", tx_hash))
    }

    async fn resolve_sender(
        &self,
        tx: &Transaction,
        block_hash: B256,
        tx_index: u64,
    ) -> Result<Address> {
        if tx.block_hash != Some(block_hash) || tx.transaction_index != Some(tx_index) {
            anyhow::bail!(
                "Transaction is not included at block {:?} index {} (node reports {:?} index {:?})",
                block_hash,
                tx_index,
                tx.block_hash,
                tx.transaction_index
            );
        }

        tx.inner
            .inner()
            .recover_signer()
            .map_err(|e| anyhow::anyhow!("Failed to recover transaction signer: {}", e))
    }
}
