use crate::ledger::LedgerClient;
use crate::types::{IssueRecord, LogEntry, TokenAmount};
use anyhow::{Context, Result};
use tracing::{debug, warn};

/// Turns a matched log into an `IssueRecord` by scaling its payload and
/// resolving who sent the enclosing transaction.
pub struct EventRecordDecoder<'a, C> {
    client: &'a C,
    token_decimals: u8,
}

impl<'a, C: LedgerClient> EventRecordDecoder<'a, C> {
    pub fn new(client: &'a C, token_decimals: u8) -> Self {
        Self {
            client,
            token_decimals,
        }
    }

    /// Returns `None` when any step fails; the failure is logged and never propagated.
    ///
    /// A payload wider than 256 bits is the only skip decided before any RPC call.
    pub async fn decode(&self, entry: &LogEntry) -> Option<IssueRecord> {
        match self.try_decode(entry).await {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(
                    "Skipping log in block {} (tx {:?}): {:#}",
                    entry.block_number, entry.transaction_hash, e
                );
                None
            }
        }
    }

    async fn try_decode(&self, entry: &LogEntry) -> Result<IssueRecord> {
        let amount = TokenAmount::from_be_payload(&entry.data, self.token_decimals)?;
        debug!("Decoded amount {} in block {}", amount, entry.block_number);

        let tx = self
            .client
            .transaction_by_hash(entry.transaction_hash)
            .await
            .context("transaction lookup failed")?;

        let from_address = self
            .client
            .resolve_sender(&tx, entry.block_hash, entry.transaction_index)
            .await
            .context("sender resolution failed")?;

        Ok(IssueRecord {
            block_number: entry.block_number,
            transaction_hash: entry.transaction_hash,
            from_address,
            amount,
        })
    }
}
