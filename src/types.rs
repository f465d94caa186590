use alloy::rpc::types::Log;
use alloy_primitives::utils::format_units;
use alloy_primitives::{Address, B256, Bytes, U256};
use anyhow::{Context, Result};
use std::fmt;

/// A mined log entry matched by a filter query. Pending logs have no block
/// metadata and cannot be represented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub block_number: u64,
    pub block_hash: B256,
    pub transaction_hash: B256,
    pub transaction_index: u64,
    pub data: Bytes,
}

impl TryFrom<&Log> for LogEntry {
    type Error = anyhow::Error;

    fn try_from(log: &Log) -> Result<Self> {
        Ok(LogEntry {
            block_number: log.block_number.context("log is missing block number")?,
            block_hash: log.block_hash.context("log is missing block hash")?,
            transaction_hash: log
                .transaction_hash
                .context("log is missing transaction hash")?,
            transaction_index: log
                .transaction_index
                .context("log is missing transaction index")?,
            data: log.data().data.clone(),
        })
    }
}

/// An unsigned token quantity together with the token's decimal precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenAmount {
    pub raw: U256,
    pub decimals: u8,
}

impl TokenAmount {
    pub fn new(raw: U256, decimals: u8) -> Self {
        Self { raw, decimals }
    }

    /// Interprets `payload` as a big-endian unsigned integer. An empty payload
    /// is zero; anything wider than 256 bits is rejected.
    pub fn from_be_payload(payload: &[u8], decimals: u8) -> Result<Self> {
        let raw = U256::try_from_be_slice(payload).with_context(|| {
            format!(
                "payload of {} bytes does not fit in a uint256",
                payload.len()
            )
        })?;
        Ok(Self::new(raw, decimals))
    }

    /// Exact decimal rendering, `raw / 10^decimals`, with `decimals` fractional digits.
    pub fn scaled(&self) -> String {
        format_units(self.raw, self.decimals).unwrap_or_else(|_| self.raw.to_string())
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.scaled())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueRecord {
    pub block_number: u64,
    pub transaction_hash: B256,
    pub from_address: Address,
    pub amount: TokenAmount,
}
