use alloy_primitives::Address;
use anyhow::{Context, Result};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_RPC_URL: &str = "https://rpc.ankr.com/eth";
pub const DEFAULT_CONTRACT_ADDRESS: &str = "0xdAC17F958D2ee523a2206206994597C13D831ec7"; // USDT
pub const DEFAULT_EVENT_SIGNATURE: &str = "Issue(uint256)";
pub const DEFAULT_LOOKBACK_BLOCKS: u64 = 500_000;
pub const DEFAULT_BATCH_SIZE: u64 = 10_000; // Upper bound most public providers accept per eth_getLogs
pub const DEFAULT_TOKEN_DECIMALS: u8 = 6;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_EXPLORER_TX_URL: &str = "https://etherscan.io/tx/";

/// 10^77 is the largest power of ten that fits in a U256.
pub const MAX_TOKEN_DECIMALS: u8 = 77;

#[derive(Debug, Clone)]
pub struct Config {
    pub json_rpc_urls: Vec<String>,
    pub contract_address: Address,
    pub event_signature: String,
    pub lookback_blocks: u64,
    pub batch_size: u64,
    pub token_decimals: u8,
    pub request_timeout: Duration,
    pub explorer_tx_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            json_rpc_urls: vec![DEFAULT_RPC_URL.to_string()],
            contract_address: Address::from_str(DEFAULT_CONTRACT_ADDRESS).unwrap_or_default(),
            event_signature: DEFAULT_EVENT_SIGNATURE.to_string(),
            lookback_blocks: DEFAULT_LOOKBACK_BLOCKS,
            batch_size: DEFAULT_BATCH_SIZE,
            token_decimals: DEFAULT_TOKEN_DECIMALS,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            explorer_tx_url: DEFAULT_EXPLORER_TX_URL.to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup, falling back to defaults for missing keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let json_rpc_urls = match lookup("JSON_RPC_URLS").or_else(|| lookup("JSON_RPC_URL")) {
            Some(raw) => parse_url_list(&raw),
            None => defaults.json_rpc_urls,
        };

        let contract_address = match lookup("CONTRACT_ADDRESS") {
            Some(raw) => Address::from_str(raw.trim())
                .with_context(|| format!("Invalid CONTRACT_ADDRESS format: {raw}"))?,
            None => Address::from_str(DEFAULT_CONTRACT_ADDRESS)
                .context("Invalid built-in contract address")?,
        };

        let event_signature = lookup("EVENT_SIGNATURE").unwrap_or(defaults.event_signature);

        let lookback_blocks = parse_or("LOOKBACK_BLOCKS", &lookup, defaults.lookback_blocks)?;
        let batch_size = parse_or("BATCH_SIZE", &lookup, defaults.batch_size)?;
        let token_decimals = parse_or("TOKEN_DECIMALS", &lookup, defaults.token_decimals)?;
        let timeout_secs = parse_or("REQUEST_TIMEOUT_SECS", &lookup, DEFAULT_REQUEST_TIMEOUT_SECS)?;

        let explorer_tx_url = lookup("EXPLORER_TX_URL").unwrap_or(defaults.explorer_tx_url);

        let config = Config {
            json_rpc_urls,
            contract_address,
            event_signature,
            lookback_blocks,
            batch_size,
            token_decimals,
            request_timeout: Duration::from_secs(timeout_secs),
            explorer_tx_url,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.json_rpc_urls.is_empty() {
            anyhow::bail!("At least one RPC URL must be configured");
        }
        if self.batch_size == 0 {
            anyhow::bail!("BATCH_SIZE must be at least 1");
        }
        if self.token_decimals > MAX_TOKEN_DECIMALS {
            anyhow::bail!(
                "TOKEN_DECIMALS must be at most {}, got {}",
                MAX_TOKEN_DECIMALS,
                self.token_decimals
            );
        }
        if self.event_signature.trim().is_empty() {
            anyhow::bail!("EVENT_SIGNATURE must not be empty");
        }
        Ok(())
    }
}

pub fn parse_url_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_or<T, F>(key: &str, lookup: &F, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {key} value: {raw}")),
        None => Ok(default),
    }
}
