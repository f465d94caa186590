use alloy_primitives::Address;
use anyhow::{Context, Result};
use clap::Parser;
use issue_scanner::config::{Config, parse_url_list};
use issue_scanner::output::{OutputFormat, format_report};
use issue_scanner::rpc::RpcClient;
use issue_scanner::scanner::{RangeScanner, ScanParams};
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "issue-scan")]
#[command(about = "Find the most recent token Issue event by scanning backward from the chain head", long_about = None)]
struct Cli {
    /// Output format: text, table, json or csv
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Comma-separated JSON-RPC endpoints
    #[arg(long)]
    rpc_urls: Option<String>,

    #[arg(long)]
    contract: Option<String>,

    /// Canonical event signature used as the topic-0 filter
    #[arg(long)]
    event: Option<String>,

    #[arg(long)]
    lookback: Option<u64>,

    #[arg(long)]
    batch_size: Option<u64>,

    #[arg(long)]
    decimals: Option<u8>,

    #[arg(long)]
    timeout_secs: Option<u64>,
}

impl Cli {
    fn apply(self, mut config: Config) -> Result<Config> {
        if let Some(urls) = self.rpc_urls {
            config.json_rpc_urls = parse_url_list(&urls);
        }
        if let Some(contract) = self.contract {
            config.contract_address = contract
                .parse::<Address>()
                .with_context(|| format!("Invalid contract address: {contract}"))?;
        }
        if let Some(event) = self.event {
            config.event_signature = event;
        }
        if let Some(lookback) = self.lookback {
            config.lookback_blocks = lookback;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(decimals) = self.decimals {
            config.token_decimals = decimals;
        }
        if let Some(secs) = self.timeout_secs {
            config.request_timeout = Duration::from_secs(secs);
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let format = OutputFormat::from(cli.format.as_str());
    let config = cli.apply(Config::from_env()?)?;

    info!("Contract address: {:?}", config.contract_address);
    info!(
        "RPC URLs: {} endpoint(s) configured",
        config.json_rpc_urls.len()
    );

    let params = ScanParams::from(&config);
    info!(
        "{} event hash: {:?}",
        config.event_signature, params.topic0
    );

    let client = RpcClient::new(&config.json_rpc_urls, config.request_timeout)
        .context("Failed to set up RPC client")?;
    let scanner = RangeScanner::new(client, params);

    let report = match scanner.run().await {
        Ok(report) => report,
        Err(e) => {
            error!("Scan aborted: {:#}", e);
            return Err(e);
        }
    };

    println!(
        "{}",
        format_report(&report, &config.explorer_tx_url, format)
    );

    Ok(())
}
