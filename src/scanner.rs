use crate::config::Config;
use crate::decoder::EventRecordDecoder;
use crate::events::event_signature_hash;
use crate::ledger::{LedgerClient, LogQuery};
use crate::types::IssueRecord;
use alloy_primitives::{Address, B256};
use anyhow::{Context, Result};
use std::time::Instant;
use tracing::{info, warn};

/// Blocks `[start_block, end_block]`, fixed once from the head at scan start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanWindow {
    pub start_block: u64,
    pub end_block: u64,
}

impl ScanWindow {
    /// Looks back `lookback_blocks` from `head`, clamped at genesis.
    pub fn new(head: u64, lookback_blocks: u64) -> Self {
        Self {
            start_block: head.saturating_sub(lookback_blocks),
            end_block: head,
        }
    }

    pub fn batches(&self, batch_size: u64) -> BatchPlan {
        BatchPlan {
            cursor: self.end_block,
            start_block: self.start_block,
            batch_size: batch_size.max(1),
            first: true,
        }
    }
}

/// Inclusive block range sent as a single log query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Batch {
    pub from_block: u64,
    pub to_block: u64,
}

impl Batch {
    /// Saturates at `u64::MAX` for the full `0..=u64::MAX` range.
    pub fn block_count(&self) -> u64 {
        (self.to_block - self.from_block).saturating_add(1)
    }
}

/// Newest-first partition of a window into batches.
///
/// The first batch is `[max(head - size, start), head]`. Each later batch ends
/// one block below the previous `from_block`, so batches never overlap and
/// leave no gaps. Iteration ends once the cursor reaches `start_block`, which
/// means block 0 is never queried when the head itself is 0.
#[derive(Debug, Clone)]
pub struct BatchPlan {
    cursor: u64,
    start_block: u64,
    batch_size: u64,
    first: bool,
}

impl Iterator for BatchPlan {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        if self.cursor <= self.start_block {
            return None;
        }

        let from_block = self
            .cursor
            .saturating_sub(self.batch_size)
            .max(self.start_block);
        let to_block = if self.first {
            self.cursor
        } else {
            self.cursor - 1
        };

        self.cursor = from_block;
        self.first = false;
        Some(Batch {
            from_block,
            to_block,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanParams {
    pub contract_address: Address,
    pub topic0: B256,
    pub lookback_blocks: u64,
    pub batch_size: u64,
    pub token_decimals: u8,
}

impl From<&Config> for ScanParams {
    fn from(config: &Config) -> Self {
        ScanParams {
            contract_address: config.contract_address,
            topic0: event_signature_hash(&config.event_signature),
            lookback_blocks: config.lookback_blocks,
            batch_size: config.batch_size,
            token_decimals: config.token_decimals,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Found(IssueRecord),
    NotFound,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub batches_examined: u64,
    pub batches_failed: u64,
    pub logs_matched: u64,
    pub entries_skipped: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub window: ScanWindow,
    pub outcome: ScanOutcome,
    pub stats: ScanStats,
}

pub struct RangeScanner<C> {
    client: C,
    params: ScanParams,
}

impl<C: LedgerClient> RangeScanner<C> {
    pub fn new(client: C, params: ScanParams) -> Self {
        RangeScanner { client, params }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Fetches the chain head and scans backward from it. Only a failed head
    /// lookup is an error.
    pub async fn run(&self) -> Result<ScanReport> {
        let head = self
            .client
            .head_height()
            .await
            .context("Failed to fetch chain head")?;
        info!("Latest block: {}", head);

        Ok(self.scan_from(head).await)
    }

    /// Scans batches newest-first and stops at the first decoded record.
    ///
    /// A failed log query skips its batch for good; a failed entry skips only
    /// that entry.
    pub async fn scan_from(&self, head: u64) -> ScanReport {
        let window = ScanWindow::new(head, self.params.lookback_blocks);
        let decoder = EventRecordDecoder::new(&self.client, self.params.token_decimals);
        let mut stats = ScanStats::default();
        let started = Instant::now();

        info!(
            "Scanning blocks {} to {} in batches of {}",
            window.start_block, window.end_block, self.params.batch_size
        );

        let mut outcome = ScanOutcome::NotFound;
        'batches: for batch in window.batches(self.params.batch_size) {
            stats.batches_examined += 1;

            let query = LogQuery {
                from_block: batch.from_block,
                to_block: batch.to_block,
                address: self.params.contract_address,
                topic0: self.params.topic0,
            };

            let entries = match self.client.query_logs(&query).await {
                Ok(entries) => entries,
                Err(e) => {
                    stats.batches_failed += 1;
                    warn!(
                        "Error querying blocks {} to {}: {:#}",
                        batch.from_block, batch.to_block, e
                    );
                    continue;
                }
            };

            info!(
                "Searched blocks {} to {}: {} matching logs",
                batch.from_block,
                batch.to_block,
                entries.len()
            );
            stats.logs_matched += entries.len() as u64;

            for entry in &entries {
                match decoder.decode(entry).await {
                    Some(record) => {
                        outcome = ScanOutcome::Found(record);
                        break 'batches;
                    }
                    None => stats.entries_skipped += 1,
                }
            }
        }

        info!(
            "Scan finished in {:?}: {} batches examined, {} failed, {} entries skipped",
            started.elapsed(),
            stats.batches_examined,
            stats.batches_failed,
            stats.entries_skipped
        );

        ScanReport {
            window,
            outcome,
            stats,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_utils::{MockLedger, entry_with_payload};
    use super::*;
    use crate::events::Issue;
    use alloy::sol_types::SolEvent;
    use alloy_primitives::{U256, address};

    const USDT: Address = address!("dAC17F958D2ee523a2206206994597C13D831ec7");

    fn params(lookback_blocks: u64, batch_size: u64) -> ScanParams {
        ScanParams {
            contract_address: USDT,
            topic0: Issue::SIGNATURE_HASH,
            lookback_blocks,
            batch_size,
            token_decimals: 6,
        }
    }

    fn issue(block: u64, tx_index: u64, amount: u64) -> crate::types::LogEntry {
        entry_with_payload(block, tx_index, &U256::from(amount).to_be_bytes::<32>())
    }

    #[test]
    fn window_clamps_at_genesis() {
        assert_eq!(ScanWindow::new(1_000_000, 500_000).start_block, 500_000);
        assert_eq!(ScanWindow::new(100, 100).start_block, 0);
        assert_eq!(ScanWindow::new(100, 5_000).start_block, 0);
        assert_eq!(ScanWindow::new(0, 10).start_block, 0);
        assert_eq!(ScanWindow::new(u64::MAX, 1).start_block, u64::MAX - 1);
    }

    #[test]
    fn batches_cover_window_without_overlap() {
        for (head, lookback, size) in [
            (1_000_000, 500_000, 10_000),
            (25, 100, 10),
            (1_003, 1_000, 7),
            (10, 10, 1),
            (50, 3, 100),
        ] {
            let window = ScanWindow::new(head, lookback);
            let batches: Vec<Batch> = window.batches(size).collect();

            assert_eq!(batches.first().unwrap().to_block, head);
            assert_eq!(batches.last().unwrap().from_block, window.start_block);
            assert_eq!(
                batches
                    .iter()
                    .filter(|b| b.from_block == window.start_block)
                    .count(),
                1
            );
            for batch in &batches {
                assert!(batch.from_block <= batch.to_block);
                assert!(batch.to_block - batch.from_block <= size);
            }
            for pair in batches.windows(2) {
                assert!(pair[1].to_block < pair[0].to_block);
                assert_eq!(pair[1].to_block + 1, pair[0].from_block);
            }
            let covered: u64 = batches.iter().map(Batch::block_count).sum();
            assert_eq!(covered, head - window.start_block + 1);
        }
    }

    #[test]
    fn empty_window_has_no_batches() {
        assert_eq!(ScanWindow::new(0, 100).batches(10).count(), 0);
        assert_eq!(ScanWindow::new(500, 0).batches(10).count(), 0);
    }

    #[test]
    fn full_u64_range_counts_without_overflow() {
        let batches: Vec<Batch> = ScanWindow::new(u64::MAX, u64::MAX)
            .batches(u64::MAX)
            .collect();

        assert_eq!(batches, vec![Batch { from_block: 0, to_block: u64::MAX }]);
        assert_eq!(batches[0].block_count(), u64::MAX);
    }

    #[test]
    fn zero_batch_size_is_treated_as_one() {
        let batches: Vec<Batch> = ScanWindow::new(3, 3).batches(0).collect();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0], Batch { from_block: 2, to_block: 3 });
        assert_eq!(batches[2], Batch { from_block: 0, to_block: 0 });
    }

    #[tokio::test]
    async fn full_window_without_match_issues_fifty_queries() {
        let ledger = MockLedger::new(1_000_000).with_log(issue(400_000, 0, 5));
        let scanner = RangeScanner::new(ledger, params(500_000, 10_000));

        let report = scanner.run().await.unwrap();

        assert_eq!(report.outcome, ScanOutcome::NotFound);
        assert_eq!(report.window.start_block, 500_000);
        assert_eq!(report.stats.batches_examined, 50);

        let calls = scanner.client().calls();
        assert_eq!(calls.head_lookups, 1);
        assert_eq!(calls.log_queries.len(), 50);
        assert_eq!(calls.tx_lookups, 0);
        assert_eq!(calls.sender_lookups, 0);

        let first = calls.log_queries.first().unwrap();
        assert_eq!((first.from_block, first.to_block), (990_000, 1_000_000));
        let last = calls.log_queries.last().unwrap();
        assert_eq!((last.from_block, last.to_block), (500_000, 509_999));
        assert!(
            calls
                .log_queries
                .iter()
                .all(|q| q.address == USDT && q.topic0 == Issue::SIGNATURE_HASH)
        );
    }

    #[tokio::test]
    async fn match_in_third_batch_stops_scan() {
        let ledger = MockLedger::new(1_000_000)
            .with_log(issue(975_000, 3, 2_500_000))
            .with_log(issue(960_000, 0, 1));
        let scanner = RangeScanner::new(ledger, params(500_000, 10_000));

        let report = scanner.run().await.unwrap();

        let ScanOutcome::Found(record) = report.outcome else {
            panic!("expected a match");
        };
        assert_eq!(record.block_number, 975_000);
        assert_eq!(record.amount.scaled(), "2.500000");
        assert_eq!(report.stats.batches_examined, 3);
        assert_eq!(scanner.client().calls().log_queries.len(), 3);
    }

    #[tokio::test]
    async fn failed_batch_is_skipped_not_fatal() {
        let ledger = MockLedger::new(1_000_000)
            .fail_batch_containing(995_000)
            .with_log(issue(995_000, 0, 9))
            .with_log(issue(985_000, 0, 1_000_000));
        let scanner = RangeScanner::new(ledger, params(500_000, 10_000));

        let report = scanner.run().await.unwrap();

        let ScanOutcome::Found(record) = report.outcome else {
            panic!("expected a match");
        };
        assert_eq!(record.block_number, 985_000);
        assert_eq!(report.stats.batches_failed, 1);

        // The failed batch is never re-queried.
        let calls = scanner.client().calls();
        assert_eq!(calls.log_queries.len(), 2);
        assert_ne!(calls.log_queries[0], calls.log_queries[1]);
    }

    #[tokio::test]
    async fn failed_transaction_lookup_moves_to_next_entry() {
        let skipped = issue(975_000, 0, 1);
        let ledger = MockLedger::new(1_000_000)
            .fail_tx_lookup(skipped.transaction_hash)
            .with_log(skipped)
            .with_log(issue(975_001, 0, 7_000_000));
        let scanner = RangeScanner::new(ledger, params(500_000, 10_000));

        let report = scanner.run().await.unwrap();

        let ScanOutcome::Found(record) = report.outcome else {
            panic!("expected a match");
        };
        assert_eq!(record.block_number, 975_001);
        assert_eq!(report.stats.entries_skipped, 1);
        assert_eq!(report.stats.logs_matched, 2);
        assert_eq!(scanner.client().calls().tx_lookups, 2);
    }

    #[tokio::test]
    async fn failed_sender_resolution_moves_to_next_batch() {
        let skipped = issue(999_000, 0, 1);
        let ledger = MockLedger::new(1_000_000)
            .fail_sender(skipped.transaction_hash)
            .with_log(skipped)
            .with_log(issue(981_000, 2, 3));
        let scanner = RangeScanner::new(ledger, params(500_000, 10_000));

        let report = scanner.run().await.unwrap();

        let ScanOutcome::Found(record) = report.outcome else {
            panic!("expected a match");
        };
        assert_eq!(record.block_number, 981_000);
        assert_eq!(
            record.from_address,
            MockLedger::sender_of(record.transaction_hash)
        );
        assert_eq!(report.stats.entries_skipped, 1);
        assert_eq!(scanner.client().calls().log_queries.len(), 2);
    }

    #[tokio::test]
    async fn repeated_scans_return_same_match() {
        let ledger = MockLedger::new(2_000)
            .with_log(issue(1_500, 1, 10))
            .with_log(issue(1_500, 0, 20))
            .with_log(issue(1_200, 0, 30));
        let scanner = RangeScanner::new(ledger, params(1_000, 100));

        let first = scanner.scan_from(2_000).await;
        let second = scanner.scan_from(2_000).await;

        assert_eq!(first, second);
        let ScanOutcome::Found(record) = first.outcome else {
            panic!("expected a match");
        };
        assert_eq!(record.amount.raw, U256::from(20u64));
    }

    #[tokio::test]
    async fn lookback_past_genesis_scans_whole_chain() {
        let ledger = MockLedger::new(25).with_log(issue(0, 0, 1));
        let scanner = RangeScanner::new(ledger, params(100, 10));

        let report = scanner.run().await.unwrap();

        assert_eq!(report.window.start_block, 0);
        assert!(matches!(report.outcome, ScanOutcome::Found(ref r) if r.block_number == 0));
        assert_eq!(report.stats.batches_examined, 3);
    }

    #[tokio::test]
    async fn head_lookup_failure_is_fatal() {
        let scanner = RangeScanner::new(MockLedger::unreachable_head(), params(500_000, 10_000));

        let err = scanner.run().await.unwrap_err();

        assert!(err.to_string().contains("chain head"));
        assert!(scanner.client().calls().log_queries.is_empty());
    }

    #[test]
    fn params_derive_topic_from_configured_signature() {
        let config = Config::default();
        let params = ScanParams::from(&config);

        assert_eq!(params.topic0, Issue::SIGNATURE_HASH);
        assert_eq!(params.contract_address, USDT);
        assert_eq!(params.batch_size, 10_000);
    }
}
