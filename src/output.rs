use crate::scanner::{ScanOutcome, ScanReport};
use crate::types::IssueRecord;
use comfy_table::{Cell, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use csv::Writer;
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Table,
    Json,
    Csv,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "table" => OutputFormat::Table,
            "json" => OutputFormat::Json,
            "csv" => OutputFormat::Csv,
            _ => OutputFormat::Text,
        }
    }
}

pub fn format_report(report: &ScanReport, explorer_tx_url: &str, format: OutputFormat) -> String {
    match &report.outcome {
        ScanOutcome::Found(record) => match format {
            OutputFormat::Text => format_record_text(record, explorer_tx_url),
            OutputFormat::Table => format_record_table(record, explorer_tx_url),
            OutputFormat::Json => format_record_json(record, explorer_tx_url),
            OutputFormat::Csv => format_record_csv(record),
        },
        ScanOutcome::NotFound => format_not_found(report, format),
    }
}

fn tx_link(explorer_tx_url: &str, record: &IssueRecord) -> String {
    format!("{}{:?}", explorer_tx_url, record.transaction_hash)
}

fn format_record_text(record: &IssueRecord, explorer_tx_url: &str) -> String {
    format!(
        "Found Issue event:\n\
         Block Number: {}\n\
         Transaction: {}\n\
         From: {}\n\
         Issue Amount: {}",
        record.block_number,
        tx_link(explorer_tx_url, record),
        record.from_address.to_checksum(None),
        record.amount
    )
}

fn format_record_table(record: &IssueRecord, explorer_tx_url: &str) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec!["Field", "Value"]);

    table.add_row(vec![Cell::new("Block"), Cell::new(record.block_number)]);
    table.add_row(vec![
        Cell::new("Transaction"),
        Cell::new(tx_link(explorer_tx_url, record)),
    ]);
    table.add_row(vec![
        Cell::new("From"),
        Cell::new(record.from_address.to_checksum(None)),
    ]);
    table.add_row(vec![Cell::new("Amount"), Cell::new(record.amount.scaled())]);
    table.add_row(vec![
        Cell::new("Amount (base units)"),
        Cell::new(record.amount.raw.to_string()),
    ]);

    table.to_string()
}

fn format_record_json(record: &IssueRecord, explorer_tx_url: &str) -> String {
    serde_json::to_string_pretty(&json!({
        "found": true,
        "block_number": record.block_number,
        "transaction_hash": format!("{:?}", record.transaction_hash),
        "explorer_url": tx_link(explorer_tx_url, record),
        "from": record.from_address.to_checksum(None),
        "amount": record.amount.scaled(),
        "amount_raw": record.amount.raw.to_string(),
        "decimals": record.amount.decimals,
    }))
    .unwrap_or_else(|_| "{}".to_string())
}

fn format_record_csv(record: &IssueRecord) -> String {
    let mut wtr = Writer::from_writer(vec![]);

    let _ = wtr.write_record([
        "block_number",
        "transaction_hash",
        "from",
        "amount",
        "amount_raw",
    ]);
    let _ = wtr.write_record([
        &record.block_number.to_string(),
        &format!("{:?}", record.transaction_hash),
        &record.from_address.to_checksum(None),
        &record.amount.scaled(),
        &record.amount.raw.to_string(),
    ]);

    String::from_utf8(wtr.into_inner().unwrap_or_default()).unwrap_or_default()
}

fn format_not_found(report: &ScanReport, format: OutputFormat) -> String {
    let window = report.window;
    let stats = report.stats;
    match format {
        OutputFormat::Text | OutputFormat::Table => format!(
            "No matching event found in window (blocks {} to {}, {} batches examined, {} failed)",
            window.start_block, window.end_block, stats.batches_examined, stats.batches_failed
        ),
        OutputFormat::Json => serde_json::to_string_pretty(&json!({
            "found": false,
            "start_block": window.start_block,
            "end_block": window.end_block,
            "batches_examined": stats.batches_examined,
            "batches_failed": stats.batches_failed,
            "entries_skipped": stats.entries_skipped,
        }))
        .unwrap_or_else(|_| "{}".to_string()),
        OutputFormat::Csv => {
            let mut wtr = Writer::from_writer(vec![]);
            let _ = wtr.write_record(["start_block", "end_block", "batches_examined", "batches_failed"]);
            let _ = wtr.write_record([
                &window.start_block.to_string(),
                &window.end_block.to_string(),
                &stats.batches_examined.to_string(),
                &stats.batches_failed.to_string(),
            ]);
            String::from_utf8(wtr.into_inner().unwrap_or_default()).unwrap_or_default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::{ScanStats, ScanWindow};
    use crate::types::TokenAmount;
    use alloy_primitives::{B256, U256, address};

    const EXPLORER: &str = "https://etherscan.io/tx/";

    fn found_report() -> ScanReport {
        ScanReport {
            window: ScanWindow::new(1_000_000, 500_000),
            outcome: ScanOutcome::Found(IssueRecord {
                block_number: 975_000,
                transaction_hash: B256::repeat_byte(0xab),
                from_address: address!("c6cde7c39eb2f0f0095f41570af89efc2c1ea828"),
                amount: TokenAmount::new(U256::from(1_500_000u64), 6),
            }),
            stats: ScanStats {
                batches_examined: 3,
                ..Default::default()
            },
        }
    }

    #[test]
    fn format_parsing_defaults_to_text() {
        assert_eq!(OutputFormat::from("JSON"), OutputFormat::Json);
        assert_eq!(OutputFormat::from("csv"), OutputFormat::Csv);
        assert_eq!(OutputFormat::from("table"), OutputFormat::Table);
        assert_eq!(OutputFormat::from("whatever"), OutputFormat::Text);
    }

    #[test]
    fn text_output_links_transaction() {
        let output = format_report(&found_report(), EXPLORER, OutputFormat::Text);

        assert!(output.contains("Block Number: 975000"));
        assert!(output.contains(&format!("Transaction: {EXPLORER}0xabab")));
        assert!(output.contains("Issue Amount: 1.500000"));
    }

    #[test]
    fn json_output_keeps_raw_amount() {
        let output = format_report(&found_report(), EXPLORER, OutputFormat::Json);
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();

        assert_eq!(value["found"], true);
        assert_eq!(value["block_number"], 975_000);
        assert_eq!(value["amount"], "1.500000");
        assert_eq!(value["amount_raw"], "1500000");
        assert_eq!(value["decimals"], 6);
    }

    #[test]
    fn csv_output_has_header_and_row() {
        let output = format_report(&found_report(), EXPLORER, OutputFormat::Csv);
        let lines: Vec<&str> = output.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("block_number,transaction_hash"));
        assert!(lines[1].starts_with("975000,0xabab"));
    }

    #[test]
    fn not_found_reports_window() {
        let report = ScanReport {
            window: ScanWindow::new(1_000_000, 500_000),
            outcome: ScanOutcome::NotFound,
            stats: ScanStats {
                batches_examined: 50,
                batches_failed: 2,
                ..Default::default()
            },
        };

        let text = format_report(&report, EXPLORER, OutputFormat::Text);
        assert!(text.starts_with("No matching event found in window"));
        assert!(text.contains("blocks 500000 to 1000000"));
        assert!(text.contains("50 batches examined, 2 failed"));

        let json: serde_json::Value =
            serde_json::from_str(&format_report(&report, EXPLORER, OutputFormat::Json)).unwrap();
        assert_eq!(json["found"], false);
        assert_eq!(json["batches_examined"], 50);
    }
}
