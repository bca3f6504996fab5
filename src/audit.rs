//! JSONL audit trail logging.
//!
//! Each run appends events to an audit.jsonl file, one JSON object per
//! line. Native token amounts are logged as decimal strings; JSON numbers
//! cannot hold 18-decimal balances without precision loss.

use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::gateway::UserAccountData;
use crate::plan::{Holding, SizedSwap};

/// An audit event written to the JSONL trail.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub event: &'static str,
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub data: serde_json::Value,
}

/// Append-only audit logger.
pub struct AuditLog {
    writer: BufWriter<std::fs::File>,
}

impl AuditLog {
    /// Open (or create) the audit log file for appending.
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    /// Log an event with arbitrary JSON data.
    pub fn log(&mut self, event: &'static str, data: serde_json::Value) -> Result<()> {
        let entry = AuditEvent {
            event,
            ts: Utc::now(),
            data,
        };
        let json = serde_json::to_string(&entry)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        writeln!(self.writer, "{json}")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Log a simple event with no additional data.
    pub fn log_simple(&mut self, event: &'static str) -> Result<()> {
        self.log(event, serde_json::json!({}))
    }
}

/// Convenience: log a run start event.
pub fn log_run_started(audit: &mut AuditLog, allocation_file: &str, account: &str) -> Result<()> {
    audit.log(
        "run_started",
        serde_json::json!({
            "allocation_file": allocation_file,
            "account": account,
        }),
    )
}

/// Convenience: log fetched holdings.
pub fn log_holdings(audit: &mut AuditLog, holdings: &[Holding], total_value: f64) -> Result<()> {
    let holding_data: Vec<_> = holdings
        .iter()
        .map(|h| {
            serde_json::json!({
                "symbol": h.symbol,
                "balance": h.balance,
                "price_usd": h.price_usd,
                "value_usd": h.value_usd(),
            })
        })
        .collect();

    audit.log(
        "holdings_fetched",
        serde_json::json!({
            "holdings": holding_data,
            "total_value_usd": total_value,
        }),
    )
}

/// Convenience: log the computed swap plan.
pub fn log_plan(audit: &mut AuditLog, legs: &[SizedSwap]) -> Result<()> {
    let leg_data: Vec<_> = legs
        .iter()
        .map(|leg| {
            serde_json::json!({
                "sell": leg.sell,
                "buy": leg.buy,
                "value_usd": leg.value_usd,
                "amount_in": leg.amount_in.to_string(),
                "min_out": leg.min_out.to_string(),
            })
        })
        .collect();

    audit.log("plan_computed", serde_json::json!({ "legs": leg_data }))
}

/// Convenience: log risk check results.
pub fn log_risk_check(audit: &mut AuditLog, report: &crate::risk::RiskReport) -> Result<()> {
    let check_data: Vec<_> = report
        .checks
        .iter()
        .map(|c| {
            serde_json::json!({
                "name": c.name,
                "status": format!("{}", c.status),
                "detail": c.detail,
            })
        })
        .collect();

    audit.log(
        "risk_check",
        serde_json::json!({
            "passed": !report.has_failures(),
            "checks": check_data,
        }),
    )
}

/// Convenience: log a pool withdrawal.
pub fn log_withdrawal(audit: &mut AuditLog, symbol: &str, amount: u128) -> Result<()> {
    audit.log(
        "collateral_withdrawn",
        serde_json::json!({
            "symbol": symbol,
            "amount": amount.to_string(),
        }),
    )
}

/// Convenience: log an executed swap.
pub fn log_swap_executed(audit: &mut AuditLog, leg: &SizedSwap, amount_out: u128) -> Result<()> {
    audit.log(
        "swap_executed",
        serde_json::json!({
            "sell": leg.sell,
            "buy": leg.buy,
            "amount_in": leg.amount_in.to_string(),
            "min_out": leg.min_out.to_string(),
            "amount_out": amount_out.to_string(),
        }),
    )
}

/// Convenience: log run completion.
pub fn log_run_completed(audit: &mut AuditLog, legs_executed: usize) -> Result<()> {
    audit.log(
        "run_completed",
        serde_json::json!({ "legs_executed": legs_executed }),
    )
}

/// Convenience: log an asset supplied to the pool.
pub fn log_asset_supplied(audit: &mut AuditLog, symbol: &str, amount: u128) -> Result<()> {
    audit.log(
        "asset_supplied",
        serde_json::json!({
            "symbol": symbol,
            "amount": amount.to_string(),
        }),
    )
}

/// Convenience: log the lending-pool account health snapshot.
pub fn log_account_health(audit: &mut AuditLog, data: &UserAccountData) -> Result<()> {
    audit.log(
        "account_health",
        serde_json::json!({
            "collateral_usd": data.collateral_usd(),
            "debt_usd": data.debt_usd(),
            "available_borrows_usd": data.available_borrows_usd(),
            "health_factor": data.health_factor.to_string(),
        }),
    )
}

/// Convenience: log deposit completion.
pub fn log_deposit_completed(audit: &mut AuditLog, supplied: usize) -> Result<()> {
    audit.log("deposit_completed", serde_json::json!({ "supplied": supplied }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audit_log_writes_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test_audit.jsonl");

        {
            let mut log = AuditLog::open(&path).unwrap();
            log.log_simple("test_event").unwrap();
            log.log("test_data", serde_json::json!({"key": "value"}))
                .unwrap();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        // Each line should be valid JSON
        for line in &lines {
            let _: serde_json::Value = serde_json::from_str(line).unwrap();
        }

        // First line should have "test_event"
        assert!(lines[0].contains("\"event\":\"test_event\""));
    }

    #[test]
    fn audit_log_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subdir").join("deep").join("audit.jsonl");

        let mut log = AuditLog::open(&path).unwrap();
        log.log_simple("test").unwrap();

        assert!(path.exists());
    }

    #[test]
    fn native_amounts_logged_as_strings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");

        let mut log = AuditLog::open(&path).unwrap();
        log_withdrawal(&mut log, "WETH", 250_000_000_000_000_000_000).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("\"250000000000000000000\""));
    }
}
