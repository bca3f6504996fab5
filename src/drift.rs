//! Allocation drift: current portfolio weights vs target weights.
//!
//! The driver's rebalance gate and the `drift` command both read from the
//! report produced here.

use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::plan::{self, Holding};

/// Drift report comparing current allocation against targets.
#[derive(Debug, Clone, Serialize)]
pub struct DriftReport {
    pub entries: Vec<DriftEntry>,
    pub total_value_usd: f64,
    /// Largest absolute per-asset drift.
    pub max_drift: f64,
}

/// One asset's allocation entry.
#[derive(Debug, Clone, Serialize)]
pub struct DriftEntry {
    pub symbol: String,
    pub value_usd: f64,
    pub current_weight: f64,
    pub target_weight: f64,
    /// Signed: current minus target.
    pub drift: f64,
}

/// Measure per-asset allocation drift.
///
/// A zero-value portfolio reports all current weights as zero. Target
/// symbols without a matching holding get a zero-value entry so the report
/// always covers both sides.
pub fn measure(holdings: &[Holding], targets: &[(String, f64)]) -> DriftReport {
    let target_map: FxHashMap<&str, f64> = targets
        .iter()
        .map(|(sym, weight)| (sym.as_str(), *weight))
        .collect();
    let total = plan::total_value(holdings);

    let mut entries: Vec<DriftEntry> = holdings
        .iter()
        .map(|h| {
            let value = h.value_usd();
            let current = if total > 0.0 { value / total } else { 0.0 };
            let target = target_map.get(h.symbol.as_str()).copied().unwrap_or(0.0);
            DriftEntry {
                symbol: h.symbol.clone(),
                value_usd: value,
                current_weight: current,
                target_weight: target,
                drift: current - target,
            }
        })
        .collect();

    for (sym, weight) in targets {
        if !holdings.iter().any(|h| &h.symbol == sym) {
            entries.push(DriftEntry {
                symbol: sym.clone(),
                value_usd: 0.0,
                current_weight: 0.0,
                target_weight: *weight,
                drift: -weight,
            });
        }
    }

    let max_drift = entries.iter().map(|e| e.drift.abs()).fold(0.0, f64::max);

    DriftReport {
        entries,
        total_value_usd: total,
        max_drift,
    }
}

/// The rebalance gate: strictly greater than the buffer. A drift exactly
/// equal to the buffer does not trigger.
pub fn needs_rebalance(report: &DriftReport, buffer: f64) -> bool {
    report.max_drift > buffer
}

impl std::fmt::Display for DriftReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "CURRENT ALLOCATION:")?;
        writeln!(
            f,
            "  {:8} {:>12} {:>10} {:>10} {:>10}",
            "Symbol", "Value", "Current%", "Target%", "Drift%"
        )?;
        for e in &self.entries {
            writeln!(
                f,
                "  {:8} ${:>10.2} {:>9.2}% {:>9.2}% {:>+9.2}%",
                e.symbol,
                e.value_usd,
                e.current_weight * 100.0,
                e.target_weight * 100.0,
                e.drift * 100.0,
            )?;
        }
        writeln!(
            f,
            "\n  Total: ${:.2}  Max drift: {:.2}%",
            self.total_value_usd,
            self.max_drift * 100.0,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn holding(symbol: &str, balance: f64, price: f64) -> Holding {
        Holding {
            symbol: symbol.into(),
            balance,
            price_usd: price,
            decimals: 18,
        }
    }

    fn targets(pairs: &[(&str, f64)]) -> Vec<(String, f64)> {
        pairs.iter().map(|(s, w)| (s.to_string(), *w)).collect()
    }

    #[test]
    fn worked_example_drift() {
        let holdings = vec![holding("USDC", 1000.0, 1.0), holding("WETH", 0.0, 3000.0)];
        let report = measure(&holdings, &targets(&[("USDC", 0.3), ("WETH", 0.7)]));

        assert!((report.total_value_usd - 1000.0).abs() < 1e-9);
        assert!((report.entries[0].current_weight - 1.0).abs() < 1e-9);
        assert!((report.entries[0].drift - 0.7).abs() < 1e-9);
        assert!((report.max_drift - 0.7).abs() < 1e-9);
        assert!(needs_rebalance(&report, 0.1));
    }

    #[test]
    fn near_target_stays_put() {
        // ~30.0/70.0 split: 300 USDC + 0.2333 WETH at $3000.
        let holdings = vec![holding("USDC", 300.0, 1.0), holding("WETH", 0.2333, 3000.0)];
        let report = measure(&holdings, &targets(&[("USDC", 0.3), ("WETH", 0.7)]));

        assert!(report.max_drift < 0.001);
        assert!(!needs_rebalance(&report, 0.1));
    }

    #[test]
    fn drift_exactly_at_buffer_does_not_trigger() {
        // 75/25 vs 50/50: drift is exactly 0.25, representable in binary.
        let holdings = vec![holding("A", 750.0, 1.0), holding("B", 250.0, 1.0)];
        let report = measure(&holdings, &targets(&[("A", 0.5), ("B", 0.5)]));

        assert_eq!(report.max_drift, 0.25);
        assert!(!needs_rebalance(&report, 0.25));
        assert!(needs_rebalance(&report, 0.2));
    }

    #[test]
    fn zero_portfolio_reports_zero_weights() {
        let holdings = vec![holding("USDC", 0.0, 1.0), holding("WETH", 0.0, 3000.0)];
        let report = measure(&holdings, &targets(&[("USDC", 0.3), ("WETH", 0.7)]));

        assert_eq!(report.total_value_usd, 0.0);
        assert!(report.entries.iter().all(|e| e.current_weight == 0.0));
    }

    #[test]
    fn target_without_holding_gets_entry() {
        let holdings = vec![holding("USDC", 1000.0, 1.0)];
        let report = measure(&holdings, &targets(&[("USDC", 0.5), ("WBTC", 0.5)]));

        let wbtc = report.entries.iter().find(|e| e.symbol == "WBTC").unwrap();
        assert_eq!(wbtc.value_usd, 0.0);
        assert!((wbtc.drift - (-0.5)).abs() < 1e-9);
    }

    #[test]
    fn display_format() {
        let holdings = vec![holding("USDC", 1000.0, 1.0), holding("WETH", 0.0, 3000.0)];
        let report = measure(&holdings, &targets(&[("USDC", 0.3), ("WETH", 0.7)]));
        let s = format!("{report}");

        assert!(s.contains("USDC"));
        assert!(s.contains("Max drift"));
    }
}
