//! Pre-trade risk checks.
//!
//! Validates a swap plan against risk limits before anything is signed.

use serde::Serialize;

use crate::config::RiskConfig;
use crate::gateway::PriceRound;
use crate::plan::SizedSwap;

/// Result of running all risk checks.
#[derive(Debug, Clone, Serialize)]
pub struct RiskReport {
    pub checks: Vec<RiskCheck>,
}

/// A single risk check result.
#[derive(Debug, Clone, Serialize)]
pub struct RiskCheck {
    pub name: &'static str,
    pub status: RiskStatus,
    pub detail: String,
}

/// Whether a check passed, warned, or failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RiskStatus {
    Pass,
    Warn,
    Fail,
}

impl std::fmt::Display for RiskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskStatus::Pass => write!(f, "PASS"),
            RiskStatus::Warn => write!(f, "WARN"),
            RiskStatus::Fail => write!(f, "FAIL"),
        }
    }
}

impl RiskReport {
    /// True if any check failed (not just warned).
    pub fn has_failures(&self) -> bool {
        self.checks.iter().any(|c| c.status == RiskStatus::Fail)
    }

    /// True if any check warned.
    pub fn has_warnings(&self) -> bool {
        self.checks.iter().any(|c| c.status == RiskStatus::Warn)
    }
}

impl std::fmt::Display for RiskReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "RISK CHECKS:")?;
        for check in &self.checks {
            writeln!(f, "  [{}] {}: {}", check.status, check.name, check.detail)?;
        }
        Ok(())
    }
}

/// Run all pre-trade risk checks.
///
/// # Arguments
/// - `legs`: The sized swap plan
/// - `targets`: Target (symbol, weight) pairs
/// - `rounds`: Latest oracle round per asset, for staleness
/// - `now`: Current unix time in seconds
/// - `config`: Risk configuration
pub fn check_risk(
    legs: &[SizedSwap],
    targets: &[(String, f64)],
    rounds: &[(String, PriceRound)],
    now: u64,
    config: &RiskConfig,
) -> RiskReport {
    let mut checks = Vec::new();

    // 1. Weight allocation summary (validated upstream; informational here)
    let allocated: f64 = targets.iter().map(|(_, w)| w).sum();
    checks.push(RiskCheck {
        name: "Weight allocation",
        status: RiskStatus::Pass,
        detail: format!(
            "{:.1}% allocated across {} assets",
            allocated * 100.0,
            targets.len()
        ),
    });

    // 2. Price staleness — fail on any round older than max_price_age_secs
    if config.max_price_age_secs == 0 {
        checks.push(RiskCheck {
            name: "Price staleness",
            status: RiskStatus::Pass,
            detail: "check disabled (max_price_age_secs = 0)".into(),
        });
    } else {
        let mut stale = 0;
        for (symbol, round) in rounds {
            let age = now.saturating_sub(round.updated_at);
            if age > config.max_price_age_secs {
                stale += 1;
                checks.push(RiskCheck {
                    name: "Price staleness",
                    status: RiskStatus::Fail,
                    detail: format!(
                        "{symbol} round is {age}s old (> {}s)",
                        config.max_price_age_secs
                    ),
                });
            }
        }
        if stale == 0 {
            checks.push(RiskCheck {
                name: "Price staleness",
                status: RiskStatus::Pass,
                detail: format!(
                    "all {} feeds within {}s",
                    rounds.len(),
                    config.max_price_age_secs
                ),
            });
        }
    }

    // 3. Swap size — warn if any leg exceeds max_trade_usd
    let mut oversized = 0;
    for leg in legs {
        if leg.value_usd > config.max_trade_usd {
            oversized += 1;
            checks.push(RiskCheck {
                name: "Swap size",
                status: RiskStatus::Warn,
                detail: format!(
                    "{} -> {}: ${:.0} > ${:.0} max_trade_usd",
                    leg.sell, leg.buy, leg.value_usd, config.max_trade_usd,
                ),
            });
        }
    }
    if oversized == 0 {
        let largest = legs.iter().map(|l| l.value_usd).fold(0.0, f64::max);
        checks.push(RiskCheck {
            name: "Swap size",
            status: RiskStatus::Pass,
            detail: format!("largest leg ${largest:.2}"),
        });
    }

    // 4. Leg count
    checks.push(RiskCheck {
        name: "Leg count",
        status: RiskStatus::Pass,
        detail: format!("{} swap legs", legs.len()),
    });

    RiskReport { checks }
}
