//! Target allocation specification (allocation.json) loading and validation.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::{Error, Result};

/// Tolerance when checking that weights sum to 1.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// A target allocation produced by the strategy layer.
#[derive(Debug, Clone, Deserialize)]
pub struct AllocationSpec {
    pub timestamp: DateTime<Utc>,
    pub targets: Vec<AllocationTarget>,
}

/// A single target: asset symbol + portfolio weight.
#[derive(Debug, Clone, Deserialize)]
pub struct AllocationTarget {
    pub symbol: String,
    pub weight: f64,
}

impl AllocationSpec {
    /// Load and validate an allocation.json file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::AllocationRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let spec: AllocationSpec = serde_json::from_str(&contents)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Parse from a JSON string (useful for testing).
    pub fn from_json(json: &str) -> Result<Self> {
        let spec: AllocationSpec = serde_json::from_str(json)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Validate the allocation.
    ///
    /// Weights must be positive, no greater than 1, and sum to 1. A deposit
    /// portfolio is long-only, so there is nothing a zero or negative weight
    /// could mean; omit the asset instead.
    fn validate(&self) -> Result<()> {
        if self.targets.is_empty() {
            return Err(Error::Allocation("targets list is empty".into()));
        }

        let mut seen = std::collections::HashSet::new();
        for t in &self.targets {
            if t.symbol.is_empty() {
                return Err(Error::Allocation("empty symbol".into()));
            }
            if !seen.insert(&t.symbol) {
                return Err(Error::Allocation(format!("duplicate symbol: {}", t.symbol)));
            }
        }

        for t in &self.targets {
            if t.weight <= 0.0 {
                return Err(Error::Allocation(format!(
                    "weight for {} ({}) must be > 0 — omit the asset instead",
                    t.symbol, t.weight
                )));
            }
            if t.weight > 1.0 {
                return Err(Error::Allocation(format!(
                    "weight for {} ({}) exceeds 1.0",
                    t.symbol, t.weight
                )));
            }
        }

        let sum: f64 = self.targets.iter().map(|t| t.weight).sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(Error::Allocation(format!(
                "weights sum to {sum:.6}, expected 1.0"
            )));
        }

        Ok(())
    }

    /// Get (symbol, weight) pairs for the planner.
    pub fn weights(&self) -> Vec<(String, f64)> {
        self.targets
            .iter()
            .map(|t| (t.symbol.clone(), t.weight))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_json() -> &'static str {
        r#"{
            "timestamp": "2026-08-20T12:00:00Z",
            "targets": [
                { "symbol": "USDC", "weight": 0.3 },
                { "symbol": "WETH", "weight": 0.7 }
            ]
        }"#
    }

    #[test]
    fn parse_valid_allocation() {
        let spec = AllocationSpec::from_json(valid_json()).unwrap();
        assert_eq!(spec.targets.len(), 2);
        assert_eq!(spec.targets[0].symbol, "USDC");
        assert_eq!(spec.targets[0].weight, 0.3);
    }

    #[test]
    fn weights_pairs() {
        let spec = AllocationSpec::from_json(valid_json()).unwrap();
        let pairs = spec.weights();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[1], ("WETH".to_string(), 0.7));
    }

    #[test]
    fn reject_empty_targets() {
        let json = r#"{"timestamp":"2026-01-01T00:00:00Z","targets":[]}"#;
        assert!(AllocationSpec::from_json(json).is_err());
    }

    #[test]
    fn reject_duplicate_symbols() {
        let json = r#"{
            "timestamp": "2026-01-01T00:00:00Z",
            "targets": [
                { "symbol": "USDC", "weight": 0.5 },
                { "symbol": "USDC", "weight": 0.5 }
            ]
        }"#;
        assert!(AllocationSpec::from_json(json).is_err());
    }

    #[test]
    fn reject_zero_weight() {
        let json = r#"{
            "timestamp": "2026-01-01T00:00:00Z",
            "targets": [
                { "symbol": "USDC", "weight": 0.0 },
                { "symbol": "WETH", "weight": 1.0 }
            ]
        }"#;
        assert!(AllocationSpec::from_json(json).is_err());
    }

    #[test]
    fn reject_negative_weight() {
        let json = r#"{
            "timestamp": "2026-01-01T00:00:00Z",
            "targets": [
                { "symbol": "USDC", "weight": -0.2 },
                { "symbol": "WETH", "weight": 1.2 }
            ]
        }"#;
        assert!(AllocationSpec::from_json(json).is_err());
    }

    #[test]
    fn reject_weights_not_summing_to_one() {
        let json = r#"{
            "timestamp": "2026-01-01T00:00:00Z",
            "targets": [
                { "symbol": "USDC", "weight": 0.6 },
                { "symbol": "WETH", "weight": 0.5 }
            ]
        }"#;
        assert!(AllocationSpec::from_json(json).is_err());
    }

    #[test]
    fn accept_sum_within_tolerance() {
        let json = r#"{
            "timestamp": "2026-01-01T00:00:00Z",
            "targets": [
                { "symbol": "USDC", "weight": 0.3333333 },
                { "symbol": "WETH", "weight": 0.3333333 },
                { "symbol": "WBTC", "weight": 0.3333334 }
            ]
        }"#;
        assert!(AllocationSpec::from_json(json).is_ok());
    }

    #[test]
    fn reject_single_weight_over_one() {
        let json = r#"{
            "timestamp": "2026-01-01T00:00:00Z",
            "targets": [
                { "symbol": "USDC", "weight": 1.5 }
            ]
        }"#;
        assert!(AllocationSpec::from_json(json).is_err());
    }
}
