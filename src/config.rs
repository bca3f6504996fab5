//! TOML configuration loading and validation.

use std::path::Path;

use alloy::primitives::Address;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Valid Uniswap V3 fee tiers, in hundredths of a bip.
const FEE_TIERS: [u32; 4] = [100, 500, 3000, 10_000];

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub network: NetworkConfig,
    pub account: AccountConfig,
    pub contracts: ContractsConfig,
    #[serde(default)]
    pub rebalance: RebalanceConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    pub assets: Vec<AssetConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    pub rpc_url: String,
    /// Verified against the node at connect time when set.
    #[serde(default)]
    pub chain_id: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    /// The account every balance read, withdrawal, and swap is issued for.
    pub address: Address,
    #[serde(default = "default_key_env")]
    pub key_env: String,
}

fn default_key_env() -> String {
    "REBALANCER_PRIVATE_KEY".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContractsConfig {
    /// Aave PoolAddressesProvider; the pool itself is resolved at connect.
    pub pool_addresses_provider: Address,
    /// Uniswap V3 SwapRouter02.
    pub swap_router: Address,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RebalanceConfig {
    /// Max allocation drift tolerated before trading (fraction of total).
    #[serde(default = "default_buffer")]
    pub buffer: f64,
    #[serde(default = "default_slippage")]
    pub slippage_bps: u32,
    #[serde(default = "default_fee_tier")]
    pub fee_tier: u32,
    #[serde(default)]
    pub referral_code: u16,
}

fn default_buffer() -> f64 {
    0.1
}
fn default_slippage() -> u32 {
    500
}
fn default_fee_tier() -> u32 {
    3000
}

impl Default for RebalanceConfig {
    fn default() -> Self {
        Self {
            buffer: default_buffer(),
            slippage_bps: default_slippage(),
            fee_tier: default_fee_tier(),
            referral_code: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    /// Swap legs below this notional are dropped from the plan.
    #[serde(default)]
    pub min_trade_usd: f64,
    #[serde(default = "default_max_trade")]
    pub max_trade_usd: f64,
    /// Oracle rounds older than this fail the staleness check; 0 disables.
    #[serde(default = "default_max_price_age")]
    pub max_price_age_secs: u64,
}

fn default_max_trade() -> f64 {
    100_000.0
}
fn default_max_price_age() -> u64 {
    3600
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            min_trade_usd: 0.0,
            max_trade_usd: default_max_trade(),
            max_price_age_secs: default_max_price_age(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub dir: String,
    #[serde(default = "default_audit_file")]
    pub audit_file: String,
}

fn default_log_dir() -> String {
    "./logs".into()
}
fn default_audit_file() -> String {
    "audit.jsonl".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            audit_file: default_audit_file(),
        }
    }
}

/// One portfolio asset: the underlying token, its interest-bearing receipt
/// token, and the USD price feed.
#[derive(Debug, Clone, Deserialize)]
pub struct AssetConfig {
    pub symbol: String,
    pub token: Address,
    pub receipt_token: Address,
    pub price_feed: Address,
    pub decimals: u8,
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::ConfigRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate config invariants.
    pub fn validate(&self) -> Result<()> {
        if self.network.rpc_url.is_empty() {
            return Err(Error::Config("rpc_url must not be empty".into()));
        }
        if self.account.key_env.is_empty() {
            return Err(Error::Config("key_env must not be empty".into()));
        }
        if self.rebalance.buffer <= 0.0 || self.rebalance.buffer >= 1.0 {
            return Err(Error::Config("buffer must be in (0.0, 1.0)".into()));
        }
        if self.rebalance.slippage_bps >= 10_000 {
            return Err(Error::Config("slippage_bps must be < 10000".into()));
        }
        if !FEE_TIERS.contains(&self.rebalance.fee_tier) {
            return Err(Error::Config(format!(
                "fee_tier {} is not a valid pool tier (100, 500, 3000, 10000)",
                self.rebalance.fee_tier
            )));
        }
        if self.risk.min_trade_usd < 0.0 {
            return Err(Error::Config("min_trade_usd must be >= 0".into()));
        }
        if self.risk.max_trade_usd <= 0.0 {
            return Err(Error::Config("max_trade_usd must be > 0".into()));
        }
        if self.assets.is_empty() {
            return Err(Error::Config("at least one [[assets]] entry required".into()));
        }

        let mut seen = std::collections::HashSet::new();
        for asset in &self.assets {
            if asset.symbol.is_empty() {
                return Err(Error::Config("asset symbol must not be empty".into()));
            }
            if !seen.insert(&asset.symbol) {
                return Err(Error::Config(format!(
                    "duplicate asset symbol: {}",
                    asset.symbol
                )));
            }
            if asset.decimals > 24 {
                return Err(Error::Config(format!(
                    "asset {} decimals {} out of range (max 24)",
                    asset.symbol, asset.decimals
                )));
            }
        }
        Ok(())
    }

    /// Look up an asset by symbol.
    pub fn asset(&self, symbol: &str) -> Option<&AssetConfig> {
        self.assets.iter().find(|a| a.symbol == symbol)
    }

    /// Full path to the audit log file.
    pub fn audit_path(&self) -> std::path::PathBuf {
        Path::new(&self.logging.dir).join(&self.logging.audit_file)
    }
}
