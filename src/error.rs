//! Error types for the rebalancer.

use std::path::PathBuf;

use crate::gateway::GatewayError;

/// All errors that can occur during rebalancer operation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("allocation file error: {0}")]
    Allocation(String),

    #[error("failed to read allocation file {path}: {source}")]
    AllocationRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse allocation JSON: {0}")]
    AllocationParse(#[from] serde_json::Error),

    #[error("portfolio has zero total value")]
    EmptyPortfolio,

    #[error("price feed error: {0}")]
    PriceFeed(String),

    #[error("trade sizing overflow: {0}")]
    SizingOverflow(String),

    #[error("risk check failed: {0}")]
    RiskFailed(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("execution aborted: {0}")]
    Aborted(String),

    #[error("audit log error: {0}")]
    Audit(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
