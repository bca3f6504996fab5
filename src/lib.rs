//! aave-rebalancer: Target-weight rebalancer for Aave v3 deposits.
//!
//! Reads target weights from a JSON file, connects to an EVM chain for
//! deposited balances and Chainlink prices, computes the swap plan, and
//! executes withdraw-swap legs through Uniswap V3 with risk checks and an
//! audit trail.

pub mod allocation;
pub mod audit;
pub mod config;
pub mod drift;
pub mod error;
pub mod evm;
pub mod execution;
pub mod gateway;
pub mod mock;
pub mod plan;
pub mod risk;
