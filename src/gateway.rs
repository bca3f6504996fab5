//! Chain gateway abstraction used by rebalancer execution.
//!
//! Everything the driver needs from the outside world — token balances,
//! oracle rounds, approvals, pool withdraw/supply, and the exact-input swap —
//! goes through this trait so tests can run against a mock.

use alloy::primitives::Address;

use crate::config::Config;
use crate::error::Result;
use crate::evm::EvmClient;

/// Errors surfaced by a chain gateway. They propagate to the caller
/// unmodified; the driver never retries or rewrites them.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("connection error: {0}")]
    Connect(String),

    #[error("signer error: {0}")]
    Signer(String),

    #[error("rpc call failed: {0}")]
    Rpc(String),

    #[error("transaction reverted: {0}")]
    Reverted(String),

    #[error("unexpected chain data: {0}")]
    BadData(String),
}

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// A raw Chainlink aggregator round. Normalization to USD happens in the
/// planning layer, not here.
#[derive(Debug, Clone, Copy)]
pub struct PriceRound {
    /// Raw signed answer; divide by 10^decimals for the quote price.
    pub answer: i128,
    pub decimals: u8,
    /// Unix timestamp of the round's last update.
    pub updated_at: u64,
}

/// Parameters for a single-hop exact-input swap on the DEX router.
#[derive(Debug, Clone)]
pub struct SwapRequest {
    pub token_in: Address,
    pub token_out: Address,
    /// Pool fee tier in hundredths of a bip (3000 = 0.3%).
    pub fee_tier: u32,
    pub recipient: Address,
    pub amount_in: u128,
    pub min_out: u128,
}

/// Lending-pool account snapshot (Aave `getUserAccountData`).
///
/// `*_base` values are in the pool's base currency with 8 decimals (USD).
/// `health_factor` is an 18-decimal ratio, saturated to `u128::MAX` for
/// debt-free accounts.
#[derive(Debug, Clone, Copy)]
pub struct UserAccountData {
    pub total_collateral_base: u128,
    pub total_debt_base: u128,
    pub available_borrows_base: u128,
    pub current_liquidation_threshold: u128,
    pub ltv: u128,
    pub health_factor: u128,
}

impl UserAccountData {
    pub fn collateral_usd(&self) -> f64 {
        self.total_collateral_base as f64 / 1e8
    }

    pub fn debt_usd(&self) -> f64 {
        self.total_debt_base as f64 / 1e8
    }

    pub fn available_borrows_usd(&self) -> f64 {
        self.available_borrows_base as f64 / 1e8
    }
}

impl std::fmt::Display for UserAccountData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "  Collateral: ${:.2}  Debt: ${:.2}  Available to borrow: ${:.2}",
            self.collateral_usd(),
            self.debt_usd(),
            self.available_borrows_usd(),
        )?;
        write!(
            f,
            "  Liquidation threshold: {:.2}%  LTV: {:.2}%  Health factor: ",
            self.current_liquidation_threshold as f64 / 100.0,
            self.ltv as f64 / 100.0,
        )?;
        if self.health_factor == u128::MAX {
            write!(f, "inf (no debt)")
        } else {
            write!(f, "{:.2}", self.health_factor as f64 / 1e18)
        }
    }
}

/// Minimal on-chain API needed by the rebalancer runtime.
///
/// All methods block until the call (and for mutating calls, the receipt)
/// completes; the driver is strictly sequential.
pub trait ChainGateway {
    /// ERC-20 balance in raw native units.
    fn balance_of(&self, token: Address, account: Address) -> GatewayResult<u128>;

    /// Latest round of a price feed aggregator.
    fn latest_round(&self, feed: Address) -> GatewayResult<PriceRound>;

    /// ERC-20 allowance granted by `owner` to `spender`.
    fn allowance(&self, token: Address, owner: Address, spender: Address) -> GatewayResult<u128>;

    /// Approve `spender` to move `amount` of `token`.
    fn approve(&self, token: Address, spender: Address, amount: u128) -> GatewayResult<()>;

    /// Withdraw `amount` of `asset` from the lending pool to `recipient`.
    fn pool_withdraw(&self, asset: Address, amount: u128, recipient: Address) -> GatewayResult<()>;

    /// Supply `amount` of `asset` to the lending pool.
    fn pool_supply(
        &self,
        asset: Address,
        amount: u128,
        on_behalf_of: Address,
        referral_code: u16,
    ) -> GatewayResult<()>;

    /// Exact-input single-hop swap; returns the amount of `token_out`
    /// received by the recipient.
    fn swap_exact_input_single(&self, request: &SwapRequest) -> GatewayResult<u128>;

    /// Lending-pool health snapshot for `account`.
    fn account_data(&self, account: Address) -> GatewayResult<UserAccountData>;

    /// The lending pool address (approve target for receipt tokens).
    fn pool_address(&self) -> Address;

    /// The swap router address (approve target for underlying tokens).
    fn router_address(&self) -> Address;
}

/// Connect the live EVM gateway described by the config.
pub fn connect(config: &Config) -> Result<Box<dyn ChainGateway>> {
    let client = EvmClient::connect(config)?;
    Ok(Box::new(client))
}
