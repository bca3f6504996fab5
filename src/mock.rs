//! Mock chain gateway for testing — implements `ChainGateway` with
//! configurable balances, oracle rounds, and failure injection.
//!
//! Use this in integration tests to exercise the driver without a node.
//!
//! ```ignore
//! use aave_rebalancer::mock::MockGateway;
//!
//! let gateway = MockGateway::builder()
//!     .with_balance(atoken, 1_000_000_000)
//!     .with_round(feed, 100_000_000, 8, now)
//!     .build();
//! ```

use std::sync::Mutex;

use alloy::primitives::Address;
use rustc_hash::FxHashMap;

use crate::gateway::{
    ChainGateway, GatewayError, GatewayResult, PriceRound, SwapRequest, UserAccountData,
};

/// Which gateway call the mock should fail on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailPoint {
    Approve,
    Withdraw,
    Swap,
    Supply,
}

/// How the mock sizes swap outputs.
#[derive(Clone, Copy, Debug)]
pub enum SwapOutput {
    /// Return exactly the request's `min_out` (worst acceptable fill).
    MinOut,
    /// Return a fixed amount regardless of the request.
    Fixed(u128),
}

/// A recorded mutating call, in issue order, for assertion in tests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordedCall {
    Approve {
        token: Address,
        spender: Address,
        amount: u128,
    },
    Withdraw {
        asset: Address,
        amount: u128,
        recipient: Address,
    },
    Supply {
        asset: Address,
        amount: u128,
        on_behalf_of: Address,
        referral_code: u16,
    },
    Swap {
        token_in: Address,
        token_out: Address,
        fee_tier: u32,
        recipient: Address,
        amount_in: u128,
        min_out: u128,
    },
}

/// Builder for `MockGateway`.
pub struct MockGatewayBuilder {
    balances: FxHashMap<Address, u128>,
    allowances: FxHashMap<(Address, Address), u128>,
    rounds: FxHashMap<Address, PriceRound>,
    account_data: UserAccountData,
    swap_output: SwapOutput,
    fail_on: Option<FailPoint>,
    pool: Address,
    router: Address,
}

impl MockGatewayBuilder {
    /// Set a token balance (any account queries it).
    pub fn with_balance(mut self, token: Address, amount: u128) -> Self {
        self.balances.insert(token, amount);
        self
    }

    /// Set an allowance for (token, spender).
    pub fn with_allowance(mut self, token: Address, spender: Address, amount: u128) -> Self {
        self.allowances.insert((token, spender), amount);
        self
    }

    /// Set a price feed round.
    pub fn with_round(mut self, feed: Address, answer: i128, decimals: u8, updated_at: u64) -> Self {
        self.rounds.insert(
            feed,
            PriceRound {
                answer,
                decimals,
                updated_at,
            },
        );
        self
    }

    pub fn with_account_data(mut self, data: UserAccountData) -> Self {
        self.account_data = data;
        self
    }

    pub fn swap_output(mut self, output: SwapOutput) -> Self {
        self.swap_output = output;
        self
    }

    /// Make the given call fail with a reverted-transaction error.
    pub fn fail_on(mut self, point: FailPoint) -> Self {
        self.fail_on = Some(point);
        self
    }

    pub fn build(self) -> MockGateway {
        MockGateway {
            balances: self.balances,
            allowances: self.allowances,
            rounds: self.rounds,
            account_data: self.account_data,
            swap_output: self.swap_output,
            fail_on: self.fail_on,
            pool: self.pool,
            router: self.router,
            calls: Mutex::new(Vec::new()),
        }
    }
}

/// A mock gateway that records mutating calls and returns configured state.
pub struct MockGateway {
    balances: FxHashMap<Address, u128>,
    allowances: FxHashMap<(Address, Address), u128>,
    rounds: FxHashMap<Address, PriceRound>,
    account_data: UserAccountData,
    swap_output: SwapOutput,
    fail_on: Option<FailPoint>,
    pool: Address,
    router: Address,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockGateway {
    pub fn builder() -> MockGatewayBuilder {
        MockGatewayBuilder {
            balances: FxHashMap::default(),
            allowances: FxHashMap::default(),
            rounds: FxHashMap::default(),
            account_data: UserAccountData {
                total_collateral_base: 0,
                total_debt_base: 0,
                available_borrows_base: 0,
                current_liquidation_threshold: 0,
                ltv: 0,
                health_factor: u128::MAX,
            },
            swap_output: SwapOutput::MinOut,
            fail_on: None,
            pool: Address::repeat_byte(0xAA),
            router: Address::repeat_byte(0xBB),
        }
    }

    /// All mutating calls issued so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: RecordedCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn check_fail(&self, point: FailPoint, what: &str) -> GatewayResult<()> {
        if self.fail_on == Some(point) {
            return Err(GatewayError::Reverted(format!("mock: {what} reverted")));
        }
        Ok(())
    }
}

impl ChainGateway for MockGateway {
    fn balance_of(&self, token: Address, _account: Address) -> GatewayResult<u128> {
        Ok(self.balances.get(&token).copied().unwrap_or(0))
    }

    fn latest_round(&self, feed: Address) -> GatewayResult<PriceRound> {
        self.rounds
            .get(&feed)
            .copied()
            .ok_or_else(|| GatewayError::BadData(format!("no round configured for feed {feed}")))
    }

    fn allowance(&self, token: Address, _owner: Address, spender: Address) -> GatewayResult<u128> {
        Ok(self
            .allowances
            .get(&(token, spender))
            .copied()
            .unwrap_or(0))
    }

    fn approve(&self, token: Address, spender: Address, amount: u128) -> GatewayResult<()> {
        self.record(RecordedCall::Approve {
            token,
            spender,
            amount,
        });
        self.check_fail(FailPoint::Approve, "approve")
    }

    fn pool_withdraw(&self, asset: Address, amount: u128, recipient: Address) -> GatewayResult<()> {
        self.record(RecordedCall::Withdraw {
            asset,
            amount,
            recipient,
        });
        self.check_fail(FailPoint::Withdraw, "withdraw")
    }

    fn pool_supply(
        &self,
        asset: Address,
        amount: u128,
        on_behalf_of: Address,
        referral_code: u16,
    ) -> GatewayResult<()> {
        self.record(RecordedCall::Supply {
            asset,
            amount,
            on_behalf_of,
            referral_code,
        });
        self.check_fail(FailPoint::Supply, "supply")
    }

    fn swap_exact_input_single(&self, request: &SwapRequest) -> GatewayResult<u128> {
        self.record(RecordedCall::Swap {
            token_in: request.token_in,
            token_out: request.token_out,
            fee_tier: request.fee_tier,
            recipient: request.recipient,
            amount_in: request.amount_in,
            min_out: request.min_out,
        });
        self.check_fail(FailPoint::Swap, "swap")?;

        Ok(match self.swap_output {
            SwapOutput::MinOut => request.min_out,
            SwapOutput::Fixed(amount) => amount,
        })
    }

    fn account_data(&self, _account: Address) -> GatewayResult<UserAccountData> {
        Ok(self.account_data)
    }

    fn pool_address(&self) -> Address {
        self.pool
    }

    fn router_address(&self) -> Address {
        self.router
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> Address {
        Address::repeat_byte(0x11)
    }

    #[test]
    fn builder_basic() {
        let gateway = MockGateway::builder()
            .with_balance(token(), 500)
            .with_round(token(), 100_000_000, 8, 42)
            .build();

        assert_eq!(gateway.balance_of(token(), Address::ZERO).unwrap(), 500);
        assert_eq!(
            gateway.balance_of(Address::repeat_byte(0x22), Address::ZERO).unwrap(),
            0
        );

        let round = gateway.latest_round(token()).unwrap();
        assert_eq!(round.answer, 100_000_000);
        assert_eq!(round.updated_at, 42);
    }

    #[test]
    fn missing_round_errors() {
        let gateway = MockGateway::builder().build();
        assert!(gateway.latest_round(token()).is_err());
    }

    #[test]
    fn calls_recorded_in_order() {
        let gateway = MockGateway::builder().build();

        gateway.approve(token(), gateway.pool_address(), 100).unwrap();
        gateway
            .pool_withdraw(token(), 100, Address::ZERO)
            .unwrap();

        let calls = gateway.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(calls[0], RecordedCall::Approve { amount: 100, .. }));
        assert!(matches!(calls[1], RecordedCall::Withdraw { amount: 100, .. }));
    }

    #[test]
    fn swap_returns_min_out_by_default() {
        let gateway = MockGateway::builder().build();
        let request = SwapRequest {
            token_in: token(),
            token_out: Address::repeat_byte(0x22),
            fee_tier: 3000,
            recipient: Address::ZERO,
            amount_in: 1000,
            min_out: 950,
        };
        assert_eq!(gateway.swap_exact_input_single(&request).unwrap(), 950);
    }

    #[test]
    fn fail_point_rejects_call() {
        let gateway = MockGateway::builder().fail_on(FailPoint::Withdraw).build();

        assert!(gateway.approve(token(), Address::ZERO, 1).is_ok());
        assert!(gateway.pool_withdraw(token(), 1, Address::ZERO).is_err());
    }
}
