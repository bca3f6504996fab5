//! Blocking EVM client over an async alloy provider.
//!
//! The driver is strictly sequential, so the client owns a current-thread
//! tokio runtime and blocks on every call. Mutating calls wait for the
//! receipt and treat a reverted status as an error.

use alloy::network::EthereumWallet;
use alloy::primitives::aliases::{U24, U160};
use alloy::primitives::{Address, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::TransactionReceipt;
use alloy::signers::local::PrivateKeySigner;
use log::{debug, info};
use std::future::IntoFuture;
use tokio::runtime::Runtime;

use super::contracts::{IAggregatorV3, IERC20, IPool, IPoolAddressesProvider, ISwapRouter};
use crate::config::Config;
use crate::gateway::{
    ChainGateway, GatewayError, GatewayResult, PriceRound, SwapRequest, UserAccountData,
};

/// Live chain gateway backed by a JSON-RPC node.
pub struct EvmClient {
    rt: Runtime,
    provider: DynProvider,
    pool: Address,
    router: Address,
}

impl EvmClient {
    /// Connect to the configured RPC endpoint.
    ///
    /// Reads the signing key from the environment variable named in the
    /// config, verifies it matches the configured account address, checks
    /// the chain id when one is configured, and resolves the lending pool
    /// through the addresses provider.
    pub fn connect(config: &Config) -> GatewayResult<Self> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| GatewayError::Connect(format!("tokio runtime: {e}")))?;

        let key = std::env::var(&config.account.key_env).map_err(|_| {
            GatewayError::Signer(format!(
                "environment variable {} is not set",
                config.account.key_env
            ))
        })?;
        let signer: PrivateKeySigner = key
            .trim()
            .parse()
            .map_err(|e| GatewayError::Signer(format!("invalid private key: {e}")))?;
        if signer.address() != config.account.address {
            return Err(GatewayError::Signer(format!(
                "key resolves to {}, config expects {}",
                signer.address(),
                config.account.address
            )));
        }

        let url = config
            .network
            .rpc_url
            .parse()
            .map_err(|e| GatewayError::Connect(format!("invalid rpc_url: {e}")))?;
        let wallet = EthereumWallet::from(signer);
        let provider = ProviderBuilder::new()
            .wallet(wallet)
            .connect_http(url)
            .erased();

        if let Some(expected) = config.network.chain_id {
            let chain_id = rt
                .block_on(provider.get_chain_id())
                .map_err(|e| GatewayError::Connect(format!("get_chain_id: {e}")))?;
            if chain_id != expected {
                return Err(GatewayError::Connect(format!(
                    "connected to chain {chain_id}, config expects {expected}"
                )));
            }
        }

        let addresses_provider = IPoolAddressesProvider::new(
            config.contracts.pool_addresses_provider,
            provider.clone(),
        );
        let pool = rt
            .block_on(addresses_provider.getPool().call().into_future())
            .map_err(|e| GatewayError::Connect(format!("getPool: {e}")))?;
        info!("Lending pool resolved to {pool}");

        Ok(Self {
            rt,
            provider,
            pool,
            router: config.contracts.swap_router,
        })
    }
}

fn to_u128(value: U256, what: &str) -> GatewayResult<u128> {
    u128::try_from(value).map_err(|_| GatewayError::BadData(format!("{what} exceeds u128")))
}

fn confirm(receipt: &TransactionReceipt, what: &str) -> GatewayResult<()> {
    if receipt.status() {
        debug!("{what}: tx {}", receipt.transaction_hash);
        Ok(())
    } else {
        Err(GatewayError::Reverted(what.to_string()))
    }
}

impl ChainGateway for EvmClient {
    fn balance_of(&self, token: Address, account: Address) -> GatewayResult<u128> {
        let erc20 = IERC20::new(token, self.provider.clone());
        let balance = self
            .rt
            .block_on(erc20.balanceOf(account).call().into_future())
            .map_err(|e| GatewayError::Rpc(format!("balanceOf({token}): {e}")))?;
        to_u128(balance, "balance")
    }

    fn latest_round(&self, feed: Address) -> GatewayResult<PriceRound> {
        let aggregator = IAggregatorV3::new(feed, self.provider.clone());
        let decimals = self
            .rt
            .block_on(aggregator.decimals().call().into_future())
            .map_err(|e| GatewayError::Rpc(format!("decimals({feed}): {e}")))?;
        let round = self
            .rt
            .block_on(aggregator.latestRoundData().call().into_future())
            .map_err(|e| GatewayError::Rpc(format!("latestRoundData({feed}): {e}")))?;

        let answer = i128::try_from(round.answer)
            .map_err(|_| GatewayError::BadData(format!("feed {feed}: answer exceeds i128")))?;
        let updated_at = u64::try_from(round.updatedAt)
            .map_err(|_| GatewayError::BadData(format!("feed {feed}: updatedAt exceeds u64")))?;

        Ok(PriceRound {
            answer,
            decimals,
            updated_at,
        })
    }

    fn allowance(&self, token: Address, owner: Address, spender: Address) -> GatewayResult<u128> {
        let erc20 = IERC20::new(token, self.provider.clone());
        let allowance = self
            .rt
            .block_on(erc20.allowance(owner, spender).call().into_future())
            .map_err(|e| GatewayError::Rpc(format!("allowance({token}): {e}")))?;
        to_u128(allowance, "allowance")
    }

    fn approve(&self, token: Address, spender: Address, amount: u128) -> GatewayResult<()> {
        let erc20 = IERC20::new(token, self.provider.clone());
        self.rt.block_on(async {
            let pending = erc20
                .approve(spender, U256::from(amount))
                .send()
                .await
                .map_err(|e| GatewayError::Rpc(format!("approve({token}, {spender}): {e}")))?;
            let receipt = pending
                .get_receipt()
                .await
                .map_err(|e| GatewayError::Rpc(format!("approve receipt: {e}")))?;
            confirm(&receipt, &format!("approve {amount} of {token} for {spender}"))
        })
    }

    fn pool_withdraw(&self, asset: Address, amount: u128, recipient: Address) -> GatewayResult<()> {
        let pool = IPool::new(self.pool, self.provider.clone());
        self.rt.block_on(async {
            let pending = pool
                .withdraw(asset, U256::from(amount), recipient)
                .send()
                .await
                .map_err(|e| GatewayError::Rpc(format!("withdraw({asset}): {e}")))?;
            let receipt = pending
                .get_receipt()
                .await
                .map_err(|e| GatewayError::Rpc(format!("withdraw receipt: {e}")))?;
            confirm(&receipt, &format!("withdraw {amount} of {asset}"))
        })
    }

    fn pool_supply(
        &self,
        asset: Address,
        amount: u128,
        on_behalf_of: Address,
        referral_code: u16,
    ) -> GatewayResult<()> {
        let pool = IPool::new(self.pool, self.provider.clone());
        self.rt.block_on(async {
            let pending = pool
                .supply(asset, U256::from(amount), on_behalf_of, referral_code)
                .send()
                .await
                .map_err(|e| GatewayError::Rpc(format!("supply({asset}): {e}")))?;
            let receipt = pending
                .get_receipt()
                .await
                .map_err(|e| GatewayError::Rpc(format!("supply receipt: {e}")))?;
            confirm(&receipt, &format!("supply {amount} of {asset}"))
        })
    }

    fn swap_exact_input_single(&self, request: &SwapRequest) -> GatewayResult<u128> {
        let router = ISwapRouter::new(self.router, self.provider.clone());
        let out_token = IERC20::new(request.token_out, self.provider.clone());

        let fee = U24::try_from(request.fee_tier).map_err(|_| {
            GatewayError::BadData(format!("fee tier {} exceeds uint24", request.fee_tier))
        })?;
        let params = ISwapRouter::ExactInputSingleParams {
            tokenIn: request.token_in,
            tokenOut: request.token_out,
            fee,
            recipient: request.recipient,
            amountIn: U256::from(request.amount_in),
            amountOutMinimum: U256::from(request.min_out),
            sqrtPriceLimitX96: U160::ZERO,
        };

        // The swap's return value is only observable by simulating; measure
        // the recipient's balance delta instead so the reported output is
        // what actually arrived.
        self.rt.block_on(async {
            let before = out_token
                .balanceOf(request.recipient)
                .call()
                .await
                .map_err(|e| GatewayError::Rpc(format!("balanceOf before swap: {e}")))?;
            let pending = router
                .exactInputSingle(params)
                .send()
                .await
                .map_err(|e| GatewayError::Rpc(format!("exactInputSingle: {e}")))?;
            let receipt = pending
                .get_receipt()
                .await
                .map_err(|e| GatewayError::Rpc(format!("swap receipt: {e}")))?;
            confirm(
                &receipt,
                &format!("swap {} -> {}", request.token_in, request.token_out),
            )?;
            let after = out_token
                .balanceOf(request.recipient)
                .call()
                .await
                .map_err(|e| GatewayError::Rpc(format!("balanceOf after swap: {e}")))?;
            to_u128(after.saturating_sub(before), "swap output")
        })
    }

    fn account_data(&self, account: Address) -> GatewayResult<UserAccountData> {
        let pool = IPool::new(self.pool, self.provider.clone());
        let data = self
            .rt
            .block_on(pool.getUserAccountData(account).call().into_future())
            .map_err(|e| GatewayError::Rpc(format!("getUserAccountData: {e}")))?;

        Ok(UserAccountData {
            total_collateral_base: to_u128(data.totalCollateralBase, "collateral")?,
            total_debt_base: to_u128(data.totalDebtBase, "debt")?,
            available_borrows_base: to_u128(data.availableBorrowsBase, "available borrows")?,
            current_liquidation_threshold: to_u128(
                data.currentLiquidationThreshold,
                "liquidation threshold",
            )?,
            ltv: to_u128(data.ltv, "ltv")?,
            // Debt-free accounts report uint256 max.
            health_factor: u128::try_from(data.healthFactor).unwrap_or(u128::MAX),
        })
    }

    fn pool_address(&self) -> Address {
        self.pool
    }

    fn router_address(&self) -> Address {
        self.router
    }
}
