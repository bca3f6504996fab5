//! Execution orchestrator: fetch → gate → plan → confirm → execute.
//!
//! This is the main workflow that ties together all components. The swap
//! loop issues, per leg, exactly: approve receipt token to the pool,
//! withdraw the underlying, approve it to the router, swap. The first
//! failing step ends the run; later legs depend on earlier ones having
//! moved funds, so there is nothing sensible to continue with.

use alloy::primitives::Address;
use chrono::Utc;
use log::info;

use crate::allocation::AllocationSpec;
use crate::audit::{self, AuditLog};
use crate::config::{AssetConfig, Config};
use crate::drift;
use crate::error::{Error, Result};
use crate::gateway::{self, ChainGateway, PriceRound, SwapRequest};
use crate::plan::{self, Holding, SizedSwap};
use crate::risk;

/// Options for a rebalance or deposit run.
pub struct RunOptions {
    pub dry_run: bool,
    pub force: bool,
    pub allocation_file: String,
}

/// One configured asset's on-chain state.
pub struct AssetSnapshot {
    pub holding: Holding,
    pub price_round: PriceRound,
}

/// What a rebalance invocation did.
#[derive(Debug)]
pub enum RebalanceOutcome {
    /// Portfolio has zero total value; nothing to rebalance.
    NoFunds,
    /// Allocation drift within the buffer; no trades issued.
    WithinBuffer { max_drift: f64 },
    /// Drift exceeded the buffer but every leg fell below the minimum.
    NoExecutableLegs,
    /// Plan computed and displayed; no transactions sent.
    DryRun { legs: usize },
    /// User declined the confirmation prompt.
    NotConfirmed,
    /// All legs executed in order.
    Executed(Vec<SwapExecution>),
}

/// A completed swap leg.
#[derive(Debug)]
pub struct SwapExecution {
    pub leg: SizedSwap,
    pub amount_out: u128,
}

/// What a deposit invocation did.
#[derive(Debug)]
pub enum DepositOutcome {
    /// No wallet balances to supply.
    NothingToDeposit,
    /// Plan displayed; no transactions sent.
    DryRun { planned: usize },
    /// User declined the confirmation prompt.
    NotConfirmed,
    /// (symbol, amount) pairs supplied to the pool.
    Supplied(Vec<(String, u128)>),
}

/// Execute a full rebalance run against the live chain.
pub fn run(config: &Config, allocation: &AllocationSpec, opts: &RunOptions) -> Result<()> {
    let gateway = gateway::connect(config)?;
    let mut audit = AuditLog::open(&config.audit_path())?;

    let outcome = rebalance(gateway.as_ref(), config, allocation, opts, &mut audit)?;

    // Post-trade allocation report, from fresh chain state.
    if let RebalanceOutcome::Executed(_) = outcome {
        let snapshots = fetch_snapshots(gateway.as_ref(), config, config.account.address)?;
        let report = drift::measure(&to_holdings(&snapshots), &allocation.weights());
        print!("\n{report}");
    }
    Ok(())
}

/// The rebalance driver. Separated from [`run`] so tests can drive it with
/// a mock gateway.
pub fn rebalance(
    gateway: &dyn ChainGateway,
    config: &Config,
    allocation: &AllocationSpec,
    opts: &RunOptions,
    audit: &mut AuditLog,
) -> Result<RebalanceOutcome> {
    check_targets_configured(config, allocation)?;
    let account = config.account.address;
    audit::log_run_started(audit, &opts.allocation_file, &account.to_string())?;

    // 1. Fetch receipt balances and oracle prices
    let snapshots = fetch_snapshots(gateway, config, account)?;
    let holdings = to_holdings(&snapshots);
    let total = plan::total_value(&holdings);
    audit::log_holdings(audit, &holdings, total)?;

    // 2. Zero-value portfolio: rebalancing is meaningless
    if total <= 0.0 {
        println!("No deposited funds — nothing to rebalance.");
        audit.log_simple("no_funds")?;
        return Ok(RebalanceOutcome::NoFunds);
    }

    let targets = allocation.weights();
    let report = drift::measure(&holdings, &targets);
    print!("{report}");

    // 3. Buffer gate (strictly greater-than)
    if !drift::needs_rebalance(&report, config.rebalance.buffer) {
        println!(
            "\nWithin buffer ({:.1}%) — no rebalance needed.",
            config.rebalance.buffer * 100.0
        );
        audit.log(
            "no_rebalance_needed",
            serde_json::json!({
                "max_drift": report.max_drift,
                "buffer": config.rebalance.buffer,
            }),
        )?;
        return Ok(RebalanceOutcome::WithinBuffer {
            max_drift: report.max_drift,
        });
    }

    // 4. Plan: USD trades → paired legs → native sizing
    let trades = plan::compute_trades(&holdings, &targets)?;
    let legs = plan::pair_swap_legs(&trades, config.risk.min_trade_usd);
    let sized: Vec<SizedSwap> = legs
        .iter()
        .map(|leg| plan::size_leg(leg, &holdings, config.rebalance.slippage_bps))
        .collect::<Result<_>>()?;

    if sized.is_empty() {
        println!("\nDrift exceeds buffer but no leg clears the minimum trade size.");
        audit.log_simple("no_executable_legs")?;
        return Ok(RebalanceOutcome::NoExecutableLegs);
    }

    audit::log_plan(audit, &sized)?;
    display_plan(&sized);

    // 5. Risk checks
    let risk_report = risk::check_risk(
        &sized,
        &targets,
        &to_rounds(&snapshots),
        Utc::now().timestamp() as u64,
        &config.risk,
    );
    print!("\n{risk_report}");
    audit::log_risk_check(audit, &risk_report)?;

    if risk_report.has_failures() {
        return Err(Error::RiskFailed(
            "one or more risk checks failed — aborting".into(),
        ));
    }

    // 6. Dry run stops here
    if opts.dry_run {
        println!("\n[DRY RUN] No transactions sent.");
        return Ok(RebalanceOutcome::DryRun { legs: sized.len() });
    }

    // 7. Confirm execution
    if !opts.force && !confirm_execution(audit)? {
        return Ok(RebalanceOutcome::NotConfirmed);
    }

    // 8. Execute legs strictly in order
    let executions = execute_legs(gateway, config, &sized, account, audit)?;

    audit::log_run_completed(audit, executions.len())?;
    println!(
        "\n{} swap legs executed. Audit logged to {}",
        executions.len(),
        config.audit_path().display()
    );
    Ok(RebalanceOutcome::Executed(executions))
}

/// Supply wallet balances of the configured assets to the lending pool.
///
/// Approvals are only issued when the standing allowance cannot cover the
/// deposit. Ends with the pool's account health snapshot.
pub fn deposit(
    gateway: &dyn ChainGateway,
    config: &Config,
    opts: &RunOptions,
    audit: &mut AuditLog,
) -> Result<DepositOutcome> {
    let account = config.account.address;
    audit.log(
        "deposit_started",
        serde_json::json!({ "account": account.to_string() }),
    )?;

    let mut pending: Vec<(&AssetConfig, u128)> = Vec::new();
    for asset in &config.assets {
        let balance = gateway.balance_of(asset.token, account)?;
        if balance > 0 {
            pending.push((asset, balance));
        }
    }

    if pending.is_empty() {
        println!("No wallet balances to deposit.");
        audit.log_simple("nothing_to_deposit")?;
        return Ok(DepositOutcome::NothingToDeposit);
    }

    println!("DEPOSIT PLAN:");
    for (asset, balance) in &pending {
        println!(
            "  {:8} {:>16}",
            asset.symbol,
            format_units(*balance, asset.decimals)
        );
    }

    if opts.dry_run {
        println!("\n[DRY RUN] No transactions sent.");
        return Ok(DepositOutcome::DryRun {
            planned: pending.len(),
        });
    }

    if !opts.force && !confirm_execution(audit)? {
        return Ok(DepositOutcome::NotConfirmed);
    }

    let mut supplied = Vec::with_capacity(pending.len());
    for (asset, balance) in pending {
        let allowance = gateway.allowance(asset.token, account, gateway.pool_address())?;
        if allowance < balance {
            gateway.approve(asset.token, gateway.pool_address(), balance)?;
        }
        gateway.pool_supply(asset.token, balance, account, config.rebalance.referral_code)?;
        audit::log_asset_supplied(audit, &asset.symbol, balance)?;
        println!(
            "  supplied {} {}",
            format_units(balance, asset.decimals),
            asset.symbol
        );
        supplied.push((asset.symbol.clone(), balance));
    }

    let health = gateway.account_data(account)?;
    println!("\nACCOUNT HEALTH:\n{health}");
    audit::log_account_health(audit, &health)?;
    audit::log_deposit_completed(audit, supplied.len())?;

    Ok(DepositOutcome::Supplied(supplied))
}

/// Run the standalone deposit command.
pub fn run_deposit(config: &Config, opts: &RunOptions) -> Result<()> {
    let gateway = gateway::connect(config)?;
    let mut audit = AuditLog::open(&config.audit_path())?;
    deposit(gateway.as_ref(), config, opts, &mut audit)?;
    Ok(())
}

/// Deposit wallet balances, rebalance, deposit the swap proceeds, then
/// print the resulting allocation. Separated from [`run_cycle`] so tests
/// can drive it with a mock gateway.
///
/// An explicit four-phase composition, not an atomic operation: a declined
/// confirmation stops the remaining phases, and any error propagates from
/// the phase where it happened. Every other outcome (including dry runs,
/// which print each phase's plan) continues through to the final report.
pub fn cycle(
    gateway: &dyn ChainGateway,
    config: &Config,
    allocation: &AllocationSpec,
    opts: &RunOptions,
    audit: &mut AuditLog,
) -> Result<()> {
    let first = deposit(gateway, config, opts, audit)?;
    if matches!(first, DepositOutcome::NotConfirmed) {
        return Ok(());
    }

    let outcome = rebalance(gateway, config, allocation, opts, audit)?;
    if matches!(outcome, RebalanceOutcome::NotConfirmed) {
        return Ok(());
    }

    // Swap proceeds, if any, sit in the wallet; put them back to work.
    let second = deposit(gateway, config, opts, audit)?;
    if matches!(second, DepositOutcome::NotConfirmed) {
        return Ok(());
    }

    let snapshots = fetch_snapshots(gateway, config, config.account.address)?;
    let report = drift::measure(&to_holdings(&snapshots), &allocation.weights());
    print!("\n{report}");
    Ok(())
}

/// Run the full cycle against the live chain.
pub fn run_cycle(config: &Config, allocation: &AllocationSpec, opts: &RunOptions) -> Result<()> {
    let gateway = gateway::connect(config)?;
    let mut audit = AuditLog::open(&config.audit_path())?;
    cycle(gateway.as_ref(), config, allocation, opts, &mut audit)
}

/// Show deposited holdings and their current allocation.
pub fn show_holdings(config: &Config) -> Result<()> {
    let gateway = gateway::connect(config)?;
    let snapshots = fetch_snapshots(gateway.as_ref(), config, config.account.address)?;
    let holdings = to_holdings(&snapshots);
    let total = plan::total_value(&holdings);

    if total <= 0.0 {
        println!("No deposited funds.");
        return Ok(());
    }

    println!("DEPOSITED HOLDINGS:");
    for h in &holdings {
        println!(
            "  {:8} {:>16.6} @ ${:>10.2} = ${:>10.2}  ({:.1}%)",
            h.symbol,
            h.balance,
            h.price_usd,
            h.value_usd(),
            h.value_usd() / total * 100.0,
        );
    }
    println!("\n  Total: ${total:.2}");
    Ok(())
}

/// Compare current allocation against an allocation file.
pub fn show_drift(config: &Config, allocation: &AllocationSpec) -> Result<()> {
    check_targets_configured(config, allocation)?;
    let gateway = gateway::connect(config)?;
    let snapshots = fetch_snapshots(gateway.as_ref(), config, config.account.address)?;
    let report = drift::measure(&to_holdings(&snapshots), &allocation.weights());
    print!("{report}");

    if drift::needs_rebalance(&report, config.rebalance.buffer) {
        println!(
            "  Rebalance needed (drift exceeds {:.1}% buffer).",
            config.rebalance.buffer * 100.0
        );
    } else {
        println!("  Within buffer ({:.1}%).", config.rebalance.buffer * 100.0);
    }
    Ok(())
}

/// Check chain connectivity and report account state.
pub fn check_status(config: &Config) -> Result<()> {
    print!("Connecting to {} ... ", config.network.rpc_url);
    let gateway = gateway::connect(config)?;
    println!("OK");

    if let Some(chain_id) = config.network.chain_id {
        println!("Chain id:     {chain_id}");
    }
    println!("Account:      {}", config.account.address);
    println!("Lending pool: {}", gateway.pool_address());
    println!("Swap router:  {}", gateway.router_address());

    let snapshots = fetch_snapshots(gateway.as_ref(), config, config.account.address)?;
    let total = plan::total_value(&to_holdings(&snapshots));
    println!("Deposited value: ${total:.2}");

    let health = gateway.account_data(config.account.address)?;
    println!("{health}");
    Ok(())
}

// === Helpers ===

/// Fetch one snapshot per configured asset: receipt balance + price round.
fn fetch_snapshots(
    gateway: &dyn ChainGateway,
    config: &Config,
    account: Address,
) -> Result<Vec<AssetSnapshot>> {
    let mut snapshots = Vec::with_capacity(config.assets.len());
    for asset in &config.assets {
        let receipt_balance = gateway.balance_of(asset.receipt_token, account)?;
        let round = gateway.latest_round(asset.price_feed)?;
        let price_usd = plan::normalize_price(&asset.symbol, &round)?;
        snapshots.push(AssetSnapshot {
            holding: Holding {
                symbol: asset.symbol.clone(),
                balance: receipt_balance as f64 / 10f64.powi(asset.decimals as i32),
                price_usd,
                decimals: asset.decimals,
            },
            price_round: round,
        });
    }
    Ok(snapshots)
}

fn to_holdings(snapshots: &[AssetSnapshot]) -> Vec<Holding> {
    snapshots.iter().map(|s| s.holding.clone()).collect()
}

fn to_rounds(snapshots: &[AssetSnapshot]) -> Vec<(String, PriceRound)> {
    snapshots
        .iter()
        .map(|s| (s.holding.symbol.clone(), s.price_round))
        .collect()
}

fn check_targets_configured(config: &Config, allocation: &AllocationSpec) -> Result<()> {
    for target in &allocation.targets {
        if config.asset(&target.symbol).is_none() {
            return Err(Error::Allocation(format!(
                "target symbol {} is not a configured asset",
                target.symbol
            )));
        }
    }
    Ok(())
}

fn confirm_execution(audit: &mut AuditLog) -> Result<bool> {
    let confirmed = dialoguer::Confirm::new()
        .with_prompt("Execute?")
        .default(false)
        .interact()
        .map_err(|e| Error::Aborted(format!("confirmation prompt failed: {e}")))?;

    audit.log(
        "user_confirmed",
        serde_json::json!({ "approved": confirmed }),
    )?;
    if !confirmed {
        println!("Aborted.");
    }
    Ok(confirmed)
}

fn execute_legs(
    gateway: &dyn ChainGateway,
    config: &Config,
    legs: &[SizedSwap],
    account: Address,
    audit: &mut AuditLog,
) -> Result<Vec<SwapExecution>> {
    let mut executions = Vec::with_capacity(legs.len());

    for (i, leg) in legs.iter().enumerate() {
        let sell = lookup_asset(config, &leg.sell)?;
        let buy = lookup_asset(config, &leg.buy)?;

        println!(
            "[{}/{}] {} -> {} ${:.2} ...",
            i + 1,
            legs.len(),
            leg.sell,
            leg.buy,
            leg.value_usd,
        );

        // Release exactly amount_in of collateral to the wallet, then swap it.
        gateway.approve(sell.receipt_token, gateway.pool_address(), leg.amount_in)?;
        gateway.pool_withdraw(sell.token, leg.amount_in, account)?;
        audit::log_withdrawal(audit, &leg.sell, leg.amount_in)?;
        gateway.approve(sell.token, gateway.router_address(), leg.amount_in)?;

        let amount_out = gateway.swap_exact_input_single(&SwapRequest {
            token_in: sell.token,
            token_out: buy.token,
            fee_tier: config.rebalance.fee_tier,
            recipient: account,
            amount_in: leg.amount_in,
            min_out: leg.min_out,
        })?;
        audit::log_swap_executed(audit, leg, amount_out)?;
        info!(
            "Swapped {} {} for {} {}",
            format_units(leg.amount_in, sell.decimals),
            leg.sell,
            format_units(amount_out, buy.decimals),
            leg.buy,
        );
        println!(
            "    received {} {} (min {})",
            format_units(amount_out, buy.decimals),
            leg.buy,
            format_units(leg.min_out, buy.decimals),
        );

        executions.push(SwapExecution {
            leg: leg.clone(),
            amount_out,
        });
    }

    Ok(executions)
}

fn lookup_asset<'a>(config: &'a Config, symbol: &str) -> Result<&'a AssetConfig> {
    config
        .asset(symbol)
        .ok_or_else(|| Error::Config(format!("asset {symbol} missing from config")))
}

fn display_plan(legs: &[SizedSwap]) {
    println!("\nSWAP PLAN:");
    println!(
        "  {:>3}  {:8} {:8} {:>12} {:>26} {:>26}",
        "#", "Sell", "Buy", "Value", "AmountIn", "MinOut"
    );
    for (i, leg) in legs.iter().enumerate() {
        println!(
            "  {:>3}  {:8} {:8} ${:>11.2} {:>26} {:>26}",
            i + 1,
            leg.sell,
            leg.buy,
            leg.value_usd,
            leg.amount_in,
            leg.min_out,
        );
    }
}

fn format_units(amount: u128, decimals: u8) -> String {
    format!("{:.6}", amount as f64 / 10f64.powi(decimals as i32))
}
