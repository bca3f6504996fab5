//! CLI entry point for the Aave rebalancer.

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};

use aave_rebalancer::allocation::AllocationSpec;
use aave_rebalancer::config::Config;
use aave_rebalancer::error::Error;
use aave_rebalancer::execution::{self, RunOptions};

#[derive(Parser)]
#[command(name = "rebalancer")]
#[command(about = "Target-weight rebalancer for Aave v3 deposits via Uniswap V3")]
#[command(version)]
struct Cli {
    /// Path to config.toml
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compute the swap plan, confirm, and execute it
    Run {
        /// Path to allocation.json
        allocation: PathBuf,

        /// Show plan without executing
        #[arg(long)]
        dry_run: bool,

        /// Skip confirmation prompt (for automation/cron)
        #[arg(long)]
        force: bool,
    },

    /// Supply wallet balances of the configured assets to the lending pool
    Deposit {
        /// Show plan without executing
        #[arg(long)]
        dry_run: bool,

        /// Skip confirmation prompt (for automation/cron)
        #[arg(long)]
        force: bool,
    },

    /// Deposit, rebalance, then deposit the swap proceeds
    Cycle {
        /// Path to allocation.json
        allocation: PathBuf,

        /// Show plans without executing
        #[arg(long)]
        dry_run: bool,

        /// Skip confirmation prompts (for automation/cron)
        #[arg(long)]
        force: bool,
    },

    /// Show deposited holdings and their current allocation
    Holdings,

    /// Compare current allocation against an allocation file
    Drift {
        /// Path to allocation.json
        allocation: PathBuf,
    },

    /// Check chain connectivity and report account state
    Status,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {e}");
            process::exit(1);
        }
    };

    let result = match cli.command {
        Command::Run {
            allocation,
            dry_run,
            force,
        } => {
            let spec = load_allocation(&allocation);
            let opts = RunOptions {
                dry_run,
                force,
                allocation_file: allocation.display().to_string(),
            };
            execution::run(&config, &spec, &opts)
        }
        Command::Deposit { dry_run, force } => {
            let opts = RunOptions {
                dry_run,
                force,
                allocation_file: String::new(),
            };
            execution::run_deposit(&config, &opts)
        }
        Command::Cycle {
            allocation,
            dry_run,
            force,
        } => {
            let spec = load_allocation(&allocation);
            let opts = RunOptions {
                dry_run,
                force,
                allocation_file: allocation.display().to_string(),
            };
            execution::run_cycle(&config, &spec, &opts)
        }
        Command::Holdings => execution::show_holdings(&config),
        Command::Drift { allocation } => {
            let spec = load_allocation(&allocation);
            execution::show_drift(&config, &spec)
        }
        Command::Status => execution::check_status(&config),
    };

    if let Err(e) = result {
        match &e {
            Error::RiskFailed(msg) => {
                eprintln!("\nAborted: {msg}");
                process::exit(2);
            }
            Error::Aborted(msg) => {
                eprintln!("{msg}");
                process::exit(0);
            }
            _ => {
                eprintln!("Error: {e}");
                process::exit(1);
            }
        }
    }
}

fn load_allocation(path: &Path) -> AllocationSpec {
    match AllocationSpec::load(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error loading allocation: {e}");
            process::exit(1);
        }
    }
}
