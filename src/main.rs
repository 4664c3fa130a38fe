use std::{
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
};

use burn_ledger::{
    contracts::ContractState, BurnContract, BurnLedger, CallContext, Clock, ContractAction,
    ContractError, ContractOutcome, LedgerConfig, ManualClock, SystemClock,
};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "burn-ledger",
    version,
    about = "Record burns and read time-matured reward counts"
)]
struct Cli {
    /// Contract state file, created on first write
    #[arg(long, global = true, default_value = "burn-ledger.json")]
    state: PathBuf,

    /// JSON ledger config; BURN_LEDGER_* environment variables override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Assign the contract owner (once)
    Init {
        #[arg(long)]
        caller: String,
        /// Defaults to the caller
        #[arg(long)]
        owner: Option<String>,
    },
    /// Allow an account to burn under the pre_registered policy
    Register {
        #[arg(long)]
        caller: String,
        #[arg(long)]
        account: String,
    },
    /// Burn `amount` on behalf of the caller
    Burn {
        #[arg(long)]
        caller: String,
        #[arg(long, allow_negative_numbers = true)]
        amount: i128,
    },
    /// Number of matured burns of an account
    Rewards {
        #[arg(long)]
        account: String,
    },
    /// Matured burns of an account
    Claims {
        #[arg(long)]
        account: String,
    },
    /// Burns still inside the maturation window
    Pending {
        #[arg(long)]
        account: String,
    },
    /// Ledger diagnostics
    Status,
    /// Check the state file's merkle root and consistency
    Verify,
    /// Replay burn(500), burn(10), burn(20), burn(30) on a manual clock
    Scenario {
        #[arg(long, default_value = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266")]
        account: String,
        /// Simulated wait before reading rewards
        #[arg(long, default_value_t = 6_000)]
        wait_ms: u64,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] burn_ledger::ConfigError),
    #[error(transparent)]
    Contract(#[from] ContractError),
    #[error(transparent)]
    Ledger(#[from] burn_ledger::LedgerError),
    #[error("cannot encode output: {0}")]
    Output(#[from] serde_json::Error),
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "burn_ledger=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<LedgerConfig, CliError> {
    let config = match path {
        Some(path) => LedgerConfig::from_file(path)?,
        None => LedgerConfig::default(),
    };
    Ok(config.apply_env()?)
}

fn open_contract<C: Clock>(
    state: &Path,
    config: LedgerConfig,
    clock: C,
) -> Result<BurnContract<C>, CliError> {
    if state.exists() {
        let saved = ContractState::load(state)?;
        debug!(path = %state.display(), "loaded contract state");
        Ok(BurnContract::restore(saved, config, clock)?)
    } else {
        Ok(BurnContract::new(BurnLedger::new(config, clock)))
    }
}

/// Applies one action against the state file. The file is only rewritten
/// when `persist` is set and the action succeeded.
fn execute<C: Clock>(
    state: &Path,
    config: LedgerConfig,
    clock: C,
    ctx: &CallContext,
    action: ContractAction,
    persist: bool,
) -> Result<ContractOutcome, CliError> {
    let contract = open_contract(state, config, clock)?;
    let outcome = contract.apply_action(ctx, action)?;
    if persist {
        contract.state().save(state)?;
        debug!(path = %state.display(), "saved contract state");
    }
    Ok(outcome)
}

fn print_outcome(outcome: &ContractOutcome) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(outcome)?);
    Ok(())
}

fn scenario(config: LedgerConfig, account: &str, wait_ms: u64) -> Result<(), CliError> {
    let clock = Arc::new(ManualClock::new(0));
    let contract = BurnContract::new(BurnLedger::new(config, Arc::clone(&clock)));
    let signer = CallContext::new(account);

    println!("t1: {}", serde_json::to_string(&contract.t1())?);
    for amount in [500, 10, 20, 30] {
        contract.burn(&signer, amount)?;
    }
    println!("rewardsCount before wait: {}", contract.rewards_count(account)?);
    clock.advance(wait_ms);
    println!("rewardsCount after {wait_ms} ms: {}", contract.rewards_count(account)?);
    Ok(())
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = load_config(cli.config.as_ref())?;

    let (ctx, action, persist) = match &cli.command {
        Command::Scenario { account, wait_ms } => return scenario(config, account, *wait_ms),
        Command::Verify => {
            let state = ContractState::load(&cli.state)?;
            let contract = BurnContract::restore(state, config, SystemClock)?;
            let status = contract.t1();
            info!(root = %status.merkle_root, "state verified");
            println!("ok {}", status.merkle_root);
            return Ok(());
        }
        Command::Init { caller, owner } => (
            CallContext::new(caller.as_str()),
            ContractAction::Initialize {
                owner: owner.clone().unwrap_or_else(|| caller.clone()),
            },
            true,
        ),
        Command::Register { caller, account } => (
            CallContext::new(caller.as_str()),
            ContractAction::Register {
                account: account.clone(),
            },
            true,
        ),
        Command::Burn { caller, amount } => (
            CallContext::new(caller.as_str()),
            ContractAction::Burn { amount: *amount },
            true,
        ),
        Command::Rewards { account } => (
            CallContext::new(account.as_str()),
            ContractAction::RewardsCount {
                account: account.clone(),
            },
            false,
        ),
        Command::Claims { account } => (
            CallContext::new(account.as_str()),
            ContractAction::ClaimList {
                account: account.clone(),
            },
            false,
        ),
        Command::Pending { account } => (
            CallContext::new(account.as_str()),
            ContractAction::Pending {
                account: account.clone(),
            },
            false,
        ),
        Command::Status => (CallContext::new("cli"), ContractAction::Status, false),
    };

    let outcome = execute(&cli.state, config, SystemClock, &ctx, action, persist)?;
    print_outcome(&outcome)
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
