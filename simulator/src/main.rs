//! TokenLedger Simulator
//!
//! Drives concurrent transfers against an in-memory ledger and checks that
//! balances still reconcile with the transaction log afterwards.

use std::time::Duration;

use clap::Parser;
use rust_decimal::Decimal;
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod controller;
mod metrics;
mod population;
mod scenario;

use tokenledger_ledger::LedgerConfig;

use controller::{LoadSettings, SimulationController};
use population::Population;
use scenario::Scenario;

/// TokenLedger Simulator CLI
#[derive(Parser, Debug)]
#[command(name = "simulator")]
#[command(about = "Concurrent load simulator for the TokenLedger engine")]
struct Args {
    /// Number of accounts to open
    #[arg(short, long, default_value = "16")]
    accounts: usize,

    /// Number of concurrent workers
    #[arg(short, long, default_value = "8")]
    workers: usize,

    /// Transfers issued by each worker
    #[arg(short, long, default_value = "1000")]
    transfers: usize,

    /// Number of token types per account
    #[arg(long, default_value = "2")]
    tokens: usize,

    /// Opening balance of each token in each account
    #[arg(long, default_value = "1000")]
    initial_balance: u64,

    /// Scenario to run: random, contention or retry
    #[arg(short, long, default_value = "random")]
    scenario: String,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,

    /// Lock timeout in milliseconds (overrides LEDGER_LOCK_TIMEOUT_MS)
    #[arg(long)]
    lock_timeout_ms: Option<u64>,

    /// Emit JSON logs and a JSON report
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = LedgerConfig::from_env();
    if let Some(ms) = args.lock_timeout_ms {
        config = config.with_lock_timeout(Duration::from_millis(ms));
    }

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone()),
        ))
        .with(args.json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!args.json).then(tracing_subscriber::fmt::layer))
        .init();

    config.validate().map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    let scenario = Scenario::load(&args.scenario)?;
    let seed = args.seed.unwrap_or_else(rand::random);

    info!("Starting TokenLedger Simulator");
    info!(lock_timeout_ms = config.lock_timeout.as_millis() as u64, seed, "Configuration loaded");

    let population = Population::create(
        args.accounts,
        args.tokens,
        Decimal::from(args.initial_balance),
    );
    let controller = SimulationController::new(
        config,
        population,
        LoadSettings {
            workers: args.workers,
            transfers_per_worker: args.transfers,
            seed,
        },
    )?;

    controller.initialize()?;
    let report = controller.run(scenario).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let metrics = &report.simulation;
        info!("Simulation complete");
        info!("Total transfers: {}", metrics.total_transfers);
        info!("Committed: {}", metrics.committed);
        info!("Replayed: {}", metrics.replayed);
        info!("Rejected: {}", metrics.rejected);
        info!("Busy: {} ({} retries)", metrics.busy, metrics.busy_retries);
        info!("Success rate: {:.2}%", metrics.success_rate() * 100.0);
        info!("Throughput: {:.0} transfers/s", metrics.throughput(report.elapsed_ms));
        info!(
            "Latency: avg {}us, p50 {}us, p99 {}us",
            metrics.average_latency_us(),
            metrics.p50_latency_us(),
            metrics.p99_latency_us()
        );
        info!(
            accounts = report.reconciliation.accounts_checked,
            last_sequence = report.reconciliation.last_sequence,
            "Reconciliation finished"
        );
        debug!("\n{}", controller.engine().shared_metrics().to_prometheus());
    }

    if !report.is_consistent() {
        error!(
            account_mismatches = report.reconciliation.account_mismatches.len(),
            supply_mismatches = report.reconciliation.supply_mismatches.len(),
            negative_balances = report.reconciliation.negative_balances.len(),
            supply_changed = report.supply_changed.len(),
            duplicate_commits = report.simulation.duplicate_commits,
            "Ledger is inconsistent"
        );
        anyhow::bail!("Ledger failed reconciliation");
    }

    Ok(())
}
