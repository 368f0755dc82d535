//! Simulation controller.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::{debug, info, warn};

use tokenledger_common::{IdempotencyKey, TokenType};
use tokenledger_ledger::{
    LedgerConfig, LedgerEngine, MetricsSnapshot, ReconciliationReport, TransferRequest,
    TransferResult, TransferStatus,
};

use crate::metrics::SimulationMetrics;
use crate::population::Population;
use crate::scenario::Scenario;

/// Attempts per submission while the ledger answers `Busy`.
const MAX_BUSY_ATTEMPTS: u32 = 3;

/// Load parameters.
#[derive(Debug, Clone, Copy)]
pub struct LoadSettings {
    pub workers: usize,
    pub transfers_per_worker: usize,
    pub seed: u64,
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub scenario: Scenario,
    pub seed: u64,
    pub elapsed_ms: u64,
    pub simulation: SimulationMetrics,
    pub ledger: MetricsSnapshot,
    pub log_length: usize,
    pub reconciliation: ReconciliationReport,
    /// Token types whose supply differs from the population's opening supply.
    pub supply_changed: Vec<TokenType>,
}

impl SimulationReport {
    /// Reconciliation passed and no key committed twice.
    pub fn is_consistent(&self) -> bool {
        self.reconciliation.is_consistent()
            && self.simulation.duplicate_commits == 0
            && self.log_length as u64 == self.ledger.transfers_committed
            && self.supply_changed.is_empty()
    }
}

/// Controls the simulation.
pub struct SimulationController {
    /// Ledger under test.
    engine: Arc<LedgerEngine>,
    /// Simulated accounts.
    population: Arc<Population>,
    /// Load parameters.
    settings: LoadSettings,
}

impl SimulationController {
    /// Create a new simulation controller.
    pub fn new(
        config: LedgerConfig,
        population: Population,
        settings: LoadSettings,
    ) -> anyhow::Result<Self> {
        if population.account_count() < 2 {
            anyhow::bail!("At least two accounts are required");
        }
        if population.tokens.is_empty() {
            anyhow::bail!("At least one token type is required");
        }
        if settings.workers == 0 {
            anyhow::bail!("At least one worker is required");
        }

        Ok(Self {
            engine: Arc::new(LedgerEngine::new(config)?),
            population: Arc::new(population),
            settings,
        })
    }

    /// Open every simulated account.
    pub fn initialize(&self) -> anyhow::Result<()> {
        info!(
            accounts = self.population.account_count(),
            tokens = self.population.tokens.len(),
            initial_balance = %self.population.initial_balance,
            "Initializing simulation"
        );

        self.population.open_all(&self.engine)?;
        Ok(())
    }

    /// Run a scenario to completion and check the ledger afterwards.
    pub async fn run(&self, scenario: Scenario) -> anyhow::Result<SimulationReport> {
        info!(
            scenario = scenario.name(),
            workers = self.settings.workers,
            transfers_per_worker = self.settings.transfers_per_worker,
            seed = self.settings.seed,
            "{}",
            scenario.description()
        );
        if scenario == Scenario::Contention {
            info!(hot_account = %self.population.hot_account(), "Contention target");
        }

        let start = Instant::now();

        let handles: Vec<_> = (0..self.settings.workers)
            .map(|worker| {
                let engine = Arc::clone(&self.engine);
                let population = Arc::clone(&self.population);
                let settings = self.settings;
                tokio::task::spawn_blocking(move || {
                    run_worker(&engine, &population, scenario, settings, worker)
                })
            })
            .collect();

        let mut simulation = SimulationMetrics::new();
        for handle in handles {
            simulation.merge(handle.await?);
        }
        let elapsed_ms = start.elapsed().as_millis() as u64;

        let engine = Arc::clone(&self.engine);
        let reconciliation = tokio::task::spawn_blocking(move || engine.reconcile()).await??;

        let supply_changed = self.changed_supply(&reconciliation);

        Ok(SimulationReport {
            scenario,
            seed: self.settings.seed,
            elapsed_ms,
            simulation,
            ledger: self.engine.metrics(),
            log_length: self.engine.log().len(),
            reconciliation,
            supply_changed,
        })
    }

    fn changed_supply(&self, report: &ReconciliationReport) -> Vec<TokenType> {
        let expected = self.population.opening_supply();
        self.population
            .tokens
            .iter()
            .filter(|token| report.supply.get(*token).copied().unwrap_or_default() != expected)
            .cloned()
            .collect()
    }

    /// Ledger engine, for inspection.
    pub fn engine(&self) -> &LedgerEngine {
        &self.engine
    }
}

fn run_worker(
    engine: &LedgerEngine,
    population: &Population,
    scenario: Scenario,
    settings: LoadSettings,
    worker: usize,
) -> SimulationMetrics {
    let mut rng = StdRng::seed_from_u64(settings.seed.wrapping_add(worker as u64));
    let mut metrics = SimulationMetrics::new();

    for i in 0..settings.transfers_per_worker {
        let key = IdempotencyKey::new(format!("w{worker}-t{i}"));
        let request = scenario.next_transfer(&mut rng, population, key);

        let mut commits = 0;
        for _ in 0..scenario.submissions() {
            let started = Instant::now();
            let result = submit(engine, request.clone(), &mut metrics);
            metrics.record(result.status, started.elapsed().as_micros() as u64);

            if result.status == TransferStatus::Committed {
                commits += 1;
            }
        }

        if commits > 1 {
            warn!(key = %request.idempotency_key, commits, "Idempotency key committed twice");
            metrics.record_duplicate_commit();
        }
    }

    debug!(worker, transfers = metrics.total_transfers, "Worker finished");
    metrics
}

/// Submit one transfer, backing off while the ledger reports `Busy`.
fn submit(
    engine: &LedgerEngine,
    request: TransferRequest,
    metrics: &mut SimulationMetrics,
) -> TransferResult {
    let mut attempt = 1;
    loop {
        let result = engine.transfer(request.clone());

        let retry_after = result.error.as_ref().and_then(|e| e.retry_after_ms());
        match retry_after {
            Some(ms) if attempt < MAX_BUSY_ATTEMPTS => {
                metrics.record_busy_retry();
                attempt += 1;
                std::thread::sleep(Duration::from_millis(ms));
            }
            _ => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn controller(accounts: usize, workers: usize, per_worker: usize) -> SimulationController {
        let controller = SimulationController::new(
            LedgerConfig::default(),
            Population::create(accounts, 2, dec!(100)),
            LoadSettings {
                workers,
                transfers_per_worker: per_worker,
                seed: 7,
            },
        )
        .unwrap();
        controller.initialize().unwrap();
        controller
    }

    #[tokio::test]
    async fn test_random_run_is_consistent() {
        let controller = controller(6, 4, 100);

        let report = controller.run(Scenario::Random).await.unwrap();

        assert!(report.is_consistent());
        assert!(report.supply_changed.is_empty());
        assert_eq!(report.simulation.total_transfers, 400);
        assert_eq!(report.simulation.committed, report.ledger.transfers_committed);
        assert_eq!(report.reconciliation.supply.values().sum::<rust_decimal::Decimal>(), dec!(1200));
    }

    #[tokio::test]
    async fn test_contention_run_is_consistent() {
        let controller = controller(4, 4, 50);

        let report = controller.run(Scenario::Contention).await.unwrap();

        assert!(report.is_consistent());
        assert!(report.reconciliation.negative_balances.is_empty());
    }

    #[tokio::test]
    async fn test_retry_run_commits_each_key_once() {
        let controller = controller(5, 3, 50);

        let report = controller.run(Scenario::Retry).await.unwrap();

        assert!(report.is_consistent());
        assert_eq!(report.simulation.total_transfers, 300);
        assert_eq!(report.simulation.duplicate_commits, 0);
        assert_eq!(controller.engine().log().len() as u64, report.simulation.committed);
    }

    #[tokio::test]
    async fn test_supply_drift_fails_the_report() {
        let controller = controller(3, 1, 10);
        let mut report = controller.run(Scenario::Random).await.unwrap();
        assert!(report.is_consistent());

        let gold = TokenType::new("gold");
        *report.reconciliation.supply.get_mut(&gold).unwrap() += dec!(1);
        assert_eq!(controller.changed_supply(&report.reconciliation), vec![gold]);
    }

    #[test]
    fn test_rejects_tiny_population() {
        let result = SimulationController::new(
            LedgerConfig::default(),
            Population::create(1, 1, dec!(10)),
            LoadSettings {
                workers: 1,
                transfers_per_worker: 1,
                seed: 0,
            },
        );
        assert!(result.is_err());
    }
}
