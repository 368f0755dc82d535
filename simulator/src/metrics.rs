//! Simulation metrics.

use serde::Serialize;

use tokenledger_ledger::TransferStatus;

/// Outcome counts and latencies observed by the workers.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SimulationMetrics {
    /// Transfer submissions, retries of busy transfers excluded.
    pub total_transfers: u64,
    pub committed: u64,
    pub replayed: u64,
    pub rejected: u64,
    /// Submissions still busy after every retry.
    pub busy: u64,
    /// Busy retries performed.
    pub busy_retries: u64,
    /// Keys that committed more than once.
    pub duplicate_commits: u64,
    /// Latency samples (microseconds).
    #[serde(skip)]
    latency_samples: Vec<u64>,
}

impl SimulationMetrics {
    /// Create new metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the final status of one submission.
    pub fn record(&mut self, status: TransferStatus, latency_us: u64) {
        self.total_transfers += 1;
        match status {
            TransferStatus::Committed => self.committed += 1,
            TransferStatus::AlreadyProcessed => self.replayed += 1,
            TransferStatus::Busy => self.busy += 1,
            _ => self.rejected += 1,
        }
        self.latency_samples.push(latency_us);
    }

    pub fn record_busy_retry(&mut self) {
        self.busy_retries += 1;
    }

    pub fn record_duplicate_commit(&mut self) {
        self.duplicate_commits += 1;
    }

    /// Fold another worker's metrics into these.
    pub fn merge(&mut self, other: SimulationMetrics) {
        self.total_transfers += other.total_transfers;
        self.committed += other.committed;
        self.replayed += other.replayed;
        self.rejected += other.rejected;
        self.busy += other.busy;
        self.busy_retries += other.busy_retries;
        self.duplicate_commits += other.duplicate_commits;
        self.latency_samples.extend(other.latency_samples);
    }

    /// Get average latency in microseconds.
    pub fn average_latency_us(&self) -> u64 {
        if self.latency_samples.is_empty() {
            return 0;
        }

        let sum: u64 = self.latency_samples.iter().sum();
        sum / self.latency_samples.len() as u64
    }

    pub fn p50_latency_us(&self) -> u64 {
        self.percentile_latency(50)
    }

    pub fn p99_latency_us(&self) -> u64 {
        self.percentile_latency(99)
    }

    fn percentile_latency(&self, percentile: usize) -> u64 {
        if self.latency_samples.is_empty() {
            return 0;
        }

        let mut sorted = self.latency_samples.clone();
        sorted.sort_unstable();

        let idx = (sorted.len() * percentile / 100).min(sorted.len() - 1);
        sorted[idx]
    }

    /// Share of submissions that ended committed or replayed.
    pub fn success_rate(&self) -> f64 {
        if self.total_transfers == 0 {
            return 0.0;
        }

        (self.committed + self.replayed) as f64 / self.total_transfers as f64
    }

    /// Submissions per second.
    pub fn throughput(&self, elapsed_ms: u64) -> f64 {
        if elapsed_ms == 0 {
            return 0.0;
        }

        self.total_transfers as f64 * 1000.0 / elapsed_ms as f64
    }
}
