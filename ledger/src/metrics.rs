//! Metrics collection for ledger monitoring.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Ledger engine metrics.
pub struct Metrics {
    /// Total transfer requests.
    pub transfers_total: AtomicU64,
    /// Transfers committed.
    pub transfers_committed: AtomicU64,
    /// Requests answered from an earlier commit with the same key.
    pub transfers_replayed: AtomicU64,
    /// Transfers rejected by validation or business rules.
    pub transfers_rejected: AtomicU64,
    /// Transfers that failed on lock contention.
    pub transfers_busy: AtomicU64,
    /// Successful lock set acquisitions.
    pub locks_acquired: AtomicU64,
    /// Lock acquisition timeouts.
    pub lock_timeouts: AtomicU64,
}

impl Metrics {
    /// Create new metrics instance.
    pub fn new() -> Self {
        Self {
            transfers_total: AtomicU64::new(0),
            transfers_committed: AtomicU64::new(0),
            transfers_replayed: AtomicU64::new(0),
            transfers_rejected: AtomicU64::new(0),
            transfers_busy: AtomicU64::new(0),
            locks_acquired: AtomicU64::new(0),
            lock_timeouts: AtomicU64::new(0),
        }
    }

    pub fn transfer_initiated(&self) {
        self.transfers_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn transfer_committed(&self) {
        self.transfers_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn transfer_replayed(&self) {
        self.transfers_replayed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn transfer_rejected(&self) {
        self.transfers_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn transfer_busy(&self) {
        self.transfers_busy.fetch_add(1, Ordering::Relaxed);
    }

    pub fn lock_acquired(&self) {
        self.locks_acquired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn lock_timeout(&self) {
        self.lock_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            transfers_total: self.transfers_total.load(Ordering::Relaxed),
            transfers_committed: self.transfers_committed.load(Ordering::Relaxed),
            transfers_replayed: self.transfers_replayed.load(Ordering::Relaxed),
            transfers_rejected: self.transfers_rejected.load(Ordering::Relaxed),
            transfers_busy: self.transfers_busy.load(Ordering::Relaxed),
            locks_acquired: self.locks_acquired.load(Ordering::Relaxed),
            lock_timeouts: self.lock_timeouts.load(Ordering::Relaxed),
        }
    }

    /// Export metrics in Prometheus format.
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        format!(
            r#"# HELP tokenledger_transfers_total Total number of transfer requests
# TYPE tokenledger_transfers_total counter
tokenledger_transfers_total {}

# HELP tokenledger_transfers_committed Total committed transfers
# TYPE tokenledger_transfers_committed counter
tokenledger_transfers_committed {}

# HELP tokenledger_transfers_replayed Total idempotent replays
# TYPE tokenledger_transfers_replayed counter
tokenledger_transfers_replayed {}

# HELP tokenledger_transfers_rejected Total rejected transfers
# TYPE tokenledger_transfers_rejected counter
tokenledger_transfers_rejected {}

# HELP tokenledger_transfers_busy Total transfers failed on lock contention
# TYPE tokenledger_transfers_busy counter
tokenledger_transfers_busy {}

# HELP tokenledger_locks_acquired Total lock set acquisitions
# TYPE tokenledger_locks_acquired counter
tokenledger_locks_acquired {}

# HELP tokenledger_lock_timeouts Total lock acquisition timeouts
# TYPE tokenledger_lock_timeouts counter
tokenledger_lock_timeouts {}
"#,
            snapshot.transfers_total,
            snapshot.transfers_committed,
            snapshot.transfers_replayed,
            snapshot.transfers_rejected,
            snapshot.transfers_busy,
            snapshot.locks_acquired,
            snapshot.lock_timeouts,
        )
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    pub transfers_total: u64,
    pub transfers_committed: u64,
    pub transfers_replayed: u64,
    pub transfers_rejected: u64,
    pub transfers_busy: u64,
    pub locks_acquired: u64,
    pub lock_timeouts: u64,
}

/// Shared metrics instance.
pub type SharedMetrics = Arc<Metrics>;
