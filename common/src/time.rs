//! Time utilities and constants for the ledger.

use chrono::{DateTime, Utc};

/// Ledger timing constants.
pub mod constants {
    use std::time::Duration;

    /// Default bound on waiting for account locks (500 milliseconds).
    pub fn default_lock_timeout() -> Duration {
        Duration::from_millis(500)
    }

    /// Maximum configurable lock wait (30 seconds).
    pub fn max_lock_timeout() -> Duration {
        Duration::from_secs(30)
    }
}

/// A timestamp with timezone (always UTC).
pub type Timestamp = DateTime<Utc>;

/// Get the current timestamp.
pub fn now() -> Timestamp {
    Utc::now()
}

/// Deadline for acquiring a set of locks.
///
/// The wait budget is shared across every lock in the set, so a transfer
/// never waits longer than one timeout in total.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: std::time::Instant,
    budget: std::time::Duration,
}

impl Deadline {
    /// Start a deadline of `budget` from now.
    pub fn after(budget: std::time::Duration) -> Self {
        Self {
            started: std::time::Instant::now(),
            budget,
        }
    }

    /// Remaining wait time, zero once exceeded.
    pub fn remaining(&self) -> std::time::Duration {
        self.budget.saturating_sub(self.started.elapsed())
    }

    /// Time spent waiting so far, in milliseconds.
    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}
