//! Ledger configuration.

use std::time::Duration;

use tokenledger_common::constants;

/// Main ledger configuration.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Bound on waiting for the account locks of one transfer.
    pub lock_timeout: Duration,
    /// Upper limit accepted for `lock_timeout`.
    pub max_lock_timeout: Duration,
    /// Bound on locking every account for reconciliation.
    pub reconcile_timeout: Duration,
    /// Log level.
    pub log_level: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            lock_timeout: constants::default_lock_timeout(),
            max_lock_timeout: constants::max_lock_timeout(),
            reconcile_timeout: Duration::from_secs(5),
            log_level: "info".to_string(),
        }
    }
}

impl LedgerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(ms) = std::env::var("LEDGER_LOCK_TIMEOUT_MS") {
            if let Ok(ms) = ms.parse() {
                config.lock_timeout = Duration::from_millis(ms);
            }
        }

        if let Ok(ms) = std::env::var("LEDGER_RECONCILE_TIMEOUT_MS") {
            if let Ok(ms) = ms.parse() {
                config.reconcile_timeout = Duration::from_millis(ms);
            }
        }

        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.log_level = level;
        }

        config
    }

    /// Set the lock timeout.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.lock_timeout.is_zero() {
            return Err("Lock timeout cannot be 0".to_string());
        }

        if self.lock_timeout > self.max_lock_timeout {
            return Err("Lock timeout cannot exceed max lock timeout".to_string());
        }

        if self.reconcile_timeout.is_zero() {
            return Err("Reconcile timeout cannot be 0".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LedgerConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let config = LedgerConfig::default().with_lock_timeout(Duration::ZERO);
        assert!(config.validate().is_err());

        let config = LedgerConfig::default().with_lock_timeout(Duration::from_secs(3600));
        assert!(config.validate().is_err());
    }
}
