//! Error types for ledger operations.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::{AccountId, TokenType};

/// Which side of a request an account lookup failed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountSide {
    /// The sending account of a transfer.
    Sender,
    /// The receiving account of a transfer.
    Receiver,
    /// A single-account lookup outside a transfer.
    Account,
}

impl fmt::Display for AccountSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountSide::Sender => write!(f, "sender"),
            AccountSide::Receiver => write!(f, "receiver"),
            AccountSide::Account => write!(f, "account"),
        }
    }
}

/// Main error type for ledger operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    /// Malformed or self-referential request.
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// Transfer amount is not strictly positive.
    #[error("Invalid amount: {0} (must be greater than zero)")]
    InvalidAmount(Decimal),

    /// Unknown sender, receiver or account.
    #[error("{side} account not found: {account_id}")]
    AccountNotFound {
        side: AccountSide,
        account_id: AccountId,
    },

    /// Sender does not hold enough of the token.
    #[error("Insufficient funds in {account_id}: required {required} {token_type}, available {available}")]
    InsufficientFunds {
        account_id: AccountId,
        token_type: TokenType,
        required: Decimal,
        available: Decimal,
    },

    /// Lock acquisition timed out.
    #[error("Account {account_id} busy, lock not acquired after {waited_ms}ms")]
    Busy { account_id: AccountId, waited_ms: u64 },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl LedgerError {
    /// Shorthand for an `InvalidRequest` with a reason.
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        LedgerError::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Shorthand for a single-account `AccountNotFound`.
    pub fn account_not_found(account_id: AccountId) -> Self {
        LedgerError::AccountNotFound {
            side: AccountSide::Account,
            account_id,
        }
    }

    /// Relabel a single-account `AccountNotFound` with the transfer side.
    pub fn on_side(self, side: AccountSide) -> Self {
        match self {
            LedgerError::AccountNotFound { account_id, .. } => {
                LedgerError::AccountNotFound { side, account_id }
            }
            other => other,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Busy { .. })
    }

    /// Get suggested retry delay in milliseconds.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            LedgerError::Busy { waited_ms, .. } => Some((*waited_ms).clamp(10, 1000)),
            _ => None,
        }
    }

    /// Get a stable error code for external status mapping.
    pub fn error_code(&self) -> &'static str {
        match self {
            LedgerError::InvalidRequest { .. } => "INVALID_REQUEST",
            LedgerError::InvalidAmount(_) => "INVALID_AMOUNT",
            LedgerError::AccountNotFound { .. } => "ACCOUNT_NOT_FOUND",
            LedgerError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            LedgerError::Busy { .. } => "BUSY",
            LedgerError::Configuration(_) => "CONFIGURATION_ERROR",
        }
    }
}

/// Result type alias for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
