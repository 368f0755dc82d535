//! TokenLedger Ledger Engine
//!
//! Concurrency-safe token ledger. Transfers lock both accounts in canonical
//! order, validate under the lock, move value atomically and append one
//! immutable record to the transaction log.

pub mod account;
pub mod balance;
pub mod config;
pub mod engine;
pub mod journal;
pub mod lock_manager;
pub mod metrics;
pub mod reconcile;
pub mod store;

pub use account::{Account, AccountStatus};
pub use balance::Holdings;
pub use config::LedgerConfig;
pub use engine::{LedgerEngine, TransferRequest, TransferResult, TransferStatus};
pub use journal::{History, TransactionLog, TransactionRecord};
pub use metrics::{Metrics, MetricsSnapshot};
pub use reconcile::ReconciliationReport;
pub use store::{AccountStore, InMemoryAccountStore};
