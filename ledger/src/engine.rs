//! Core ledger engine implementation.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use tokenledger_common::{
    AccountId, AccountSide, IdempotencyKey, LedgerError, Result, TokenHolding, TokenType,
};

use crate::account::Account;
use crate::config::LedgerConfig;
use crate::journal::{AppendError, History, NewRecord, TransactionLog, TransactionRecord};
use crate::lock_manager::{canonical_order, LockedAccounts};
use crate::metrics::{Metrics, MetricsSnapshot, SharedMetrics};
use crate::reconcile::{reconcile, ReconciliationReport};
use crate::store::{AccountStore, InMemoryAccountStore};

/// A request to move one token type between two accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub sender: AccountId,
    pub receiver: AccountId,
    pub token_type: TokenType,
    pub amount: Decimal,
    pub idempotency_key: IdempotencyKey,
}

impl TransferRequest {
    /// Create a new transfer request.
    pub fn new(
        sender: impl Into<AccountId>,
        receiver: impl Into<AccountId>,
        token_type: impl Into<TokenType>,
        amount: Decimal,
        idempotency_key: impl Into<IdempotencyKey>,
    ) -> Self {
        Self {
            sender: sender.into(),
            receiver: receiver.into(),
            token_type: token_type.into(),
            amount,
            idempotency_key: idempotency_key.into(),
        }
    }

    fn to_record(&self) -> NewRecord {
        NewRecord {
            from: self.sender.clone(),
            to: self.receiver.clone(),
            token_type: self.token_type.clone(),
            amount: self.amount,
            idempotency_key: self.idempotency_key.clone(),
        }
    }
}

/// Status of a transfer, for mapping to external representations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferStatus {
    /// Transfer committed by this call.
    Committed,
    /// Key was already committed; the earlier record is returned.
    AlreadyProcessed,
    /// Malformed or self-referential request.
    InvalidRequest,
    /// Non-positive amount.
    InvalidAmount,
    /// Unknown sender or receiver.
    AccountNotFound,
    /// Sender lacks the requested amount.
    InsufficientFunds,
    /// Lock contention; retry later.
    Busy,
}

impl TransferStatus {
    /// Status corresponding to an error.
    pub fn from_error(error: &LedgerError) -> Self {
        match error {
            LedgerError::InvalidRequest { .. } | LedgerError::Configuration(_) => {
                TransferStatus::InvalidRequest
            }
            LedgerError::InvalidAmount(_) => TransferStatus::InvalidAmount,
            LedgerError::AccountNotFound { .. } => TransferStatus::AccountNotFound,
            LedgerError::InsufficientFunds { .. } => TransferStatus::InsufficientFunds,
            LedgerError::Busy { .. } => TransferStatus::Busy,
        }
    }

    /// Check if the value moved (now or by an earlier call).
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            TransferStatus::Committed | TransferStatus::AlreadyProcessed
        )
    }

    /// Check if the caller may retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransferStatus::Busy)
    }
}

/// Structured result of a transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferResult {
    pub status: TransferStatus,
    /// Record of the committed transfer, present on success.
    pub record: Option<TransactionRecord>,
    /// Cause of failure, present otherwise.
    pub error: Option<LedgerError>,
}

impl TransferResult {
    fn committed(record: TransactionRecord) -> Self {
        Self {
            status: TransferStatus::Committed,
            record: Some(record),
            error: None,
        }
    }

    fn replayed(record: TransactionRecord) -> Self {
        Self {
            status: TransferStatus::AlreadyProcessed,
            record: Some(record),
            error: None,
        }
    }

    fn failed(error: LedgerError) -> Self {
        Self {
            status: TransferStatus::from_error(&error),
            record: None,
            error: Some(error),
        }
    }

    /// Check if the transfer is committed.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Convert into a `Result`, yielding the record on success.
    pub fn into_result(self) -> Result<TransactionRecord> {
        match (self.record, self.error) {
            (Some(record), _) => Ok(record),
            (None, Some(error)) => Err(error),
            (None, None) => Err(LedgerError::invalid_request("transfer produced no record")),
        }
    }
}

enum Outcome {
    Committed(TransactionRecord),
    Replayed(TransactionRecord),
}

/// The ledger engine validates and atomically executes transfers.
pub struct LedgerEngine<S: AccountStore = InMemoryAccountStore> {
    /// Account balances.
    store: Arc<S>,
    /// Committed transfers.
    log: TransactionLog,
    /// Configuration.
    config: LedgerConfig,
    /// Counters.
    metrics: SharedMetrics,
}

impl LedgerEngine<InMemoryAccountStore> {
    /// Create an engine over a fresh in-memory store.
    pub fn new(config: LedgerConfig) -> Result<Self> {
        Self::with_store(Arc::new(InMemoryAccountStore::new()), config)
    }
}

impl<S: AccountStore> LedgerEngine<S> {
    /// Create an engine over an existing store.
    pub fn with_store(store: Arc<S>, config: LedgerConfig) -> Result<Self> {
        config.validate().map_err(LedgerError::Configuration)?;

        Ok(Self {
            store,
            log: TransactionLog::new(),
            config,
            metrics: Arc::new(Metrics::new()),
        })
    }

    /// Register an account with its opening holdings.
    pub fn open_account(&self, account: Account) -> Result<()> {
        self.store.open_account(account)
    }

    /// Soft-delete an account.
    pub fn close_account(&self, account_id: &AccountId) -> Result<()> {
        self.store.close_account(account_id, self.config.lock_timeout)?;
        info!(account = %account_id, "Account closed");
        Ok(())
    }

    /// Move `amount` of one token from sender to receiver.
    ///
    /// Either the whole transfer commits, or nothing is mutated.
    #[instrument(
        skip(self, request),
        fields(
            sender = %request.sender,
            receiver = %request.receiver,
            token = %request.token_type,
            key = %request.idempotency_key
        )
    )]
    pub fn transfer(&self, request: TransferRequest) -> TransferResult {
        self.metrics.transfer_initiated();

        match self.execute(&request) {
            Ok(Outcome::Committed(record)) => {
                self.metrics.transfer_committed();
                info!(
                    sequence = record.sequence,
                    transaction_id = %record.id,
                    amount = %record.amount,
                    "Transfer committed"
                );
                TransferResult::committed(record)
            }
            Ok(Outcome::Replayed(record)) => {
                self.metrics.transfer_replayed();
                debug!(sequence = record.sequence, "Transfer already processed");
                TransferResult::replayed(record)
            }
            Err(error) => {
                if error.is_retryable() {
                    self.metrics.transfer_busy();
                } else {
                    self.metrics.transfer_rejected();
                }
                debug!(code = error.error_code(), error = %error, "Transfer failed");
                TransferResult::failed(error)
            }
        }
    }

    fn execute(&self, request: &TransferRequest) -> Result<Outcome> {
        if request.sender == request.receiver {
            return Err(LedgerError::invalid_request(
                "sender and receiver must be different",
            ));
        }

        if request.amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(request.amount));
        }

        let sender = self
            .snapshot(&request.sender)
            .map_err(|e| e.on_side(AccountSide::Sender))?;
        let receiver = self
            .snapshot(&request.receiver)
            .map_err(|e| e.on_side(AccountSide::Receiver))?;

        if let Some(existing) = self.log.find_by_idempotency_key(&request.idempotency_key) {
            return Ok(self.replay(request, existing));
        }

        Self::check_can_send(&sender, request)?;
        Self::check_active(&receiver)?;

        self.commit(request)
    }

    /// Re-validate and apply under both account locks.
    ///
    /// Both new balances are computed before the record is appended, and
    /// balances change only after the append succeeds, so every failure
    /// leaves both accounts untouched.
    fn commit(&self, request: &TransferRequest) -> Result<Outcome> {
        let ids = canonical_order(&[request.sender.clone(), request.receiver.clone()]);
        let log = &self.log;

        self.locked(&ids, self.config.lock_timeout, |locked| {
            if let Some(existing) = log.find_by_idempotency_key(&request.idempotency_key) {
                return Ok(Outcome::Replayed(existing));
            }

            let (sender, receiver) = locked.pair_mut(&request.sender, &request.receiver)?;
            Self::check_can_send(sender, request)?;
            Self::check_active(receiver)?;

            let token = &request.token_type;
            let sender_after = sender.holdings.debited(&request.sender, token, request.amount)?;
            let receiver_after = receiver.holdings.credited(token, request.amount)?;

            match log.append(request.to_record()) {
                Ok(record) => {
                    sender.holdings.set(token, sender_after);
                    sender.touch();
                    receiver.holdings.set(token, receiver_after);
                    receiver.touch();
                    Ok(Outcome::Committed(record))
                }
                // Same key committed concurrently on other accounts; nothing
                // has been applied here yet.
                Err(AppendError::Duplicate { existing, .. }) => Ok(self.replay(request, *existing)),
            }
        })
    }

    fn snapshot(&self, account_id: &AccountId) -> Result<Account> {
        self.locked(std::slice::from_ref(account_id), self.config.lock_timeout, |locked| {
            Ok(locked.get(account_id)?.clone())
        })
    }

    /// Run `f` under the store's ordered locks, counting acquisitions.
    fn locked<T, F>(&self, ids: &[AccountId], timeout: Duration, f: F) -> Result<T>
    where
        F: FnOnce(&mut LockedAccounts<'_>) -> Result<T>,
    {
        let mut acquired = false;
        let result = self.store.with_locked(ids, timeout, |locked| {
            acquired = true;
            f(locked)
        });

        if acquired {
            self.metrics.lock_acquired();
        } else if matches!(result, Err(LedgerError::Busy { .. })) {
            self.metrics.lock_timeout();
        }
        result
    }

    fn replay(&self, request: &TransferRequest, existing: TransactionRecord) -> Outcome {
        if !existing.matches(&request.to_record()) {
            warn!(
                sequence = existing.sequence,
                "Idempotency key reused with different parameters; returning prior result"
            );
        }
        Outcome::Replayed(existing)
    }

    fn check_active(account: &Account) -> Result<()> {
        if !account.can_transact() {
            return Err(LedgerError::invalid_request(format!(
                "account {} is closed",
                account.id
            )));
        }
        Ok(())
    }

    fn check_can_send(sender: &Account, request: &TransferRequest) -> Result<()> {
        Self::check_active(sender)?;

        let available = sender.balance(&request.token_type);
        if available < request.amount {
            return Err(LedgerError::InsufficientFunds {
                account_id: request.sender.clone(),
                token_type: request.token_type.clone(),
                required: request.amount,
                available,
            });
        }
        Ok(())
    }

    /// Balance of one token in an account.
    pub fn balance(&self, account_id: &AccountId, token_type: &TokenType) -> Result<Decimal> {
        Ok(self
            .store
            .get_account(account_id, self.config.lock_timeout)?
            .balance(token_type))
    }

    /// All token entries of an account.
    pub fn holdings(&self, account_id: &AccountId) -> Result<Vec<TokenHolding>> {
        Ok(self
            .store
            .get_account(account_id, self.config.lock_timeout)?
            .holdings
            .to_holdings())
    }

    /// History of an account in commit order.
    pub fn history(&self, account_id: &AccountId) -> Result<History> {
        if !self.store.contains(account_id) {
            return Err(LedgerError::account_not_found(account_id.clone()));
        }
        Ok(self.log.history(account_id))
    }

    /// Record by sequence number.
    pub fn record(&self, sequence: u64) -> Option<TransactionRecord> {
        self.log.get(sequence)
    }

    /// Record committed under an idempotency key.
    pub fn find_by_idempotency_key(&self, key: &IdempotencyKey) -> Option<TransactionRecord> {
        self.log.find_by_idempotency_key(key)
    }

    /// Check balances against the log, with every account locked.
    #[instrument(skip(self))]
    pub fn reconcile(&self) -> Result<ReconciliationReport> {
        let ids = self.store.account_ids();
        let log = &self.log;

        let report = self.locked(&ids, self.config.reconcile_timeout, |locked| {
            Ok(reconcile(locked.iter(), log))
        })?;

        if report.is_consistent() {
            info!(
                accounts = report.accounts_checked,
                last_sequence = report.last_sequence,
                "Ledger reconciled"
            );
        } else {
            warn!(
                account_mismatches = report.account_mismatches.len(),
                supply_mismatches = report.supply_mismatches.len(),
                negative_balances = report.negative_balances.len(),
                "Ledger reconciliation found discrepancies"
            );
        }
        Ok(report)
    }

    /// Current metrics.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Shared metrics handle, e.g. for export.
    pub fn shared_metrics(&self) -> SharedMetrics {
        Arc::clone(&self.metrics)
    }

    /// Underlying account store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Underlying transaction log.
    pub fn log(&self) -> &TransactionLog {
        &self.log
    }

    /// Engine configuration.
    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }
}
