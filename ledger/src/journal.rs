//! Append-only transaction log.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use tokenledger_common::{
    now, AccountId, IdempotencyKey, Timestamp, TokenType, TransactionId,
};

/// A committed transfer. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Unique transaction ID, generated at commit.
    pub id: TransactionId,
    /// Position in the global commit order, starting at 1.
    pub sequence: u64,
    /// Debited account.
    pub from: AccountId,
    /// Credited account.
    pub to: AccountId,
    /// Token moved.
    pub token_type: TokenType,
    /// Amount moved.
    pub amount: Decimal,
    /// Key the transfer was submitted under.
    pub idempotency_key: IdempotencyKey,
    /// Commit time.
    pub timestamp: Timestamp,
}

impl TransactionRecord {
    /// Check if the account took part as sender or receiver.
    pub fn involves(&self, account_id: &AccountId) -> bool {
        &self.from == account_id || &self.to == account_id
    }

    /// Signed effect of this record on an account's balance.
    pub fn delta_for(&self, account_id: &AccountId) -> Decimal {
        if &self.from == account_id {
            -self.amount
        } else if &self.to == account_id {
            self.amount
        } else {
            Decimal::ZERO
        }
    }

    /// Check if a draft describes the same movement of value.
    pub fn matches(&self, draft: &NewRecord) -> bool {
        self.from == draft.from
            && self.to == draft.to
            && self.token_type == draft.token_type
            && self.amount == draft.amount
    }
}

/// Fields of a record before the log assigns its identity and sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
    pub from: AccountId,
    pub to: AccountId,
    pub token_type: TokenType,
    pub amount: Decimal,
    pub idempotency_key: IdempotencyKey,
}

/// Append failures.
#[derive(Debug, Error)]
pub enum AppendError {
    /// The idempotency key already belongs to a committed record.
    #[error("idempotency key {key} already committed at sequence {}", .existing.sequence)]
    Duplicate {
        key: IdempotencyKey,
        existing: Box<TransactionRecord>,
    },
}

#[derive(Debug, Default)]
struct LogInner {
    /// Records in sequence order; index `i` holds sequence `i + 1`.
    records: Vec<TransactionRecord>,
    /// Record indexes per account, ascending.
    by_account: HashMap<AccountId, Vec<usize>>,
    /// Record index per idempotency key.
    by_key: HashMap<IdempotencyKey, usize>,
}

/// Ordered, append-only history of committed transfers.
///
/// Cloning shares the same underlying log.
#[derive(Debug, Clone, Default)]
pub struct TransactionLog {
    inner: Arc<RwLock<LogInner>>,
}

impl TransactionLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record, assigning the next sequence number.
    ///
    /// The idempotency check and the sequence assignment happen in the same
    /// critical section, so a key is committed at most once.
    pub fn append(&self, draft: NewRecord) -> Result<TransactionRecord, AppendError> {
        let mut inner = self.inner.write();

        if let Some(&idx) = inner.by_key.get(&draft.idempotency_key) {
            return Err(AppendError::Duplicate {
                key: draft.idempotency_key,
                existing: Box::new(inner.records[idx].clone()),
            });
        }

        let idx = inner.records.len();
        let record = TransactionRecord {
            id: TransactionId::new(),
            sequence: idx as u64 + 1,
            from: draft.from,
            to: draft.to,
            token_type: draft.token_type,
            amount: draft.amount,
            idempotency_key: draft.idempotency_key,
            timestamp: now(),
        };

        inner.records.push(record.clone());
        inner
            .by_account
            .entry(record.from.clone())
            .or_default()
            .push(idx);
        if record.to != record.from {
            inner.by_account.entry(record.to.clone()).or_default().push(idx);
        }
        inner.by_key.insert(record.idempotency_key.clone(), idx);

        Ok(record)
    }

    /// Lazy, restartable history of one account in sequence order.
    ///
    /// The history ends at the account's last record as of this call; later
    /// appends are not observed.
    pub fn history(&self, account_id: &AccountId) -> History {
        let end = self
            .inner
            .read()
            .by_account
            .get(account_id)
            .map_or(0, Vec::len);

        History {
            inner: Arc::clone(&self.inner),
            account_id: account_id.clone(),
            cursor: 0,
            end,
        }
    }

    /// Get a record by sequence number.
    pub fn get(&self, sequence: u64) -> Option<TransactionRecord> {
        let idx = usize::try_from(sequence.checked_sub(1)?).ok()?;
        self.inner.read().records.get(idx).cloned()
    }

    /// Find the record committed under an idempotency key.
    pub fn find_by_idempotency_key(&self, key: &IdempotencyKey) -> Option<TransactionRecord> {
        let inner = self.inner.read();
        inner
            .by_key
            .get(key)
            .map(|&idx| inner.records[idx].clone())
    }

    /// Sequence number of the newest record, zero when empty.
    pub fn last_sequence(&self) -> u64 {
        self.inner.read().records.len() as u64
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    /// Check if the log is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.read().records.is_empty()
    }
}

/// Iterator over an account's records, bounded at creation time.
#[derive(Debug, Clone)]
pub struct History {
    inner: Arc<RwLock<LogInner>>,
    account_id: AccountId,
    cursor: usize,
    end: usize,
}

impl History {
    /// Rewind to the first record.
    pub fn restart(&mut self) {
        self.cursor = 0;
    }
}

impl Iterator for History {
    type Item = TransactionRecord;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.end {
            return None;
        }

        let inner = self.inner.read();
        let idx = *inner.by_account.get(&self.account_id)?.get(self.cursor)?;
        self.cursor += 1;
        inner.records.get(idx).cloned()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.end.saturating_sub(self.cursor);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for History {}
