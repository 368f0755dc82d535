//! Account store: the only owner of account balances.

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::info;

use tokenledger_common::{AccountId, LedgerError, Result};

use crate::account::Account;
use crate::lock_manager::{canonical_order, AccountHandle, LockedAccounts};

/// Storage of accounts with scoped, ordered locking.
///
/// The ledger engine is generic over this trait so it can run against a fake
/// store in tests.
pub trait AccountStore: Send + Sync {
    /// Register a new account. Fails if the id is already taken.
    fn open_account(&self, account: Account) -> Result<()>;

    /// Consistent snapshot of one account, waiting at most `timeout` for its
    /// lock.
    fn get_account(&self, account_id: &AccountId, timeout: Duration) -> Result<Account>;

    /// Check if an account exists.
    fn contains(&self, account_id: &AccountId) -> bool;

    /// All known account ids in canonical order.
    fn account_ids(&self) -> Vec<AccountId>;

    /// Run `f` with every account in `ids` locked.
    ///
    /// Locks are acquired in canonical order under one shared `timeout` and
    /// released on every exit path, including errors returned by `f`.
    fn with_locked<T, F>(&self, ids: &[AccountId], timeout: Duration, f: F) -> Result<T>
    where
        F: FnOnce(&mut LockedAccounts<'_>) -> Result<T>;

    /// Soft-delete an account. Its balances and history are kept.
    fn close_account(&self, account_id: &AccountId, timeout: Duration) -> Result<()> {
        self.with_locked(std::slice::from_ref(account_id), timeout, |locked| {
            locked.get_mut(account_id)?.close();
            Ok(())
        })
    }
}

/// In-memory account store backed by per-account mutexes.
pub struct InMemoryAccountStore {
    accounts: DashMap<AccountId, AccountHandle>,
}

impl InMemoryAccountStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            accounts: DashMap::new(),
        }
    }

    /// Number of accounts.
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// Check if the store has no accounts.
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    fn handle(&self, account_id: &AccountId) -> Result<AccountHandle> {
        self.accounts
            .get(account_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| LedgerError::account_not_found(account_id.clone()))
    }
}

impl Default for InMemoryAccountStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AccountStore for InMemoryAccountStore {
    fn open_account(&self, account: Account) -> Result<()> {
        if !account.id.is_valid() {
            return Err(LedgerError::invalid_request(format!(
                "malformed account id: {:?}",
                account.id.as_str()
            )));
        }
        if !account.holdings.is_non_negative() {
            return Err(LedgerError::invalid_request(format!(
                "account {} opened with a negative balance",
                account.id
            )));
        }

        match self.accounts.entry(account.id.clone()) {
            Entry::Occupied(_) => Err(LedgerError::invalid_request(format!(
                "account {} already exists",
                account.id
            ))),
            Entry::Vacant(slot) => {
                info!(account = %account.id, tokens = account.holdings.len(), "Account opened");
                slot.insert(Arc::new(Mutex::new(account)));
                Ok(())
            }
        }
    }

    fn get_account(&self, account_id: &AccountId, timeout: Duration) -> Result<Account> {
        let handle = self.handle(account_id)?;
        let account = handle
            .try_lock_for(timeout)
            .ok_or_else(|| LedgerError::Busy {
                account_id: account_id.clone(),
                waited_ms: timeout.as_millis() as u64,
            })?
            .clone();
        Ok(account)
    }

    fn contains(&self, account_id: &AccountId) -> bool {
        self.accounts.contains_key(account_id)
    }

    fn account_ids(&self) -> Vec<AccountId> {
        let ids: Vec<AccountId> = self.accounts.iter().map(|e| e.key().clone()).collect();
        canonical_order(&ids)
    }

    fn with_locked<T, F>(&self, ids: &[AccountId], timeout: Duration, f: F) -> Result<T>
    where
        F: FnOnce(&mut LockedAccounts<'_>) -> Result<T>,
    {
        // Handles are cloned out first so no map shard is held while waiting.
        let handles = canonical_order(ids)
            .into_iter()
            .map(|id| self.handle(&id).map(|handle| (id, handle)))
            .collect::<Result<Vec<_>>>()?;

        let mut locked = LockedAccounts::acquire(&handles, timeout)?;
        f(&mut locked)
    }
}
