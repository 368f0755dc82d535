//! Ordered, bounded acquisition of account locks.
//!
//! Every multi-account lock is taken in ascending [`AccountId`] order. Two
//! transfers over overlapping accounts therefore always contend on the
//! lowest shared account first and can never wait on each other in a cycle.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, warn};

use tokenledger_common::{AccountId, Deadline, LedgerError, Result};

use crate::account::Account;

/// A shared, individually lockable account slot.
pub type AccountHandle = Arc<Mutex<Account>>;

/// Accounts held under lock for the duration of a closure.
///
/// Guards are released when this value is dropped, on every exit path.
pub struct LockedAccounts<'a> {
    /// Guards sorted by account id.
    guards: Vec<MutexGuard<'a, Account>>,
}

impl<'a> LockedAccounts<'a> {
    /// Lock `handles` in order, sharing one deadline across all of them.
    ///
    /// `handles` must already be sorted by account id and free of duplicates.
    /// If any lock is not acquired in time, locks taken so far are released
    /// and `Busy` names the account that could not be locked.
    pub fn acquire(handles: &'a [(AccountId, AccountHandle)], timeout: Duration) -> Result<Self> {
        debug_assert!(handles.windows(2).all(|w| w[0].0 < w[1].0));

        let deadline = Deadline::after(timeout);
        let mut guards = Vec::with_capacity(handles.len());

        for (account_id, handle) in handles {
            match handle.try_lock_for(deadline.remaining()) {
                Some(guard) => guards.push(guard),
                None => {
                    warn!(
                        account = %account_id,
                        held = guards.len(),
                        waited_ms = deadline.elapsed_ms(),
                        "Lock acquisition timed out"
                    );
                    return Err(LedgerError::Busy {
                        account_id: account_id.clone(),
                        waited_ms: deadline.elapsed_ms(),
                    });
                }
            }
        }

        debug!(count = guards.len(), "Account locks acquired");
        Ok(Self { guards })
    }

    fn position(&self, account_id: &AccountId) -> Result<usize> {
        self.guards
            .binary_search_by(|guard| guard.id.cmp(account_id))
            .map_err(|_| LedgerError::account_not_found(account_id.clone()))
    }

    /// Borrow a locked account.
    pub fn get(&self, account_id: &AccountId) -> Result<&Account> {
        let idx = self.position(account_id)?;
        Ok(&*self.guards[idx])
    }

    /// Mutably borrow a locked account.
    pub fn get_mut(&mut self, account_id: &AccountId) -> Result<&mut Account> {
        let idx = self.position(account_id)?;
        Ok(&mut *self.guards[idx])
    }

    /// Mutably borrow two distinct locked accounts at once.
    pub fn pair_mut(
        &mut self,
        first: &AccountId,
        second: &AccountId,
    ) -> Result<(&mut Account, &mut Account)> {
        let i = self.position(first)?;
        let j = self.position(second)?;
        if i == j {
            return Err(LedgerError::invalid_request(format!(
                "account {} borrowed twice",
                first
            )));
        }

        let (low, high) = self.guards.split_at_mut(i.max(j));
        let lower = &mut *low[i.min(j)];
        let upper = &mut *high[0];
        if i < j {
            Ok((lower, upper))
        } else {
            Ok((upper, lower))
        }
    }

    /// Iterate over locked accounts in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = &Account> {
        self.guards.iter().map(|guard| &**guard)
    }

    /// Number of locked accounts.
    pub fn len(&self) -> usize {
        self.guards.len()
    }

    /// Check if no account is locked.
    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }
}

/// Sort and deduplicate ids into canonical lock order.
pub fn canonical_order(ids: &[AccountId]) -> Vec<AccountId> {
    let mut ordered = ids.to_vec();
    ordered.sort();
    ordered.dedup();
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn handle(id: &str) -> (AccountId, AccountHandle) {
        (
            AccountId::new(id),
            Arc::new(Mutex::new(Account::new(id).with_holding("gold", dec!(10)))),
        )
    }

    #[test]
    fn test_canonical_order() {
        let ids = vec![
            AccountId::new("carol"),
            AccountId::new("alice"),
            AccountId::new("carol"),
        ];
        assert_eq!(
            canonical_order(&ids),
            vec![AccountId::new("alice"), AccountId::new("carol")]
        );
    }

    #[test]
    fn test_acquire_and_lookup() {
        let handles = vec![handle("alice"), handle("bob")];
        let mut locked = LockedAccounts::acquire(&handles, Duration::from_millis(50)).unwrap();

        assert_eq!(locked.len(), 2);
        assert!(locked.get(&AccountId::new("alice")).is_ok());
        assert!(locked.get_mut(&AccountId::new("carol")).is_err());
    }

    #[test]
    fn test_pair_mut_keeps_argument_order() {
        let handles = vec![handle("alice"), handle("bob")];
        let mut locked = LockedAccounts::acquire(&handles, Duration::from_millis(50)).unwrap();

        let (bob, alice) = locked
            .pair_mut(&AccountId::new("bob"), &AccountId::new("alice"))
            .unwrap();
        assert_eq!(bob.id.as_str(), "bob");
        assert_eq!(alice.id.as_str(), "alice");

        let alice_id = AccountId::new("alice");
        assert!(locked.pair_mut(&alice_id, &alice_id).is_err());
    }

    #[test]
    fn test_busy_when_lock_is_held() {
        let handles = vec![handle("alice"), handle("bob")];
        let _held = handles[1].1.lock();

        let err = LockedAccounts::acquire(&handles, Duration::from_millis(20))
            .err()
            .unwrap();
        assert!(matches!(err, LedgerError::Busy { ref account_id, .. } if account_id.as_str() == "bob"));

        // The first lock was released when acquisition failed.
        assert!(handles[0].1.try_lock().is_some());
    }

    #[test]
    fn test_guards_released_on_drop() {
        let handles = vec![handle("alice")];
        {
            let _locked = LockedAccounts::acquire(&handles, Duration::from_millis(20)).unwrap();
            assert!(handles[0].1.try_lock().is_none());
        }
        assert!(handles[0].1.try_lock().is_some());
    }
}
