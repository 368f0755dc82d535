//! Reconciliation of balances against the transaction log.

use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;
use serde::Serialize;

use tokenledger_common::{AccountId, TokenType};

use crate::account::Account;
use crate::journal::TransactionLog;

/// An account whose balance disagrees with its replayed history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountMismatch {
    pub account_id: AccountId,
    pub token_type: TokenType,
    /// Opening balance plus the net of every record in history; `None` when
    /// the replay overflowed.
    pub expected: Option<Decimal>,
    /// Balance actually held.
    pub actual: Decimal,
}

/// A token whose total supply changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SupplyMismatch {
    pub token_type: TokenType,
    pub opening_supply: Decimal,
    pub current_supply: Decimal,
}

/// Outcome of a reconciliation pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconciliationReport {
    /// Accounts examined.
    pub accounts_checked: usize,
    /// Newest sequence number covered by the pass.
    pub last_sequence: u64,
    /// Total supply per token type.
    pub supply: BTreeMap<TokenType, Decimal>,
    /// Token types whose total supply exceeds the `Decimal` range. Their
    /// conservation follows from the per-account replay alone.
    pub supply_overflow: Vec<TokenType>,
    pub account_mismatches: Vec<AccountMismatch>,
    pub supply_mismatches: Vec<SupplyMismatch>,
    /// Accounts holding a negative balance of some token.
    pub negative_balances: Vec<AccountId>,
}

impl ReconciliationReport {
    /// True when every check passed.
    pub fn is_consistent(&self) -> bool {
        self.account_mismatches.is_empty()
            && self.supply_mismatches.is_empty()
            && self.negative_balances.is_empty()
    }
}

/// Running totals per token; `None` once a sum left the `Decimal` range.
type Totals = BTreeMap<TokenType, Option<Decimal>>;

fn accumulate(totals: &mut Totals, token: &TokenType, amount: Decimal) {
    let total = totals.entry(token.clone()).or_insert(Some(Decimal::ZERO));
    *total = total.and_then(|sum| sum.checked_add(amount));
}

/// Check a quiescent set of accounts against the log.
///
/// Callers must hold every account's lock so that no transfer commits while
/// histories are replayed.
pub fn reconcile<'a>(
    accounts: impl IntoIterator<Item = &'a Account>,
    log: &TransactionLog,
) -> ReconciliationReport {
    let mut report = ReconciliationReport {
        last_sequence: log.last_sequence(),
        ..Default::default()
    };
    let mut opening_supply = Totals::new();
    let mut current_supply = Totals::new();

    for account in accounts {
        report.accounts_checked += 1;

        if !account.holdings.is_non_negative() {
            report.negative_balances.push(account.id.clone());
        }

        let mut expected: Totals = account
            .opening_holdings
            .iter()
            .map(|(token, amount)| (token.clone(), Some(*amount)))
            .collect();
        for record in log.history(&account.id) {
            accumulate(&mut expected, &record.token_type, record.delta_for(&account.id));
        }

        let tokens: BTreeSet<&TokenType> = expected
            .keys()
            .chain(account.holdings.iter().map(|(token, _)| token))
            .collect();
        for token in tokens {
            let want = expected.get(token).copied().unwrap_or(Some(Decimal::ZERO));
            let have = account.balance(token);
            if want != Some(have) {
                report.account_mismatches.push(AccountMismatch {
                    account_id: account.id.clone(),
                    token_type: token.clone(),
                    expected: want,
                    actual: have,
                });
            }
        }

        for (token, amount) in account.opening_holdings.iter() {
            accumulate(&mut opening_supply, token, *amount);
        }
        for (token, amount) in account.holdings.iter() {
            accumulate(&mut current_supply, token, *amount);
        }
    }

    let tokens: BTreeSet<TokenType> = opening_supply
        .keys()
        .chain(current_supply.keys())
        .cloned()
        .collect();
    for token in tokens {
        let opening = opening_supply.get(&token).copied().unwrap_or(Some(Decimal::ZERO));
        let current = current_supply.get(&token).copied().unwrap_or(Some(Decimal::ZERO));
        match (opening, current) {
            (Some(opening), Some(current)) => {
                if opening != current {
                    report.supply_mismatches.push(SupplyMismatch {
                        token_type: token.clone(),
                        opening_supply: opening,
                        current_supply: current,
                    });
                }
                report.supply.insert(token, current);
            }
            _ => report.supply_overflow.push(token),
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::NewRecord;
    use rust_decimal_macros::dec;
    use tokenledger_common::IdempotencyKey;

    fn gold() -> TokenType {
        TokenType::new("gold")
    }

    #[test]
    fn test_consistent_after_transfer() {
        let log = TransactionLog::new();
        let mut alice = Account::new("alice").with_holding("gold", dec!(10));
        let mut bob = Account::new("bob");

        log.append(NewRecord {
            from: alice.id.clone(),
            to: bob.id.clone(),
            token_type: gold(),
            amount: dec!(4),
            idempotency_key: IdempotencyKey::new("k1"),
        })
        .unwrap();
        alice.holdings.set(&gold(), dec!(6));
        bob.holdings.set(&gold(), dec!(4));

        let report = reconcile([&alice, &bob], &log);
        assert!(report.is_consistent());
        assert_eq!(report.accounts_checked, 2);
        assert_eq!(report.supply.get(&gold()), Some(&dec!(10)));
    }

    #[test]
    fn test_detects_unlogged_mutation() {
        let log = TransactionLog::new();
        let mut alice = Account::new("alice").with_holding("gold", dec!(10));
        alice.holdings.set(&gold(), dec!(11));

        let report = reconcile([&alice], &log);
        assert!(!report.is_consistent());
        assert_eq!(
            report.account_mismatches,
            vec![AccountMismatch {
                account_id: alice.id.clone(),
                token_type: gold(),
                expected: Some(dec!(10)),
                actual: dec!(11),
            }]
        );
        assert_eq!(report.supply_mismatches.len(), 1);
    }

    #[test]
    fn test_supply_beyond_decimal_range() {
        let log = TransactionLog::new();
        let alice = Account::new("alice").with_holding("gold", Decimal::MAX);
        let bob = Account::new("bob").with_holding("gold", Decimal::MAX);

        let report = reconcile([&alice, &bob], &log);
        assert!(report.is_consistent());
        assert_eq!(report.supply_overflow, vec![gold()]);
        assert!(report.supply.get(&gold()).is_none());
    }
}
