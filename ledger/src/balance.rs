//! Per-account token balance tracking.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tokenledger_common::{AccountId, LedgerError, Result, TokenHolding, TokenType};

/// Token balances held by one account.
///
/// Changes are computed with `credited` and `debited` and applied with
/// `set`. `debited` refuses to go below zero and both refuse negative input,
/// so holdings that start non-negative stay non-negative.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holdings {
    balances: BTreeMap<TokenType, Decimal>,
}

impl Holdings {
    /// Create empty holdings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Balance of a token type; absent tokens hold zero.
    pub fn balance(&self, token_type: &TokenType) -> Decimal {
        self.balances
            .get(token_type)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    /// Balance after crediting `amount`, without applying it.
    ///
    /// Fails with `InvalidAmount` when the result is not exactly
    /// representable, either by overflow or by rounding away digits.
    pub fn credited(&self, token_type: &TokenType, amount: Decimal) -> Result<Decimal> {
        if amount < Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let before = self.balance(token_type);
        before
            .checked_add(amount)
            .filter(|after| after.checked_sub(before) == Some(amount))
            .ok_or(LedgerError::InvalidAmount(amount))
    }

    /// Balance after debiting `amount`, without applying it.
    pub fn debited(
        &self,
        account_id: &AccountId,
        token_type: &TokenType,
        amount: Decimal,
    ) -> Result<Decimal> {
        if amount < Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let available = self.balance(token_type);
        if available < amount {
            return Err(LedgerError::InsufficientFunds {
                account_id: account_id.clone(),
                token_type: token_type.clone(),
                required: amount,
                available,
            });
        }
        available
            .checked_sub(amount)
            .filter(|after| available.checked_sub(*after) == Some(amount))
            .ok_or(LedgerError::InvalidAmount(amount))
    }

    /// Overwrite one balance, creating the token entry if absent.
    pub fn set(&mut self, token_type: &TokenType, amount: Decimal) {
        self.balances.insert(token_type.clone(), amount);
    }

    /// Iterate over token entries in token order.
    pub fn iter(&self) -> impl Iterator<Item = (&TokenType, &Decimal)> {
        self.balances.iter()
    }

    /// Token entries as holdings, in token order.
    pub fn to_holdings(&self) -> Vec<TokenHolding> {
        self.balances
            .iter()
            .map(|(token, amount)| TokenHolding::new(token.clone(), *amount))
            .collect()
    }

    /// Check the non-negativity invariant over every entry.
    pub fn is_non_negative(&self) -> bool {
        self.balances.values().all(|amount| *amount >= Decimal::ZERO)
    }

    /// Number of token entries (including zero balances).
    pub fn len(&self) -> usize {
        self.balances.len()
    }

    /// Check if no token entry exists.
    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn gold() -> TokenType {
        TokenType::new("gold")
    }

    #[test]
    fn test_balance_operations() {
        let account = AccountId::new("alice");
        let mut holdings = Holdings::new();

        assert_eq!(holdings.balance(&gold()), Decimal::ZERO);
        assert_eq!(holdings.credited(&gold(), dec!(100)).unwrap(), dec!(100));
        assert!(holdings.is_empty());

        holdings.set(&gold(), dec!(100));
        assert_eq!(holdings.debited(&account, &gold(), dec!(40)).unwrap(), dec!(60));
        assert_eq!(holdings.credited(&gold(), dec!(1)).unwrap(), dec!(101));
        assert_eq!(holdings.balance(&gold()), dec!(100));
        assert!(holdings.credited(&gold(), dec!(-1)).is_err());
    }

    #[test]
    fn test_debit_never_goes_negative() {
        let account = AccountId::new("alice");
        let mut holdings = Holdings::new();
        holdings.set(&gold(), dec!(5));

        let err = holdings.debited(&account, &gold(), dec!(10)).unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientFunds {
                account_id: account,
                token_type: gold(),
                required: dec!(10),
                available: dec!(5),
            }
        );
        assert_eq!(holdings.balance(&gold()), dec!(5));
    }

    #[test]
    fn test_debit_of_unknown_token_fails() {
        let account = AccountId::new("alice");
        let holdings = Holdings::new();

        assert!(holdings.debited(&account, &TokenType::new("silver"), dec!(1)).is_err());
        assert!(holdings.is_empty());
    }

    #[test]
    fn test_credit_overflow_is_rejected() {
        let mut holdings = Holdings::new();
        holdings.set(&gold(), Decimal::MAX);

        let err = holdings.credited(&gold(), dec!(1)).unwrap_err();
        assert_eq!(err, LedgerError::InvalidAmount(dec!(1)));
        let after = holdings.debited(&AccountId::new("alice"), &gold(), dec!(1));
        assert_eq!(after.unwrap(), Decimal::MAX - dec!(1));
    }

    #[test]
    fn test_rounding_credit_is_rejected() {
        let account = AccountId::new("alice");
        let mut holdings = Holdings::new();
        let large: Decimal = "10000000000000000000000000000".parse().unwrap();
        holdings.set(&gold(), large);

        // The sum would need more significant digits than a Decimal holds.
        assert!(holdings.credited(&gold(), dec!(0.0000000001)).is_err());
        assert!(holdings.debited(&account, &gold(), dec!(0.0000000001)).is_err());

        // Exact arithmetic at the same magnitude still works.
        assert_eq!(holdings.debited(&account, &gold(), dec!(1)).unwrap(), large - dec!(1));
    }
}
