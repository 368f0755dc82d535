//! Account definitions for the ledger.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tokenledger_common::{AccountId, TokenType};

use crate::balance::Holdings;

/// Account status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountStatus {
    /// Account is active and can transact.
    Active,
    /// Account is soft-deleted; kept for history, cannot transact.
    Closed,
}

/// A ledger account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Unique account identifier.
    pub id: AccountId,
    /// Current token balances.
    pub holdings: Holdings,
    /// Balances the account was opened with.
    pub opening_holdings: Holdings,
    /// Account status.
    pub status: AccountStatus,
    /// When the account was created.
    pub created_at: DateTime<Utc>,
    /// When the account was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new, empty account.
    pub fn new(id: impl Into<AccountId>) -> Self {
        let now = Utc::now();

        Self {
            id: id.into(),
            holdings: Holdings::new(),
            opening_holdings: Holdings::new(),
            status: AccountStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the opening balance of one token type, replacing any earlier
    /// value for it. Only meaningful before the account is opened in a store.
    pub fn with_holding(mut self, token_type: impl Into<TokenType>, amount: Decimal) -> Self {
        self.opening_holdings.set(&token_type.into(), amount);
        self.holdings = self.opening_holdings.clone();
        self
    }

    /// Balance of one token type.
    pub fn balance(&self, token_type: &TokenType) -> Decimal {
        self.holdings.balance(token_type)
    }

    /// Check if account can transact.
    pub fn can_transact(&self) -> bool {
        self.status == AccountStatus::Active
    }

    /// Record a mutation time.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Close the account.
    pub fn close(&mut self) {
        self.status = AccountStatus::Closed;
        self.touch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_opening_holdings() {
        let account = Account::new("alice")
            .with_holding("gold", dec!(100))
            .with_holding("silver", dec!(7))
            .with_holding("gold", dec!(5));

        assert_eq!(account.balance(&TokenType::new("gold")), dec!(5));
        assert_eq!(account.balance(&TokenType::new("silver")), dec!(7));
        assert_eq!(account.opening_holdings, account.holdings);
        assert!(account.can_transact());
    }

    #[test]
    fn test_close_is_soft() {
        let mut account = Account::new("alice").with_holding("gold", dec!(1));
        account.close();

        assert!(!account.can_transact());
        assert_eq!(account.balance(&TokenType::new("gold")), dec!(1));
    }
}
