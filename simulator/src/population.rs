//! Simulated account population.

use rust_decimal::Decimal;

use tokenledger_common::{AccountId, TokenType};
use tokenledger_ledger::{Account, LedgerEngine};

const TOKEN_NAMES: [&str; 6] = ["gold", "silver", "bronze", "gems", "credits", "shards"];

/// Accounts and token types taking part in a simulation.
#[derive(Debug, Clone)]
pub struct Population {
    /// Account identifiers, in canonical order.
    pub accounts: Vec<AccountId>,
    /// Token types every account starts with.
    pub tokens: Vec<TokenType>,
    /// Opening balance of each token in each account.
    pub initial_balance: Decimal,
}

impl Population {
    /// Create `accounts` accounts holding `tokens` token types each.
    pub fn create(accounts: usize, tokens: usize, initial_balance: Decimal) -> Self {
        let accounts = (0..accounts)
            .map(|i| AccountId::new(format!("acct-{:04}", i)))
            .collect();

        let tokens = (0..tokens)
            .map(|i| match TOKEN_NAMES.get(i) {
                Some(name) => TokenType::new(*name),
                // Names beyond the predefined list
                None => TokenType::new(format!("token-{}", i + 1)),
            })
            .collect();

        Self {
            accounts,
            tokens,
            initial_balance,
        }
    }

    /// Open every account on the engine.
    pub fn open_all(&self, engine: &LedgerEngine) -> anyhow::Result<()> {
        for id in &self.accounts {
            let account = self
                .tokens
                .iter()
                .fold(Account::new(id.clone()), |account, token| {
                    account.with_holding(token.clone(), self.initial_balance)
                });
            engine.open_account(account)?;
        }
        Ok(())
    }

    /// Total supply of one token at opening.
    pub fn opening_supply(&self) -> Decimal {
        self.initial_balance * Decimal::from(self.accounts.len() as u64)
    }

    /// The account every contention transfer touches.
    pub fn hot_account(&self) -> &AccountId {
        &self.accounts[0]
    }

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tokenledger_ledger::LedgerConfig;

    #[test]
    fn test_population_names() {
        let population = Population::create(3, 8, dec!(10));

        assert_eq!(population.account_count(), 3);
        assert_eq!(population.accounts[0], AccountId::new("acct-0000"));
        assert_eq!(population.tokens[0], TokenType::new("gold"));
        assert_eq!(population.tokens[7], TokenType::new("token-8"));
        assert_eq!(population.opening_supply(), dec!(30));
    }

    #[test]
    fn test_open_all() {
        let engine = LedgerEngine::new(LedgerConfig::default()).unwrap();
        let population = Population::create(2, 2, dec!(50));

        population.open_all(&engine).unwrap();

        let holdings = engine.holdings(&population.accounts[1]).unwrap();
        assert_eq!(holdings.len(), 2);
        assert!(holdings.iter().all(|h| h.amount == dec!(50)));
        assert!(population.open_all(&engine).is_err());
    }
}
