//! Token amount types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::TokenType;

/// A quantity of one token type.
///
/// Holdings stored in an account are never negative; a `TokenHolding` with a
/// negative amount is only ever a transient value in a calculation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenHolding {
    /// Token type held.
    pub token_type: TokenType,
    /// Amount held (high precision decimal).
    pub amount: Decimal,
}

impl TokenHolding {
    /// Create a new holding.
    pub fn new(token_type: TokenType, amount: Decimal) -> Self {
        Self { token_type, amount }
    }
}

impl fmt::Display for TokenHolding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.token_type)
    }
}
