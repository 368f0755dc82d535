//! Simulation scenarios.

use rand::Rng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;

use tokenledger_common::IdempotencyKey;
use tokenledger_ledger::TransferRequest;

use crate::population::Population;

/// Shape of the generated load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scenario {
    /// Uniform random sender and receiver.
    Random,
    /// Every transfer touches the hot account.
    Contention,
    /// Every transfer is submitted twice under one key.
    Retry,
}

impl Scenario {
    /// Load a scenario by name.
    pub fn load(name: &str) -> anyhow::Result<Self> {
        match name {
            "random" => Ok(Scenario::Random),
            "contention" => Ok(Scenario::Contention),
            "retry" => Ok(Scenario::Retry),
            _ => Err(anyhow::anyhow!("Unknown scenario: {}", name)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Scenario::Random => "random",
            Scenario::Contention => "contention",
            Scenario::Retry => "retry",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Scenario::Random => "Transfers between uniformly random account pairs",
            Scenario::Contention => "All transfers contend on a single hot account",
            Scenario::Retry => "Each transfer is resubmitted with the same idempotency key",
        }
    }

    /// Number of submissions per generated transfer.
    pub fn submissions(&self) -> usize {
        match self {
            Scenario::Retry => 2,
            Scenario::Random | Scenario::Contention => 1,
        }
    }

    /// Generate the next transfer.
    ///
    /// Amounts are drawn from `1..=max(initial_balance / 10, 1)`, so most
    /// transfers succeed while some still hit insufficient funds.
    pub fn next_transfer<R: Rng>(
        &self,
        rng: &mut R,
        population: &Population,
        key: IdempotencyKey,
    ) -> TransferRequest {
        let count = population.account_count();

        let (from, to) = match self {
            Scenario::Contention => {
                let other = rng.gen_range(1..count);
                if rng.gen_bool(0.5) {
                    (0, other)
                } else {
                    (other, 0)
                }
            }
            Scenario::Random | Scenario::Retry => {
                let from = rng.gen_range(0..count);
                let mut to = rng.gen_range(0..count);
                while to == from {
                    to = rng.gen_range(0..count);
                }
                (from, to)
            }
        };

        let token = &population.tokens[rng.gen_range(0..population.tokens.len())];
        let max = (population.initial_balance / Decimal::from(10))
            .trunc()
            .max(Decimal::ONE);
        let max = max.to_u64().unwrap_or(1);
        let amount = Decimal::from(rng.gen_range(1..=max));

        TransferRequest::new(
            population.accounts[from].clone(),
            population.accounts[to].clone(),
            token.clone(),
            amount,
            key,
        )
    }
}
