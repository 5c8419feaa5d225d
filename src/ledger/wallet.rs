//! Wallets, purses, and append-only ledger entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Distinct balance buckets within one account's wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Purse {
    /// Points accruing toward thresholds (mirrors the account accumulator)
    RewardPoints,
    /// Commission and bonus payouts
    Income,
    /// Spendable commerce balance
    Commerce,
}

impl fmt::Display for Purse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Purse::RewardPoints => write!(f, "reward_points"),
            Purse::Income => write!(f, "income"),
            Purse::Commerce => write!(f, "commerce"),
        }
    }
}

/// Per-account balances. Mutated only through the store's credit/debit
/// operations, which record a `LedgerEntry` in the same commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub account_id: String,
    balances: HashMap<Purse, f64>,
}

impl Wallet {
    pub fn new(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            balances: HashMap::new(),
        }
    }

    pub fn balance(&self, purse: Purse) -> f64 {
        self.balances.get(&purse).copied().unwrap_or(0.0)
    }

    /// Apply an additive delta and return the resulting balance.
    /// Crate-internal: only the store may call this.
    pub(crate) fn apply(&mut self, purse: Purse, delta: f64) -> f64 {
        let balance = self.balances.entry(purse).or_insert(0.0);
        *balance += delta;
        *balance
    }
}

/// One immutable record per balance mutation, with the balance snapshot taken
/// at commit time for reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: String,
    pub account_id: String,
    pub purse: Purse,
    pub delta: f64,
    pub balance_after: f64,
    pub reason: String,
    pub recorded_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn new(
        account_id: &str,
        purse: Purse,
        delta: f64,
        balance_after: f64,
        reason: &str,
    ) -> Self {
        Self {
            id: format!("entry_{}", Uuid::new_v4()),
            account_id: account_id.to_string(),
            purse,
            delta,
            balance_after,
            reason: reason.to_string(),
            recorded_at: Utc::now(),
        }
    }
}
