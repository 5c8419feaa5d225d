//! Error taxonomy for the reward ledger.
//!
//! Ordinary ineligibility (self-referral, missing link, non-positive amount)
//! and fraud blocks are NOT errors; they are normal results carrying reason
//! codes. Errors are reserved for infrastructure failures, optimistic
//! concurrency conflicts, and invariant violations that operators must see.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// No account exists for the given id.
    #[error("account not found: {0}")]
    AccountNotFound(String),

    /// Optimistic concurrency conflict on an account commit. The caller
    /// retries the whole operation with backoff.
    #[error("concurrent modification of account {account_id}")]
    Conflict { account_id: String },

    /// Two tickets were assigned the same sequence number. This should be
    /// impossible with atomic allocation and indicates corruption.
    #[error("duplicate sequence number {sequence}")]
    DuplicateSequence { sequence: u64 },

    /// A debit would push a purse balance negative.
    #[error("insufficient balance in {purse} purse of account {account_id}")]
    InsufficientBalance { account_id: String, purse: String },

    /// A referee already has a referrer; links are permanent.
    #[error("referral link already exists for referee {referee_id}")]
    ReferralAlreadyLinked { referee_id: String },

    /// Storage-layer failure (unreachable, timeout). Callers may retry the
    /// whole operation; idempotency keys make the retry safe.
    #[error("storage failure: {0}")]
    Infrastructure(String),
}

impl LedgerError {
    /// True for failures the caller is expected to retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LedgerError::Conflict { .. } | LedgerError::Infrastructure(_)
        )
    }
}
