//! Commission Subsystem
//!
//! Pays the referrer when their referee earns:
//!
//! - Percentage commissions on earn events (lifetime affiliate rate, or the
//!   reduced merchant-to-merchant rate)
//! - Fixed ripple payouts when the referee collects a milestone bonus
//!
//! Every payout passes the fraud gate and is committed through the store's
//! uniqueness guard before any wallet credit.

mod engine;
mod ripple;

pub use engine::CommissionEngine;
pub use ripple::RippleEngine;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Round a monetary amount to two decimal places.
pub(crate) fn round2(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommissionKind {
    /// Lifetime percentage on a referred customer's earn events
    Affiliate,
    /// Reduced percentage when a merchant referred the earning merchant
    MerchantReferral,
    /// Fixed payout cascading from a referee's milestone bonus
    Ripple,
}

/// A committed commission payout. Unique per
/// (original transaction, referrer, referee).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommissionTransaction {
    pub id: String,
    pub referrer_id: String,
    pub referee_id: String,
    pub kind: CommissionKind,
    pub original_transaction_id: String,
    pub base_amount: f64,
    pub commission_amount: f64,
    pub rate: f64,
    /// Audit entry recorded by the fraud check that approved this payout
    pub audit_entry_id: String,
    pub created_at: DateTime<Utc>,
}

impl CommissionTransaction {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        referrer_id: impl Into<String>,
        referee_id: impl Into<String>,
        kind: CommissionKind,
        original_transaction_id: impl Into<String>,
        base_amount: f64,
        commission_amount: f64,
        rate: f64,
        audit_entry_id: impl Into<String>,
    ) -> Self {
        Self {
            id: format!("comm_{}", Uuid::new_v4()),
            referrer_id: referrer_id.into(),
            referee_id: referee_id.into(),
            kind,
            original_transaction_id: original_transaction_id.into(),
            base_amount,
            commission_amount,
            rate,
            audit_entry_id: audit_entry_id.into(),
            created_at: Utc::now(),
        }
    }
}

/// Why an earn event produced no commission. None of these are errors; an
/// account without a referrer is the common case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IneligibilityReason {
    NonPositiveAmount,
    EarnerMissing,
    NoReferralLink,
    ReferrerMissing,
    ReferrerInactive,
    SelfReferral,
    FraudBlocked,
    DuplicateTransaction,
    NoRippleTier,
}

/// Outcome of one commission attempt.
#[derive(Debug, Clone)]
pub enum CommissionResult {
    Paid(CommissionTransaction),
    Skipped(IneligibilityReason),
}

impl CommissionResult {
    pub fn paid(&self) -> Option<&CommissionTransaction> {
        match self {
            CommissionResult::Paid(tx) => Some(tx),
            CommissionResult::Skipped(_) => None,
        }
    }
}
