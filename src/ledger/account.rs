//! Account and referral link records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether the account belongs to a customer or a merchant. Determines which
/// commission rate applies when the account's referee earns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountKind {
    Customer,
    Merchant,
}

/// Participation status. Suspended and blocked accounts cannot receive
/// commissions; blocked accounts fail fraud relationship validation outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountStatus {
    Active,
    Suspended,
    Blocked,
}

/// A customer or merchant participating in the loyalty program.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub kind: AccountKind,
    pub status: AccountStatus,

    /// Points accumulated toward the next threshold crossing
    pub accumulated_points: u64,
    /// All points ever earned, never decremented
    pub lifetime_earned_points: u64,
    /// Set on the first sequence ticket and never cleared
    pub completed_base_milestone: bool,
    /// Infinity cycles completed
    pub cycle_count: u64,
    /// Referrer account id, set once at registration, immutable
    pub referred_by: Option<String>,

    /// Optimistic concurrency version, bumped on every committed mutation
    pub version: u64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn new(id: impl Into<String>, kind: AccountKind) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            kind,
            status: AccountStatus::Active,
            accumulated_points: 0,
            lifetime_earned_points: 0,
            completed_base_milestone: false,
            cycle_count: 0,
            referred_by: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }
}

/// Permanent referrer relationship: one referrer per referee, set at
/// registration, never mutated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferralLink {
    pub referrer_id: String,
    pub referee_id: String,
    pub linked_at: DateTime<Utc>,
}

impl ReferralLink {
    pub fn new(referrer_id: impl Into<String>, referee_id: impl Into<String>) -> Self {
        Self {
            referrer_id: referrer_id.into(),
            referee_id: referee_id.into(),
            linked_at: Utc::now(),
        }
    }
}
