//! Milestone & Cycle Subsystem
//!
//! Converts sequence activity into bonuses:
//!
//! - Trigger engine: every new ticket at sequence S pays a bonus to the
//!   holder of ticket S/m for each table multiplier m dividing S
//! - Cycle engine: accounts past the infinity threshold expand into
//!   exponentially growing ticket batches with fixed pool deductions
//! - Voucher engine: the voucher pool from each cycle is shared among the
//!   account's historical counterparties pro rata by trade volume

mod cycle;
mod trigger;
mod voucher;

pub use cycle::{CycleEngine, CycleOutcome};
pub use trigger::MilestoneEngine;
pub use voucher::VoucherEngine;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Bonus paid to the holder of an earlier sequence ticket when a later
/// ticket lands on one of its table multiples. Unique per
/// (recipient, trigger, multiplier) triple.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MilestoneAward {
    pub id: String,
    pub recipient_account_id: String,
    pub recipient_sequence_number: u64,
    pub triggering_sequence_number: u64,
    pub multiplier: u64,
    pub bonus_points: u64,
    pub awarded_at: DateTime<Utc>,
}

impl MilestoneAward {
    pub fn new(
        recipient_account_id: impl Into<String>,
        recipient_sequence_number: u64,
        triggering_sequence_number: u64,
        multiplier: u64,
        bonus_points: u64,
    ) -> Self {
        Self {
            id: format!("award_{}", Uuid::new_v4()),
            recipient_account_id: recipient_account_id.into(),
            recipient_sequence_number,
            triggering_sequence_number,
            multiplier,
            bonus_points,
            awarded_at: Utc::now(),
        }
    }
}

/// One infinity-cycle expansion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cycle {
    pub id: String,
    pub account_id: String,
    /// Starts at 1; cycle N issues `growth_factor^N` tickets
    pub cycle_number: u64,
    pub points_at_start: u64,
    pub tickets_issued: u32,
    pub admin_pool_deducted: u64,
    pub voucher_pool_deducted: u64,
    pub completed: bool,
    pub started_at: DateTime<Utc>,
}

impl Cycle {
    pub fn new(
        account_id: impl Into<String>,
        cycle_number: u64,
        points_at_start: u64,
        tickets_issued: u32,
        admin_pool_deducted: u64,
        voucher_pool_deducted: u64,
    ) -> Self {
        Self {
            id: format!("cycle_{}", Uuid::new_v4()),
            account_id: account_id.into(),
            cycle_number,
            points_at_start,
            tickets_issued,
            admin_pool_deducted,
            voucher_pool_deducted,
            completed: false,
            started_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoucherStatus {
    Active,
    Redeemed,
    Expired,
}

/// Share of a cycle's voucher pool issued to a historical counterparty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Voucher {
    pub id: String,
    /// Counterparty holding the voucher
    pub account_id: String,
    /// Account whose cycle funded it
    pub issued_by: String,
    pub value_points: u64,
    pub source_cycle_id: String,
    pub status: VoucherStatus,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Voucher {
    pub fn new(
        account_id: impl Into<String>,
        issued_by: impl Into<String>,
        value_points: u64,
        source_cycle_id: impl Into<String>,
        ttl_days: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: format!("voucher_{}", Uuid::new_v4()),
            account_id: account_id.into(),
            issued_by: issued_by.into(),
            value_points,
            source_cycle_id: source_cycle_id.into(),
            status: VoucherStatus::Active,
            issued_at: now,
            expires_at: now + chrono::Duration::days(ttl_days),
        }
    }
}
