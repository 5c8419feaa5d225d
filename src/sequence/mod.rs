//! Sequence Allocation
//!
//! Issues strictly increasing, gap-free global reward-sequence numbers.
//! Allocation is a single atomic increment behind the `SequenceAllocator`
//! interface; the store calls it inside its commit critical section so a
//! number is never handed out without its ticket being persisted.
//!
//! The `PointAccumulator` drives allocation: it adds earned points to an
//! account, and for every threshold crossing emits one `SequenceTicket`
//! through an optimistic-concurrency commit with exponential backoff.

mod accrue;
mod allocator;

pub use accrue::{Accrual, PointAccumulator};
pub use allocator::{AtomicSequenceAllocator, SequenceAllocator};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which track a ticket was issued from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketOrigin {
    /// Base accrual track (threshold crossings)
    Base,
    /// Infinity cycle batch expansion
    Infinity { cycle_id: String },
}

/// A uniquely numbered reward unit. Created exactly once per threshold
/// crossing (or cycle batch slot) and immutable thereafter. Sequence numbers
/// are never reused or skipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceTicket {
    pub sequence_number: u64,
    pub owner_account_id: String,
    pub points_value_at_issue: u64,
    pub issued_from: TicketOrigin,
    pub issued_at: DateTime<Utc>,
}
