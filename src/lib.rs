//! Cascade Reward Ledger
//!
//! Reward ledger and commission engine for a loyalty program: point accrual
//! into globally sequenced tickets, multiple-of-milestone bonuses, infinity
//! cycle expansion, referral commissions with ripple payouts, and a fraud
//! gate with an immutable audit trail in front of every payout.
//!
//! ## Module Structure
//!
//! ```text
//! cascade-ledger/src/
//! ├── lib.rs         - Crate root with re-exports
//! ├── config.rs      - Business constants & environment overrides
//! ├── error.rs       - Error taxonomy
//! ├── engine.rs      - Earn-event orchestration facade
//! ├── ledger/        - Shared primitives
//! │   ├── account.rs - Accounts & referral links
//! │   └── wallet.rs  - Purses & append-only ledger entries
//! ├── sequence/      - Gap-free sequence allocation
//! │   ├── allocator.rs - Atomic number allocation
//! │   └── accrue.rs    - Threshold accrual into tickets
//! ├── milestone/     - Milestone & cycle subsystem
//! │   ├── trigger.rs - Multiple-of-milestone bonuses
//! │   ├── cycle.rs   - Infinity cycle expansion
//! │   └── voucher.rs - Voucher pool distribution
//! ├── commission/    - Referral commission subsystem
//! │   ├── engine.rs  - Percentage commissions on earn events
//! │   └── ripple.rs  - Fixed payouts cascading from milestone bonuses
//! ├── fraud/         - Fraud gate & audit trail
//! │   ├── guard.rs   - Risk scoring pipeline
//! │   ├── audit.rs   - Immutable audit log
//! │   ├── state.rs   - Injectable sliding-window tracking state
//! │   └── cleanup.rs - Background retention task
//! └── storage/       - Storage interface
//!     └── memory.rs  - In-memory store with atomic commits
//! ```

pub mod commission;
pub mod config;
pub mod engine;
pub mod error;
pub mod fraud;
pub mod ledger;
pub mod milestone;
pub mod sequence;
pub mod storage;

// Re-export main types for convenience
pub use commission::{
    CommissionEngine, CommissionKind, CommissionResult, CommissionTransaction,
    IneligibilityReason, RippleEngine,
};
pub use config::{AuditConfig, CommissionConfig, EngineConfig, FraudConfig, RewardConfig};
pub use engine::{EarnOutcome, RewardEngine};
pub use error::LedgerError;
pub use fraud::{
    AuditDecision, AuditEntry, AuditLog, CleanupHandle, CleanupTask, Clock, FraudGuard,
    FraudResult, FraudStateStore, FraudStatsSnapshot, ManualClock, MemoryFraudState,
    OriginContext, RiskLevel, SystemClock,
};
pub use ledger::{Account, AccountKind, AccountStatus, LedgerEntry, Purse, ReferralLink, Wallet};
pub use milestone::{
    Cycle, CycleEngine, CycleOutcome, MilestoneAward, MilestoneEngine, Voucher, VoucherEngine,
    VoucherStatus,
};
pub use sequence::{
    Accrual, AtomicSequenceAllocator, PointAccumulator, SequenceAllocator, SequenceTicket,
    TicketOrigin,
};
pub use storage::{LedgerStore, MemoryStore};
