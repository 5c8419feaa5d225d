//! Fraud & Audit Subsystem
//!
//! Gates every payout. Checks run in sequence, accumulating reasons and
//! escalating risk:
//!
//! 1. Duplicate check against approved commissions
//! 2. Velocity check over a sliding window
//! 3. Amount heuristics (single ceiling, rolling daily total, round numbers)
//! 4. Relationship validation (status, link direction, self-referral)
//! 5. Origin-context correlation
//!
//! Any single high-risk reason blocks; accumulated medium risk past the
//! score threshold blocks; anything else is allowed, flagged for review when
//! risk is non-zero. Every call produces exactly one immutable `AuditEntry`.
//!
//! Fraud tracking state is behind the injectable `FraudStateStore` interface
//! (in-memory for tests, a persistent table in production) and is passed
//! explicitly into the engines, never reached through globals.

mod audit;
mod cleanup;
mod guard;
mod state;

pub use audit::{AuditDecision, AuditEntry, AuditLog, RiskLevel};
pub use cleanup::{run_cleanup_once, CleanupHandle, CleanupTask};
pub use guard::{FraudGuard, FraudResult, FraudStatsSnapshot, OriginContext};
pub use state::{FraudStateStore, MemoryFraudState};

use chrono::{DateTime, Utc};

/// Injectable time source so windowed checks and retention are testable
/// without real wall-clock delays.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock for tests.
pub struct ManualClock {
    now: std::sync::RwLock<DateTime<Utc>>,
}

impl ManualClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: std::sync::RwLock::new(now),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.write().expect("clock lock poisoned");
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read().expect("clock lock poisoned")
    }
}
