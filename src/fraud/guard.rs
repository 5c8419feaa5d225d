//! Fraud guard: risk scoring and the payout gate.

use crate::config::FraudConfig;
use crate::error::LedgerError;
use crate::fraud::{
    AuditDecision, AuditEntry, AuditLog, Clock, FraudStateStore, RiskLevel,
};
use crate::ledger::AccountStatus;
use crate::storage::LedgerStore;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::error;

/// Risk weight carried by a medium finding
const WEIGHT_MEDIUM: u32 = 2;

/// Risk weight carried by a low finding
const WEIGHT_LOW: u32 = 1;

/// Optional originating context (device fingerprint, session, source IP key)
/// supplied by the caller for correlation heuristics.
#[derive(Debug, Clone)]
pub struct OriginContext {
    pub origin: String,
}

/// Decision produced by one fraud check.
#[derive(Debug, Clone)]
pub struct FraudResult {
    pub allow: bool,
    pub risk_level: RiskLevel,
    pub reasons: Vec<String>,
    /// Id of the audit entry recorded for this check
    pub audit_id: String,
}

/// Counters surfaced through `fraud_stats()`.
#[derive(Default)]
struct Counters {
    checks: AtomicU64,
    approved: AtomicU64,
    flagged: AtomicU64,
    rejected: AtomicU64,
    duplicates_blocked: AtomicU64,
    invariant_violations: AtomicU64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudStatsSnapshot {
    pub checks: u64,
    pub approved: u64,
    pub flagged: u64,
    pub rejected: u64,
    pub duplicates_blocked: u64,
    pub invariant_violations: u64,
}

/// Accumulates findings for one check and derives the decision.
struct RiskLedger {
    reasons: Vec<String>,
    score: u32,
    has_high: bool,
}

impl RiskLedger {
    fn new() -> Self {
        Self {
            reasons: Vec::new(),
            score: 0,
            has_high: false,
        }
    }

    fn high(&mut self, reason: &str) {
        self.reasons.push(reason.to_string());
        self.has_high = true;
    }

    fn medium(&mut self, reason: &str) {
        self.reasons.push(reason.to_string());
        self.score += WEIGHT_MEDIUM;
    }

    fn low(&mut self, reason: &str) {
        self.reasons.push(reason.to_string());
        self.score += WEIGHT_LOW;
    }

    fn blocked(&self, block_threshold: u32) -> bool {
        self.has_high || self.score >= block_threshold
    }

    fn risk_level(&self, block_threshold: u32) -> RiskLevel {
        if self.blocked(block_threshold) {
            RiskLevel::High
        } else if self.score >= WEIGHT_MEDIUM {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

/// Validates every payout and maintains the audit trail. Constructed once
/// per process with its state store injected; shared across the engines.
pub struct FraudGuard {
    store: Arc<dyn LedgerStore>,
    state: Arc<dyn FraudStateStore>,
    audit: Arc<AuditLog>,
    clock: Arc<dyn Clock>,
    config: FraudConfig,
    counters: Counters,
}

impl FraudGuard {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        state: Arc<dyn FraudStateStore>,
        audit: Arc<AuditLog>,
        clock: Arc<dyn Clock>,
        config: FraudConfig,
    ) -> Self {
        Self {
            store,
            state,
            audit,
            clock,
            config,
            counters: Counters::default(),
        }
    }

    pub fn audit_log(&self) -> Arc<AuditLog> {
        self.audit.clone()
    }

    /// Full pipeline for referral commissions: duplicate, relationship,
    /// velocity, amount, and origin checks.
    pub async fn check_commission(
        &self,
        referrer_id: &str,
        referee_id: &str,
        original_transaction_id: &str,
        amount: f64,
        context: Option<&OriginContext>,
    ) -> Result<FraudResult, LedgerError> {
        let now = self.clock.now();
        let mut risk = RiskLedger::new();

        // 1. Duplicate: an approved commission for this exact key already
        // exists. Rejected attempts never key this check.
        if self
            .store
            .has_approved_commission(original_transaction_id, referrer_id, referee_id)
            .await?
        {
            risk.high("duplicate transaction");
            self.counters.duplicates_blocked.fetch_add(1, Ordering::Relaxed);
        }

        // 2. Relationship validation, self-referral as defense in depth.
        if referrer_id == referee_id {
            risk.high("self-referral");
        }
        match self.store.account(referrer_id).await? {
            None => risk.high("referrer account missing"),
            Some(referrer) => match referrer.status {
                AccountStatus::Blocked => risk.high("referrer blocked"),
                AccountStatus::Suspended => risk.high("referrer suspended"),
                AccountStatus::Active => {}
            },
        }
        match self.store.account(referee_id).await? {
            None => risk.high("referee account missing"),
            Some(referee) => {
                if referee.status == AccountStatus::Blocked {
                    risk.high("referee blocked");
                }
            }
        }
        match self.store.referral_for(referee_id).await? {
            Some(link) if link.referrer_id == referrer_id => {}
            Some(_) => risk.high("referral link mismatch"),
            None => risk.high("no referral link for claimed direction"),
        }

        // 3. Velocity over the sliding window.
        self.velocity_checks(referrer_id, &mut risk, now).await;

        // 4. Amount heuristics.
        self.amount_checks(referrer_id, amount, &mut risk, now).await;

        // 5. Origin correlation, when context is supplied.
        if let Some(context) = context {
            self.state
                .record_origin(&context.origin, referrer_id, now)
                .await;
            let since = now - Duration::minutes(self.config.origin_window_minutes);
            let distinct = self
                .state
                .distinct_referrers_from_origin(&context.origin, since)
                .await;
            if distinct >= self.config.origin_referrer_limit {
                risk.medium("multiple referrers from one origin");
            }
        }

        self.finish(
            vec![referrer_id.to_string(), referee_id.to_string()],
            original_transaction_id,
            amount,
            risk,
            now,
        )
        .await
    }

    /// Reduced pipeline for self-directed payouts (milestone bonuses, cycle
    /// credits): no referral relationship to validate, and no currency
    /// amount heuristics since these amounts are fixed table constants in
    /// points. Duplicates, account status, and velocity still apply.
    pub async fn check_payout(
        &self,
        account_id: &str,
        original_transaction_id: &str,
        amount: f64,
    ) -> Result<FraudResult, LedgerError> {
        let now = self.clock.now();
        let mut risk = RiskLedger::new();

        if self.audit.has_approved(original_transaction_id).await {
            risk.high("duplicate transaction");
            self.counters.duplicates_blocked.fetch_add(1, Ordering::Relaxed);
        }

        match self.store.account(account_id).await? {
            None => risk.high("account missing"),
            Some(account) => match account.status {
                AccountStatus::Blocked => risk.high("account blocked"),
                AccountStatus::Suspended => risk.high("account suspended"),
                AccountStatus::Active => {}
            },
        }

        self.velocity_checks(account_id, &mut risk, now).await;

        self.finish(
            vec![account_id.to_string()],
            original_transaction_id,
            amount,
            risk,
            now,
        )
        .await
    }

    /// Record an approved payout into velocity/daily-total state. Called by
    /// the engines after the wallet credit commits.
    pub async fn note_approved_payout(&self, payer_key: &str, amount: f64) {
        self.state
            .record_approval(payer_key, amount, self.clock.now())
            .await;
    }

    /// Count an invariant violation (e.g. a missing recipient ticket) so it
    /// surfaces to operators in the stats.
    pub fn note_invariant_violation(&self) {
        self.counters
            .invariant_violations
            .fetch_add(1, Ordering::Relaxed);
        error!("Invariant violation recorded");
    }

    pub fn stats(&self) -> FraudStatsSnapshot {
        FraudStatsSnapshot {
            checks: self.counters.checks.load(Ordering::Relaxed),
            approved: self.counters.approved.load(Ordering::Relaxed),
            flagged: self.counters.flagged.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            duplicates_blocked: self.counters.duplicates_blocked.load(Ordering::Relaxed),
            invariant_violations: self.counters.invariant_violations.load(Ordering::Relaxed),
        }
    }

    async fn velocity_checks(
        &self,
        payer_key: &str,
        risk: &mut RiskLedger,
        now: chrono::DateTime<chrono::Utc>,
    ) {
        let since = now - Duration::minutes(self.config.velocity_window_minutes);
        let count = self.state.approvals_since(payer_key, since).await;
        if count >= self.config.velocity_hard_limit {
            risk.high("velocity hard ceiling exceeded");
        } else if count >= self.config.velocity_soft_limit {
            risk.medium("elevated payout velocity");
        }
    }

    async fn amount_checks(
        &self,
        payer_key: &str,
        amount: f64,
        risk: &mut RiskLedger,
        now: chrono::DateTime<chrono::Utc>,
    ) {
        if amount > self.config.single_amount_ceiling {
            risk.medium("single payout above ceiling");
        }

        let day_ago = now - Duration::hours(24);
        let daily_total = self.state.amount_total_since(payer_key, day_ago).await;
        if daily_total + amount > self.config.daily_total_ceiling {
            risk.medium("daily payout total above ceiling");
        }

        if amount >= self.config.round_amount_floor && amount.rem_euclid(100.0) == 0.0 {
            risk.low("suspiciously round amount");
        }
    }

    async fn finish(
        &self,
        actors: Vec<String>,
        original_transaction_id: &str,
        amount: f64,
        risk: RiskLedger,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<FraudResult, LedgerError> {
        let threshold = self.config.risk_score_block_threshold;
        let allow = !risk.blocked(threshold);
        let risk_level = risk.risk_level(threshold);
        let decision = if !allow {
            AuditDecision::Rejected
        } else if risk.reasons.is_empty() {
            AuditDecision::Approved
        } else {
            AuditDecision::Flagged
        };

        self.counters.checks.fetch_add(1, Ordering::Relaxed);
        match decision {
            AuditDecision::Approved => self.counters.approved.fetch_add(1, Ordering::Relaxed),
            AuditDecision::Flagged => self.counters.flagged.fetch_add(1, Ordering::Relaxed),
            AuditDecision::Rejected => self.counters.rejected.fetch_add(1, Ordering::Relaxed),
        };

        let entry = AuditEntry::new(
            actors,
            original_transaction_id,
            amount,
            risk_level,
            risk.reasons.clone(),
            decision,
            now,
        );
        let audit_id = entry.id.clone();
        self.audit.record(entry).await;

        Ok(FraudResult {
            allow,
            risk_level,
            reasons: risk.reasons,
            audit_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuditConfig;
    use crate::fraud::{MemoryFraudState, SystemClock};
    use crate::ledger::{Account, AccountKind, ReferralLink};
    use crate::storage::{LedgerStore, MemoryStore};
    use chrono::Utc;

    async fn guard_with_link() -> (Arc<MemoryStore>, FraudGuard) {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_account(Account::new("ref_a", AccountKind::Customer))
            .await
            .unwrap();
        store
            .upsert_account(Account::new("acct_b", AccountKind::Customer))
            .await
            .unwrap();
        store
            .link_referral(ReferralLink::new("ref_a", "acct_b"))
            .await
            .unwrap();

        let guard = FraudGuard::new(
            store.clone(),
            Arc::new(MemoryFraudState::new()),
            Arc::new(AuditLog::new(AuditConfig::default().max_entries)),
            Arc::new(SystemClock),
            FraudConfig::default(),
        );
        (store, guard)
    }

    #[tokio::test]
    async fn test_clean_commission_approved() {
        let (_store, guard) = guard_with_link().await;

        let result = guard
            .check_commission("ref_a", "acct_b", "tx_1", 20.0, None)
            .await
            .unwrap();
        assert!(result.allow);
        assert_eq!(result.risk_level, RiskLevel::Low);
        assert!(result.reasons.is_empty());

        let stats = guard.stats();
        assert_eq!(stats.checks, 1);
        assert_eq!(stats.approved, 1);
    }

    #[tokio::test]
    async fn test_self_referral_blocks() {
        let (_store, guard) = guard_with_link().await;

        let result = guard
            .check_commission("ref_a", "ref_a", "tx_1", 20.0, None)
            .await
            .unwrap();
        assert!(!result.allow);
        assert_eq!(result.risk_level, RiskLevel::High);
        assert!(result.reasons.iter().any(|r| r == "self-referral"));
    }

    #[tokio::test]
    async fn test_velocity_hard_ceiling_blocks() {
        let (_store, guard) = guard_with_link().await;

        for _ in 0..FraudConfig::default().velocity_hard_limit {
            guard.note_approved_payout("ref_a", 10.0).await;
        }

        let result = guard
            .check_commission("ref_a", "acct_b", "tx_1", 10.0, None)
            .await
            .unwrap();
        assert!(!result.allow);
        assert!(result
            .reasons
            .iter()
            .any(|r| r.contains("velocity hard ceiling")));
    }

    #[tokio::test]
    async fn test_large_round_amount_flagged_not_blocked() {
        let (_store, guard) = guard_with_link().await;

        // Above single ceiling and round: two findings, score 3, allowed
        // but flagged.
        let result = guard
            .check_commission("ref_a", "acct_b", "tx_1", 12_000.0, None)
            .await
            .unwrap();
        assert!(result.allow);
        assert_eq!(result.risk_level, RiskLevel::Medium);
        assert_eq!(result.reasons.len(), 2);
        assert_eq!(guard.stats().flagged, 1);
    }

    #[tokio::test]
    async fn test_stacked_medium_findings_block_on_score() {
        let (_store, guard) = guard_with_link().await;

        // Push the daily total near its ceiling, then attempt a large round
        // payout: single ceiling + daily total + round amount stack to the
        // block threshold without any individual high finding.
        guard.note_approved_payout("ref_a", 45_000.0).await;

        let result = guard
            .check_commission("ref_a", "acct_b", "tx_1", 12_000.0, None)
            .await
            .unwrap();
        assert!(!result.allow);
        assert_eq!(result.risk_level, RiskLevel::High);
        assert_eq!(result.reasons.len(), 3);
        assert_eq!(guard.stats().rejected, 1);
    }

    #[tokio::test]
    async fn test_origin_correlation_raises_risk() {
        let store = Arc::new(MemoryStore::new());
        for id in ["ref_a", "ref_b", "ref_c", "acct_x"] {
            store
                .upsert_account(Account::new(id, AccountKind::Customer))
                .await
                .unwrap();
        }
        store
            .link_referral(ReferralLink::new("ref_c", "acct_x"))
            .await
            .unwrap();

        let state = Arc::new(MemoryFraudState::new());
        let now = Utc::now();
        state.record_origin("device_1", "ref_a", now).await;
        state.record_origin("device_1", "ref_b", now).await;

        let guard = FraudGuard::new(
            store,
            state,
            Arc::new(AuditLog::new(1_000)),
            Arc::new(SystemClock),
            FraudConfig::default(),
        );

        let context = OriginContext {
            origin: "device_1".to_string(),
        };

        let result = guard
            .check_commission("ref_c", "acct_x", "tx_1", 10.0, Some(&context))
            .await
            .unwrap();
        assert!(result.allow);
        assert!(result
            .reasons
            .iter()
            .any(|r| r.contains("multiple referrers")));
    }

    #[tokio::test]
    async fn test_every_check_produces_one_audit_entry() {
        let (_store, guard) = guard_with_link().await;

        guard
            .check_commission("ref_a", "acct_b", "tx_1", 20.0, None)
            .await
            .unwrap();
        guard
            .check_commission("ref_a", "ref_a", "tx_2", 20.0, None)
            .await
            .unwrap();

        assert_eq!(guard.audit_log().len().await, 2);
    }
}
