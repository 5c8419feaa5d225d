//! Reward engine orchestration.
//!
//! One earn event flows through the whole pipeline in order:
//!
//! 1. Idempotency claim (a retried event is acknowledged, never re-applied)
//! 2. Referral commission on the monetary amount
//! 3. Point accrual, issuing sequence tickets per threshold crossing
//! 4. Milestone triggers for every new ticket, with ripple payouts
//! 5. Infinity cycles while the account stays eligible, including voucher
//!    distribution from each cycle's pool
//!
//! Cycle tickets feed back into the milestone triggers, so a cycle batch can
//! itself produce bonuses.

use crate::commission::{CommissionEngine, CommissionResult, CommissionTransaction, RippleEngine};
use crate::config::EngineConfig;
use crate::error::LedgerError;
use crate::fraud::{
    AuditEntry, Clock, CleanupHandle, CleanupTask, FraudGuard, FraudStateStore,
    FraudStatsSnapshot, MemoryFraudState, OriginContext, SystemClock,
};
use crate::ledger::{Account, AccountKind, Purse, ReferralLink};
use crate::milestone::{
    CycleEngine, CycleOutcome, MilestoneAward, MilestoneEngine, Voucher, VoucherEngine,
};
use crate::sequence::{PointAccumulator, SequenceTicket};
use crate::storage::LedgerStore;
use std::sync::Arc;
use tracing::{error, info};

/// Everything one earn event produced.
#[derive(Debug, Default)]
pub struct EarnOutcome {
    /// True when the event was already processed; nothing else is populated
    pub duplicate: bool,
    pub commission: Option<CommissionResult>,
    pub tickets: Vec<SequenceTicket>,
    pub awards: Vec<MilestoneAward>,
    pub ripples: Vec<CommissionResult>,
    pub cycles: Vec<CycleOutcome>,
    pub vouchers: Vec<Voucher>,
}

/// Facade over the accrual, milestone, cycle, commission, and fraud
/// subsystems. One instance per process; all collaborators are shared.
pub struct RewardEngine {
    store: Arc<dyn LedgerStore>,
    config: EngineConfig,
    fraud: Arc<FraudGuard>,
    accumulator: PointAccumulator,
    commissions: CommissionEngine,
    ripples: RippleEngine,
    milestones: MilestoneEngine,
    cycles: CycleEngine,
    vouchers: VoucherEngine,
    fraud_state: Arc<dyn FraudStateStore>,
    clock: Arc<dyn Clock>,
}

impl RewardEngine {
    pub fn new(store: Arc<dyn LedgerStore>, config: EngineConfig) -> Self {
        Self::with_parts(
            store,
            config,
            Arc::new(MemoryFraudState::new()),
            Arc::new(SystemClock),
        )
    }

    /// Construct with an explicit fraud state store and clock, for tests and
    /// for deployments with persistent fraud tracking.
    pub fn with_parts(
        store: Arc<dyn LedgerStore>,
        config: EngineConfig,
        fraud_state: Arc<dyn FraudStateStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let audit = Arc::new(crate::fraud::AuditLog::new(config.audit.max_entries));
        let fraud = Arc::new(FraudGuard::new(
            store.clone(),
            fraud_state.clone(),
            audit,
            clock.clone(),
            config.fraud.clone(),
        ));

        Self {
            accumulator: PointAccumulator::new(store.clone(), config.reward.clone()),
            commissions: CommissionEngine::new(
                store.clone(),
                fraud.clone(),
                config.commission.clone(),
            ),
            ripples: RippleEngine::new(store.clone(), fraud.clone(), config.commission.clone()),
            milestones: MilestoneEngine::new(store.clone(), fraud.clone(), config.reward.clone()),
            cycles: CycleEngine::new(store.clone(), fraud.clone(), config.reward.clone()),
            vouchers: VoucherEngine::new(store.clone(), config.reward.clone()),
            fraud,
            fraud_state,
            clock,
            store,
            config,
        }
    }

    /// Spawn the background audit/fraud-state cleanup task.
    pub fn start_cleanup(&self) -> CleanupHandle {
        CleanupTask::spawn(
            self.fraud.audit_log(),
            self.fraud_state.clone(),
            self.clock.clone(),
            self.config.audit.clone(),
            self.config.fraud.clone(),
        )
    }

    /// Register a participant, optionally linking a referrer. The link is
    /// permanent; registering an already-linked referee fails.
    pub async fn register_account(
        &self,
        account_id: &str,
        kind: AccountKind,
        referred_by: Option<&str>,
    ) -> Result<(), LedgerError> {
        let mut account = Account::new(account_id, kind);
        account.referred_by = referred_by.map(str::to_string);
        self.store.upsert_account(account).await?;
        if let Some(referrer_id) = referred_by {
            self.store
                .link_referral(ReferralLink::new(referrer_id, account_id))
                .await?;
        }
        info!(account_id = %account_id, kind = ?kind, referred_by = ?referred_by, "Account registered");
        Ok(())
    }

    /// Process one earn event end to end.
    ///
    /// `amount` is the earned points; the referrer's commission percentage
    /// applies to the same amount. The (transaction, account) pair is
    /// claimed first, so a redelivered event returns a duplicate
    /// acknowledgement with no side effects. The claim is released again
    /// when a later step errors, so a failed call stays retryable.
    pub async fn earn_points(
        &self,
        account_id: &str,
        original_transaction_id: &str,
        amount: u64,
        context: Option<&OriginContext>,
    ) -> Result<EarnOutcome, LedgerError> {
        if !self
            .store
            .claim_earn_event(original_transaction_id, account_id)
            .await?
        {
            info!(
                account_id = %account_id,
                tx = %original_transaction_id,
                "Earn event already processed, acknowledging duplicate"
            );
            return Ok(EarnOutcome {
                duplicate: true,
                ..EarnOutcome::default()
            });
        }

        match self
            .apply_earn(account_id, original_transaction_id, amount, context)
            .await
        {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                if let Err(release_err) = self
                    .store
                    .release_earn_event(original_transaction_id, account_id)
                    .await
                {
                    error!(
                        account_id = %account_id,
                        tx = %original_transaction_id,
                        error = %release_err,
                        "Failed to release earn-event claim after error"
                    );
                }
                Err(e)
            }
        }
    }

    async fn apply_earn(
        &self,
        account_id: &str,
        original_transaction_id: &str,
        amount: u64,
        context: Option<&OriginContext>,
    ) -> Result<EarnOutcome, LedgerError> {
        let mut outcome = EarnOutcome::default();

        outcome.commission = Some(
            self.commissions
                .process(account_id, original_transaction_id, amount as f64, context)
                .await?,
        );

        if amount > 0 {
            // Accrue before the purse credit: the accrual commit is what
            // fails on a missing account or a contended version, and a
            // released claim must not leave a stray credit behind.
            let accrual = self.accumulator.accrue(account_id, amount).await?;
            outcome.tickets = accrual.tickets;
            self.store
                .credit(
                    account_id,
                    Purse::RewardPoints,
                    amount as f64,
                    &format!("earn event {original_transaction_id}"),
                )
                .await?;
        }

        for ticket in outcome.tickets.clone() {
            self.run_triggers(&ticket, &mut outcome).await?;
        }

        // A single event can complete several cycles when the accumulator is
        // far past the threshold.
        while let Some(cycle_outcome) = self.cycles.run_cycle(account_id).await? {
            for ticket in cycle_outcome.tickets.clone() {
                self.run_triggers(&ticket, &mut outcome).await?;
            }
            let issued = self
                .vouchers
                .distribute(
                    account_id,
                    &cycle_outcome.cycle.id,
                    cycle_outcome.cycle.voucher_pool_deducted,
                )
                .await?;
            outcome.vouchers.extend(issued);
            outcome.cycles.push(cycle_outcome);
        }

        Ok(outcome)
    }

    async fn run_triggers(
        &self,
        ticket: &SequenceTicket,
        outcome: &mut EarnOutcome,
    ) -> Result<(), LedgerError> {
        let awards = self.milestones.check_triggers(ticket).await?;
        for award in &awards {
            outcome.ripples.push(self.ripples.process(award).await?);
        }
        outcome.awards.extend(awards);
        Ok(())
    }

    /// Record a trade for voucher-distribution history.
    pub async fn record_trade(
        &self,
        account_id: &str,
        counterparty_id: &str,
        amount: f64,
    ) -> Result<(), LedgerError> {
        self.store
            .record_trade(account_id, counterparty_id, amount)
            .await
    }

    pub async fn commission_history(
        &self,
        account_id: &str,
    ) -> Result<Vec<CommissionTransaction>, LedgerError> {
        self.store.commissions_for(account_id).await
    }

    pub async fn audit_trail(&self, account_id: &str, limit: usize) -> Vec<AuditEntry> {
        self.fraud.audit_log().for_account(account_id, limit).await
    }

    /// Most recent audit entries across all accounts, newest first.
    pub async fn recent_audit(&self, limit: usize) -> Vec<AuditEntry> {
        self.fraud.audit_log().recent(limit).await
    }

    /// Whether an approved commission already exists for the exact
    /// (transaction, referrer, referee) key.
    pub async fn check_duplicate(
        &self,
        original_transaction_id: &str,
        referrer_id: &str,
        referee_id: &str,
    ) -> Result<bool, LedgerError> {
        self.store
            .has_approved_commission(original_transaction_id, referrer_id, referee_id)
            .await
    }

    pub fn fraud_stats(&self) -> FraudStatsSnapshot {
        self.fraud.stats()
    }

    pub fn store(&self) -> Arc<dyn LedgerStore> {
        self.store.clone()
    }
}
