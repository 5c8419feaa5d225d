//! Ripple payouts cascading from milestone bonuses.

use crate::commission::{
    CommissionKind, CommissionResult, CommissionTransaction, IneligibilityReason,
};
use crate::config::CommissionConfig;
use crate::error::LedgerError;
use crate::fraud::FraudGuard;
use crate::ledger::Purse;
use crate::milestone::MilestoneAward;
use crate::storage::LedgerStore;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Pays a fixed amount to the referrer of an account that just collected a
/// milestone bonus. Amounts come from a tier table keyed on the bonus size;
/// there is no percentage math on this path.
pub struct RippleEngine {
    store: Arc<dyn LedgerStore>,
    fraud: Arc<FraudGuard>,
    config: CommissionConfig,
}

impl RippleEngine {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        fraud: Arc<FraudGuard>,
        config: CommissionConfig,
    ) -> Self {
        Self {
            store,
            fraud,
            config,
        }
    }

    /// Process the ripple for one milestone award. The synthetic transaction
    /// id is derived from the award id, so re-running an award never pays
    /// the ripple twice.
    pub async fn process(&self, award: &MilestoneAward) -> Result<CommissionResult, LedgerError> {
        let amount = match self.config.ripple_table.get(&award.bonus_points) {
            Some(&amount) => amount as f64,
            None => {
                debug!(
                    bonus_points = award.bonus_points,
                    "No ripple tier for bonus size"
                );
                return Ok(CommissionResult::Skipped(IneligibilityReason::NoRippleTier));
            }
        };

        let recipient_id = &award.recipient_account_id;
        let link = match self.store.referral_for(recipient_id).await? {
            Some(link) => link,
            None => {
                return Ok(CommissionResult::Skipped(
                    IneligibilityReason::NoReferralLink,
                ))
            }
        };

        let referrer = match self.store.account(&link.referrer_id).await? {
            Some(account) => account,
            None => {
                return Ok(CommissionResult::Skipped(
                    IneligibilityReason::ReferrerMissing,
                ))
            }
        };
        if !referrer.is_active() {
            return Ok(CommissionResult::Skipped(
                IneligibilityReason::ReferrerInactive,
            ));
        }

        let transaction_id = format!("ripple-{}", award.id);
        let verdict = self
            .fraud
            .check_commission(&referrer.id, recipient_id, &transaction_id, amount, None)
            .await?;
        if !verdict.allow {
            warn!(
                referrer_id = %referrer.id,
                award_id = %award.id,
                reasons = ?verdict.reasons,
                "Ripple payout blocked"
            );
            return Ok(CommissionResult::Skipped(IneligibilityReason::FraudBlocked));
        }

        let transaction = CommissionTransaction::new(
            &referrer.id,
            recipient_id,
            CommissionKind::Ripple,
            &transaction_id,
            award.bonus_points as f64,
            amount,
            0.0,
            &verdict.audit_id,
        );

        if !self.store.commit_commission(transaction.clone()).await? {
            return Ok(CommissionResult::Skipped(
                IneligibilityReason::DuplicateTransaction,
            ));
        }

        self.store
            .credit(
                &referrer.id,
                Purse::Income,
                amount,
                &format!("ripple from milestone award {}", award.id),
            )
            .await?;
        self.fraud.note_approved_payout(&referrer.id, amount).await;

        info!(
            referrer_id = %referrer.id,
            referee_id = %recipient_id,
            award_id = %award.id,
            amount = amount,
            "Ripple payout paid"
        );
        Ok(CommissionResult::Paid(transaction))
    }
}
