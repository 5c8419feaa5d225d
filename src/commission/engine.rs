//! Percentage commissions on earn events.

use crate::commission::{
    round2, CommissionKind, CommissionResult, CommissionTransaction, IneligibilityReason,
};
use crate::config::CommissionConfig;
use crate::error::LedgerError;
use crate::fraud::{FraudGuard, OriginContext};
use crate::ledger::{AccountKind, Purse};
use crate::storage::LedgerStore;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Pays the earner's referrer a percentage of every earn event.
///
/// The pipeline is fail-fast: eligibility short-circuits before the fraud
/// gate, and the store's commit-time uniqueness guard is the last word on
/// duplicates. The wallet credit happens only after the transaction record
/// is committed.
pub struct CommissionEngine {
    store: Arc<dyn LedgerStore>,
    fraud: Arc<FraudGuard>,
    config: CommissionConfig,
}

impl CommissionEngine {
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

    /// Process one earn event for commission.
    pub async fn process(
        &self,
        earner_id: &str,
        original_transaction_id: &str,
        base_amount: f64,
        context: Option<&OriginContext>,
    ) -> Result<CommissionResult, LedgerError> {
        if base_amount <= 0.0 {
            return Ok(CommissionResult::Skipped(
                IneligibilityReason::NonPositiveAmount,
            ));
        }

        let earner = match self.store.account(earner_id).await? {
            Some(account) => account,
            None => return Ok(CommissionResult::Skipped(IneligibilityReason::EarnerMissing)),
        };

        let link = match self.store.referral_for(earner_id).await? {
            Some(link) => link,
            None => {
                debug!(account_id = %earner_id, "No referrer, commission skipped");
                return Ok(CommissionResult::Skipped(
                    IneligibilityReason::NoReferralLink,
                ));
            }
        };

        if link.referrer_id == earner_id {
            return Ok(CommissionResult::Skipped(IneligibilityReason::SelfReferral));
        }

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

        // Merchant-to-merchant referrals earn the reduced rate; every other
        // pairing uses the lifetime affiliate rate.
        let (kind, rate) =
            if earner.kind == AccountKind::Merchant && referrer.kind == AccountKind::Merchant {
                (
                    CommissionKind::MerchantReferral,
                    self.config.merchant_referral_rate,
                )
            } else {
                (CommissionKind::Affiliate, self.config.affiliate_rate)
            };
        let commission_amount = round2(base_amount * rate);

        let verdict = self
            .fraud
            .check_commission(
                &referrer.id,
                earner_id,
                original_transaction_id,
                commission_amount,
                context,
            )
            .await?;
        if !verdict.allow {
            warn!(
                referrer_id = %referrer.id,
                referee_id = %earner_id,
                tx = %original_transaction_id,
                reasons = ?verdict.reasons,
                "Commission blocked"
            );
            return Ok(CommissionResult::Skipped(IneligibilityReason::FraudBlocked));
        }

        let transaction = CommissionTransaction::new(
            &referrer.id,
            earner_id,
            kind,
            original_transaction_id,
            base_amount,
            commission_amount,
            rate,
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
                commission_amount,
                &format!("commission on {original_transaction_id}"),
            )
            .await?;
        self.fraud
            .note_approved_payout(&referrer.id, commission_amount)
            .await;

        info!(
            referrer_id = %referrer.id,
            referee_id = %earner_id,
            tx = %original_transaction_id,
            kind = ?kind,
            amount = commission_amount,
            "Commission paid"
        );
        Ok(CommissionResult::Paid(transaction))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuditConfig, FraudConfig};
    use crate::fraud::{AuditLog, MemoryFraudState, SystemClock};
    use crate::ledger::{Account, AccountStatus, ReferralLink};
    use crate::storage::MemoryStore;

    async fn setup(
        referrer_kind: AccountKind,
        earner_kind: AccountKind,
    ) -> (Arc<MemoryStore>, CommissionEngine) {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_account(Account::new("ref_a", referrer_kind))
            .await
            .unwrap();
        store
            .upsert_account(Account::new("acct_b", earner_kind))
            .await
            .unwrap();
        store
            .link_referral(ReferralLink::new("ref_a", "acct_b"))
            .await
            .unwrap();

        let fraud = Arc::new(FraudGuard::new(
            store.clone(),
            Arc::new(MemoryFraudState::new()),
            Arc::new(AuditLog::new(AuditConfig::default().max_entries)),
            Arc::new(SystemClock),
            FraudConfig::default(),
        ));
        let engine = CommissionEngine::new(store.clone(), fraud, CommissionConfig::default());
        (store, engine)
    }

    #[tokio::test]
    async fn test_affiliate_commission_paid_at_five_percent() {
        let (store, engine) = setup(AccountKind::Customer, AccountKind::Customer).await;

        let result = engine.process("acct_b", "tx_1", 1_000.0, None).await.unwrap();
        let tx = result.paid().expect("commission should be paid");
        assert_eq!(tx.kind, CommissionKind::Affiliate);
        assert_eq!(tx.commission_amount, 50.0);
        assert_eq!(tx.rate, 0.05);

        let wallet = store.wallet("ref_a").await.unwrap();
        assert_eq!(wallet.balance(Purse::Income), 50.0);
    }

    #[tokio::test]
    async fn test_merchant_pair_earns_reduced_rate() {
        let (_store, engine) = setup(AccountKind::Merchant, AccountKind::Merchant).await;

        let result = engine.process("acct_b", "tx_1", 1_000.0, None).await.unwrap();
        let tx = result.paid().expect("commission should be paid");
        assert_eq!(tx.kind, CommissionKind::MerchantReferral);
        assert_eq!(tx.commission_amount, 20.0);
    }

    #[tokio::test]
    async fn test_merchant_earner_customer_referrer_uses_affiliate_rate() {
        let (_store, engine) = setup(AccountKind::Customer, AccountKind::Merchant).await;

        let result = engine.process("acct_b", "tx_1", 1_000.0, None).await.unwrap();
        assert_eq!(result.paid().unwrap().kind, CommissionKind::Affiliate);
    }

    #[tokio::test]
    async fn test_no_referrer_skips_quietly() {
        let (store, engine) = setup(AccountKind::Customer, AccountKind::Customer).await;
        store
            .upsert_account(Account::new("lone", AccountKind::Customer))
            .await
            .unwrap();

        let result = engine.process("lone", "tx_1", 1_000.0, None).await.unwrap();
        assert!(matches!(
            result,
            CommissionResult::Skipped(IneligibilityReason::NoReferralLink)
        ));
    }

    #[tokio::test]
    async fn test_suspended_referrer_receives_nothing() {
        let (store, engine) = setup(AccountKind::Customer, AccountKind::Customer).await;
        let mut referrer = store.account("ref_a").await.unwrap().unwrap();
        referrer.status = AccountStatus::Suspended;
        store.upsert_account(referrer).await.unwrap();

        let result = engine.process("acct_b", "tx_1", 1_000.0, None).await.unwrap();
        assert!(matches!(
            result,
            CommissionResult::Skipped(IneligibilityReason::ReferrerInactive)
        ));

        let wallet = store.wallet("ref_a").await.unwrap();
        assert_eq!(wallet.balance(Purse::Income), 0.0);
    }

    #[tokio::test]
    async fn test_duplicate_transaction_pays_once() {
        let (store, engine) = setup(AccountKind::Customer, AccountKind::Customer).await;

        let first = engine.process("acct_b", "tx_1", 1_000.0, None).await.unwrap();
        assert!(first.paid().is_some());

        let second = engine.process("acct_b", "tx_1", 1_000.0, None).await.unwrap();
        assert!(matches!(
            second,
            CommissionResult::Skipped(IneligibilityReason::FraudBlocked)
        ));

        let wallet = store.wallet("ref_a").await.unwrap();
        assert_eq!(wallet.balance(Purse::Income), 50.0);
    }

    #[tokio::test]
    async fn test_zero_amount_skipped() {
        let (_store, engine) = setup(AccountKind::Customer, AccountKind::Customer).await;
        let result = engine.process("acct_b", "tx_1", 0.0, None).await.unwrap();
        assert!(matches!(
            result,
            CommissionResult::Skipped(IneligibilityReason::NonPositiveAmount)
        ));
    }
}
