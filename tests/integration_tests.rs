//! Integration tests for the reward ledger
//!
//! These tests verify end-to-end behavior of the engine: concurrent accrual
//! with gap-free sequencing, milestone triggers and ripple payouts,
//! commission rates and rounding, duplicate protection under races, infinity
//! cycles, and voucher distribution.

use cascade_ledger::{
    AccountKind, CommissionEngine, CommissionResult, EngineConfig, FraudGuard, LedgerStore,
    MemoryFraudState, MemoryStore, PointAccumulator, Purse, RewardEngine, SystemClock,
};
use std::sync::Arc;

// ============================================================================
// Test Helpers
// ============================================================================

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn engine() -> RewardEngine {
    init_tracing();
    RewardEngine::new(Arc::new(MemoryStore::new()), EngineConfig::default())
}

async fn register(engine: &RewardEngine, id: &str, kind: AccountKind, referred_by: Option<&str>) {
    engine.register_account(id, kind, referred_by).await.unwrap();
}

async fn income(engine: &RewardEngine, id: &str) -> f64 {
    engine.store().wallet(id).await.unwrap().balance(Purse::Income)
}

// ============================================================================
// Concurrent Accrual & Sequence Integrity
// ============================================================================

mod sequencing {
    use super::*;

    #[tokio::test]
    async fn test_concurrent_accrual_is_gap_free() {
        let store = Arc::new(MemoryStore::new());
        let config = EngineConfig::default();
        let accumulator = Arc::new(PointAccumulator::new(store.clone(), config.reward.clone()));

        for i in 0..8 {
            store
                .upsert_account(cascade_ledger::Account::new(
                    format!("acct_{i}"),
                    AccountKind::Customer,
                ))
                .await
                .unwrap();
        }

        // 8 accounts earn 10 tickets each, concurrently.
        let mut handles = Vec::new();
        for i in 0..8 {
            let accumulator = accumulator.clone();
            handles.push(tokio::spawn(async move {
                let id = format!("acct_{i}");
                let mut issued = 0;
                for _ in 0..10 {
                    let accrual = accumulator.accrue(&id, 1_500).await.unwrap();
                    issued += accrual.tickets.len();
                }
                issued
            }));
        }

        let mut total = 0;
        for handle in handles {
            total += handle.await.unwrap();
        }
        assert_eq!(total, 80);

        // Every number from 1 to 80 has exactly one ticket.
        assert_eq!(store.highest_sequence().await.unwrap(), 80);
        for sequence in 1..=80 {
            assert!(
                store.ticket_by_sequence(sequence).await.unwrap().is_some(),
                "sequence {sequence} has no ticket"
            );
        }
    }

    #[tokio::test]
    async fn test_exact_threshold_earn_resets_accumulator() {
        let engine = engine();
        register(&engine, "acct_1", AccountKind::Customer, None).await;

        let outcome = engine
            .earn_points("acct_1", "tx_1", 1_500, None)
            .await
            .unwrap();
        assert_eq!(outcome.tickets.len(), 1);

        let account = engine.store().account("acct_1").await.unwrap().unwrap();
        assert_eq!(account.accumulated_points, 0);
        assert!(account.completed_base_milestone);
    }
}

// ============================================================================
// Milestone Triggers & Ripple Payouts
// ============================================================================

mod milestones {
    use super::*;

    /// Drive the global sequence to `count` tickets across distinct accounts.
    async fn seed_tickets(engine: &RewardEngine, count: u64) {
        for i in 0..count {
            let id = format!("seed_{i}");
            register(engine, &id, AccountKind::Customer, None).await;
            engine
                .earn_points(&id, &format!("seed_tx_{i}"), 1_500, None)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_fifth_ticket_pays_holder_of_first() {
        let engine = engine();
        seed_tickets(&engine, 4).await;

        register(&engine, "trigger", AccountKind::Customer, None).await;
        let outcome = engine
            .earn_points("trigger", "tx_t", 1_500, None)
            .await
            .unwrap();

        assert_eq!(outcome.awards.len(), 1);
        let award = &outcome.awards[0];
        assert_eq!(award.recipient_sequence_number, 1);
        assert_eq!(award.multiplier, 5);
        assert_eq!(award.bonus_points, 500);

        // Holder of ticket 1 is seed_0.
        assert_eq!(income(&engine, "seed_0").await, 500.0);
    }

    #[tokio::test]
    async fn test_milestone_bonus_ripples_to_recipient_referrer() {
        let engine = engine();
        register(&engine, "upline", AccountKind::Customer, None).await;
        register(&engine, "seed_0", AccountKind::Customer, Some("upline")).await;
        // The earn itself pays the upline a 5% commission (75.00); the
        // ripple comes on top of that.
        engine
            .earn_points("seed_0", "tx_0", 1_500, None)
            .await
            .unwrap();
        assert_eq!(income(&engine, "upline").await, 75.0);
        for i in 1..4 {
            let id = format!("seed_{i}");
            register(&engine, &id, AccountKind::Customer, None).await;
            engine
                .earn_points(&id, &format!("tx_{i}"), 1_500, None)
                .await
                .unwrap();
        }

        register(&engine, "trigger", AccountKind::Customer, None).await;
        let outcome = engine
            .earn_points("trigger", "tx_t", 1_500, None)
            .await
            .unwrap();

        assert_eq!(outcome.awards.len(), 1);
        let ripple = outcome.ripples[0].paid().expect("ripple should be paid");
        assert_eq!(ripple.referrer_id, "upline");
        // 500-point bonus maps to the 50 tier, on top of the earlier
        // commission.
        assert_eq!(ripple.commission_amount, 50.0);
        assert_eq!(income(&engine, "upline").await, 125.0);
    }

    #[tokio::test]
    async fn test_sequence_125_fires_every_dividing_multiplier() {
        // 125 tickets to one account means dozens of bonus payouts in one
        // call; raise the velocity ceiling so throttling does not interfere
        // with the arithmetic under test.
        let mut config = EngineConfig::default();
        config.fraud.velocity_soft_limit = 10_000;
        config.fraud.velocity_hard_limit = 10_000;
        let engine = RewardEngine::new(Arc::new(MemoryStore::new()), config);
        register(&engine, "whale", AccountKind::Customer, None).await;

        let outcome = engine
            .earn_points("whale", "tx_big", 1_500 * 125, None)
            .await
            .unwrap();
        assert_eq!(outcome.tickets.len(), 125);

        // Ticket 125 alone pays x5 (to 25), x25 (to 5), and x125 (to 1); the
        // earlier multiples of 5 and 25 fire on their own tickets too.
        let at_125: Vec<_> = outcome
            .awards
            .iter()
            .filter(|a| a.triggering_sequence_number == 125)
            .collect();
        assert_eq!(at_125.len(), 3);
        let multipliers: Vec<u64> = at_125.iter().map(|a| a.multiplier).collect();
        assert_eq!(multipliers, vec![5, 25, 125]);
    }

    #[tokio::test]
    async fn test_reprocessing_a_trigger_never_double_pays() {
        let engine = engine();
        seed_tickets(&engine, 5).await;
        assert_eq!(income(&engine, "seed_0").await, 500.0);

        // Redelivered earn event for the triggering account.
        let duplicate = engine
            .earn_points("seed_4", "seed_tx_4", 1_500, None)
            .await
            .unwrap();
        assert!(duplicate.duplicate);
        assert_eq!(income(&engine, "seed_0").await, 500.0);
    }
}

// ============================================================================
// Commission Rates, Rounding & Duplicate Races
// ============================================================================

mod commissions {
    use super::*;
    use cascade_ledger::{Account, FraudConfig, ReferralLink};

    #[tokio::test]
    async fn test_affiliate_rate_rounds_to_cents() {
        let engine = engine();
        register(&engine, "ref_a", AccountKind::Customer, None).await;
        register(&engine, "acct_b", AccountKind::Customer, Some("ref_a")).await;

        // 0.05 * 1,111 = 55.55 exactly, despite float noise in the product.
        let outcome = engine
            .earn_points("acct_b", "tx_1", 1_111, None)
            .await
            .unwrap();
        let tx = outcome.commission.unwrap();
        assert_eq!(tx.paid().unwrap().commission_amount, 55.55);
    }

    #[tokio::test]
    async fn test_merchant_to_merchant_rate() {
        let engine = engine();
        register(&engine, "ref_m", AccountKind::Merchant, None).await;
        register(&engine, "shop", AccountKind::Merchant, Some("ref_m")).await;

        let outcome = engine
            .earn_points("shop", "tx_1", 1_000, None)
            .await
            .unwrap();
        let tx = outcome.commission.unwrap();
        assert_eq!(tx.paid().unwrap().commission_amount, 20.0);
        assert_eq!(income(&engine, "ref_m").await, 20.0);
    }

    #[tokio::test]
    async fn test_concurrent_duplicates_pay_exactly_once() {
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

        let config = EngineConfig::default();
        let fraud = Arc::new(FraudGuard::new(
            store.clone(),
            Arc::new(MemoryFraudState::new()),
            Arc::new(cascade_ledger::AuditLog::new(10_000)),
            Arc::new(SystemClock),
            FraudConfig::default(),
        ));
        let commissions = Arc::new(CommissionEngine::new(
            store.clone(),
            fraud,
            config.commission.clone(),
        ));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let commissions = commissions.clone();
            handles.push(tokio::spawn(async move {
                commissions
                    .process("acct_b", "tx_race", 1_000.0, None)
                    .await
                    .unwrap()
            }));
        }

        let mut paid = 0;
        for handle in handles {
            if handle.await.unwrap().paid().is_some() {
                paid += 1;
            }
        }
        assert_eq!(paid, 1);

        let wallet = store.wallet("ref_a").await.unwrap();
        assert_eq!(wallet.balance(Purse::Income), 50.0);
        assert_eq!(store.commissions_for("ref_a").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_self_referral_cannot_link_or_pay() {
        let engine = engine();
        register(&engine, "ref_a", AccountKind::Customer, None).await;

        // Even with a manufactured self-link in the store, no commission
        // flows.
        engine
            .store()
            .link_referral(ReferralLink::new("ref_a", "ref_a"))
            .await
            .unwrap();

        let outcome = engine
            .earn_points("ref_a", "tx_1", 1_000, None)
            .await
            .unwrap();
        assert!(matches!(
            outcome.commission,
            Some(CommissionResult::Skipped(_))
        ));
        assert_eq!(income(&engine, "ref_a").await, 0.0);
    }

    #[tokio::test]
    async fn test_unreferred_account_earns_without_commission() {
        let engine = engine();
        register(&engine, "lone", AccountKind::Customer, None).await;

        let outcome = engine
            .earn_points("lone", "tx_1", 500, None)
            .await
            .unwrap();
        assert!(outcome.commission.unwrap().paid().is_none());

        let account = engine.store().account("lone").await.unwrap().unwrap();
        assert_eq!(account.accumulated_points, 500);
    }
}

// ============================================================================
// Infinity Cycles & Voucher Distribution
// ============================================================================

mod cycles {
    use super::*;

    #[tokio::test]
    async fn test_cycle_threshold_earn_expands_and_keeps_remainder() {
        let engine = engine();
        register(&engine, "acct_1", AccountKind::Customer, None).await;

        // Complete the base track, then place the accumulator exactly at the
        // cycle threshold.
        engine
            .earn_points("acct_1", "tx_1", 1_500, None)
            .await
            .unwrap();
        let mut account = engine.store().account("acct_1").await.unwrap().unwrap();
        account.accumulated_points = 30_000;
        engine.store().upsert_account(account).await.unwrap();

        let outcome = engine
            .earn_points("acct_1", "tx_2", 0, None)
            .await
            .unwrap();

        assert_eq!(outcome.cycles.len(), 1);
        let cycle = &outcome.cycles[0].cycle;
        assert_eq!(cycle.cycle_number, 1);
        assert_eq!(cycle.admin_pool_deducted, 6_000);
        assert_eq!(cycle.voucher_pool_deducted, 6_000);
        assert!(cycle.completed);
        assert_eq!(outcome.cycles[0].tickets.len(), 4);

        let account = engine.store().account("acct_1").await.unwrap().unwrap();
        assert_eq!(account.accumulated_points, 18_000);
        assert_eq!(account.cycle_count, 1);

        // Four 195,000-point tickets land in income, and the cycle batch
        // pushed the global sequence to 5, firing the x5 milestone back at
        // the holder of ticket 1 for another 500.
        assert_eq!(income(&engine, "acct_1").await, 4.0 * 195_000.0 + 500.0);
        assert_eq!(outcome.awards.len(), 1);
        assert_eq!(income(&engine, "pool:admin").await, 6_000.0);
    }

    #[tokio::test]
    async fn test_voucher_pool_split_by_trade_volume() {
        let engine = engine();
        register(&engine, "acct_1", AccountKind::Customer, None).await;
        engine.record_trade("acct_1", "shop_a", 900.0).await.unwrap();
        engine.record_trade("acct_1", "shop_b", 300.0).await.unwrap();

        engine
            .earn_points("acct_1", "tx_1", 1_500, None)
            .await
            .unwrap();
        let mut account = engine.store().account("acct_1").await.unwrap().unwrap();
        account.accumulated_points = 30_000;
        engine.store().upsert_account(account).await.unwrap();

        let outcome = engine
            .earn_points("acct_1", "tx_2", 0, None)
            .await
            .unwrap();

        assert_eq!(outcome.vouchers.len(), 2);
        let share = |id: &str| {
            outcome
                .vouchers
                .iter()
                .find(|v| v.account_id == id)
                .map(|v| v.value_points)
                .unwrap()
        };
        assert_eq!(share("shop_a"), 4_500);
        assert_eq!(share("shop_b"), 1_500);
    }

    #[tokio::test]
    async fn test_no_trade_history_still_deducts_pools() {
        let engine = engine();
        register(&engine, "acct_1", AccountKind::Customer, None).await;
        engine
            .earn_points("acct_1", "tx_1", 1_500, None)
            .await
            .unwrap();
        let mut account = engine.store().account("acct_1").await.unwrap().unwrap();
        account.accumulated_points = 30_000;
        engine.store().upsert_account(account).await.unwrap();

        let outcome = engine
            .earn_points("acct_1", "tx_2", 0, None)
            .await
            .unwrap();

        assert_eq!(outcome.cycles.len(), 1);
        assert!(outcome.vouchers.is_empty());

        let account = engine.store().account("acct_1").await.unwrap().unwrap();
        assert_eq!(account.accumulated_points, 18_000);
    }
}

// ============================================================================
// Fraud Gate & Audit Trail
// ============================================================================

mod fraud {
    use super::*;
    use cascade_ledger::AccountStatus;

    #[tokio::test]
    async fn test_blocked_referrer_receives_no_commission() {
        let engine = engine();
        register(&engine, "ref_a", AccountKind::Customer, None).await;
        register(&engine, "acct_b", AccountKind::Customer, Some("ref_a")).await;

        let mut referrer = engine.store().account("ref_a").await.unwrap().unwrap();
        referrer.status = AccountStatus::Blocked;
        engine.store().upsert_account(referrer).await.unwrap();

        let outcome = engine
            .earn_points("acct_b", "tx_1", 1_000, None)
            .await
            .unwrap();
        assert!(outcome.commission.unwrap().paid().is_none());
        assert_eq!(income(&engine, "ref_a").await, 0.0);
    }

    #[tokio::test]
    async fn test_every_payout_leaves_an_audit_entry() {
        let engine = engine();
        register(&engine, "ref_a", AccountKind::Customer, None).await;
        register(&engine, "acct_b", AccountKind::Customer, Some("ref_a")).await;

        engine
            .earn_points("acct_b", "tx_1", 1_000, None)
            .await
            .unwrap();

        let trail = engine.audit_trail("ref_a", 10).await;
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].original_transaction_id, "tx_1");

        // The global feed sees the same entry.
        let recent = engine.recent_audit(10).await;
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, trail[0].id);

        let stats = engine.fraud_stats();
        assert_eq!(stats.checks, 1);
        assert_eq!(stats.approved, 1);
    }

    #[tokio::test]
    async fn test_commission_history_visible_to_both_sides() {
        let engine = engine();
        register(&engine, "ref_a", AccountKind::Customer, None).await;
        register(&engine, "acct_b", AccountKind::Customer, Some("ref_a")).await;

        engine
            .earn_points("acct_b", "tx_1", 1_000, None)
            .await
            .unwrap();

        assert_eq!(engine.commission_history("ref_a").await.unwrap().len(), 1);
        assert_eq!(engine.commission_history("acct_b").await.unwrap().len(), 1);
    }
}
