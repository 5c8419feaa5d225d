//! Engine configuration.
//!
//! All business constants live here as named, swappable configuration rather
//! than magic numbers scattered through the engines: accrual thresholds, the
//! milestone multiplier table, the ripple payout table, commission rates, and
//! the fraud heuristics. Defaults carry the production values; `from_env`
//! allows targeted overrides for deployment.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use tracing::info;

/// Top-level configuration for the reward ledger and commission engine.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    /// Accrual thresholds, milestone table, cycle expansion, vouchers
    pub reward: RewardConfig,
    /// Commission rates and the ripple payout table
    pub commission: CommissionConfig,
    /// Fraud heuristics and risk scoring
    pub fraud: FraudConfig,
    /// Audit trail retention and cleanup cadence
    pub audit: AuditConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardConfig {
    /// Points required to cross the base track and earn a sequence ticket
    pub base_threshold: u64,
    /// Points required (after completing the base track) to start a cycle
    pub cycle_threshold: u64,
    /// Point value carried by each infinity-cycle ticket, credited to income
    pub cycle_ticket_value: u64,
    /// Batch growth factor: cycle N issues `growth_factor^N` tickets
    pub cycle_growth_factor: u64,
    /// Fixed deduction to the administrative pool per cycle
    pub admin_pool_deduction: u64,
    /// Fixed deduction to the voucher pool per cycle
    pub voucher_pool_deduction: u64,
    /// Reserved account credited with the administrative pool
    pub admin_pool_account: String,
    /// Milestone table: sequence multiplier -> bonus points. Iterated in
    /// ascending multiplier order for reproducible award ordering.
    pub milestone_table: BTreeMap<u64, u64>,
    /// Days before an issued voucher expires
    pub voucher_ttl_days: i64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            base_threshold: 1_500,
            cycle_threshold: 30_000,
            cycle_ticket_value: 195_000,
            cycle_growth_factor: 4,
            admin_pool_deduction: 6_000,
            voucher_pool_deduction: 6_000,
            admin_pool_account: "pool:admin".to_string(),
            milestone_table: BTreeMap::from([
                (5, 500),
                (25, 1_500),
                (125, 3_000),
                (500, 30_000),
                (2_500, 160_000),
            ]),
            voucher_ttl_days: 90,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommissionConfig {
    /// Lifetime affiliate rate for customer referrals
    pub affiliate_rate: f64,
    /// Rate applied when a merchant earns and was referred by a merchant
    pub merchant_referral_rate: f64,
    /// Ripple table: milestone bonus points -> fixed ripple payout to the
    /// recipient's referrer. Table lookup only, no percentage math.
    pub ripple_table: BTreeMap<u64, u64>,
}

impl Default for CommissionConfig {
    fn default() -> Self {
        Self {
            affiliate_rate: 0.05,
            merchant_referral_rate: 0.02,
            ripple_table: BTreeMap::from([
                (500, 50),
                (1_500, 100),
                (3_000, 150),
                (30_000, 700),
                (160_000, 1_500),
            ]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudConfig {
    /// Sliding window for the velocity check, in minutes
    pub velocity_window_minutes: i64,
    /// Approved payouts per window that start raising risk
    pub velocity_soft_limit: usize,
    /// Approved payouts per window past which the payout is blocked outright
    pub velocity_hard_limit: usize,
    /// Single-payout amount past which risk is raised
    pub single_amount_ceiling: f64,
    /// Rolling 24h payout total past which risk is raised
    pub daily_total_ceiling: f64,
    /// Amounts at or above this that are exact multiples of 100 are treated
    /// as suspiciously round
    pub round_amount_floor: f64,
    /// Cumulative risk score at which an otherwise-allowed payout is blocked
    pub risk_score_block_threshold: u32,
    /// Sliding window for origin-context correlation, in minutes
    pub origin_window_minutes: i64,
    /// Distinct referrers seen from one origin within the window before risk
    /// is raised
    pub origin_referrer_limit: usize,
}

impl Default for FraudConfig {
    fn default() -> Self {
        Self {
            velocity_window_minutes: 60,
            velocity_soft_limit: 10,
            velocity_hard_limit: 25,
            single_amount_ceiling: 10_000.0,
            daily_total_ceiling: 50_000.0,
            round_amount_floor: 1_000.0,
            risk_score_block_threshold: 5,
            origin_window_minutes: 10,
            origin_referrer_limit: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Days audit entries are retained in memory
    pub retention_days: i64,
    /// Hard cap on retained entries regardless of age
    pub max_entries: usize,
    /// Seconds between background cleanup passes
    pub cleanup_interval_secs: u64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            retention_days: 7,
            max_entries: 100_000,
            cleanup_interval_secs: 300,
        }
    }
}

impl EngineConfig {
    /// Load defaults, then apply targeted environment overrides.
    ///
    /// Only operationally tunable knobs are exposed; the milestone and ripple
    /// tables are deployment-config territory and stay at their defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(v) = env::var("CASCADE_BASE_THRESHOLD") {
            config.reward.base_threshold = v
                .parse()
                .context("CASCADE_BASE_THRESHOLD must be an integer")?;
        }
        if let Ok(v) = env::var("CASCADE_CYCLE_THRESHOLD") {
            config.reward.cycle_threshold = v
                .parse()
                .context("CASCADE_CYCLE_THRESHOLD must be an integer")?;
        }
        if let Ok(v) = env::var("CASCADE_AFFILIATE_RATE") {
            config.commission.affiliate_rate =
                v.parse().context("CASCADE_AFFILIATE_RATE must be a float")?;
        }
        if let Ok(v) = env::var("CASCADE_MERCHANT_RATE") {
            config.commission.merchant_referral_rate =
                v.parse().context("CASCADE_MERCHANT_RATE must be a float")?;
        }
        if let Ok(v) = env::var("CASCADE_VELOCITY_HARD_LIMIT") {
            config.fraud.velocity_hard_limit = v
                .parse()
                .context("CASCADE_VELOCITY_HARD_LIMIT must be an integer")?;
        }
        if let Ok(v) = env::var("CASCADE_AUDIT_RETENTION_DAYS") {
            config.audit.retention_days = v
                .parse()
                .context("CASCADE_AUDIT_RETENTION_DAYS must be an integer")?;
        }

        info!(
            base_threshold = config.reward.base_threshold,
            cycle_threshold = config.reward.cycle_threshold,
            affiliate_rate = config.commission.affiliate_rate,
            "Engine configuration loaded"
        );

        Ok(config)
    }
}
