//! Injectable fraud-tracking state.
//!
//! Velocity, rolling amount totals, and origin-context observations live
//! behind this interface so the guard never touches ambient global state.
//! The in-memory implementation backs tests and single-process deployments;
//! production would map these queries onto a persistent table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use tokio::sync::RwLock;

#[async_trait]
pub trait FraudStateStore: Send + Sync {
    /// Record an approved payout for velocity and daily-total tracking.
    async fn record_approval(&self, payer_key: &str, amount: f64, at: DateTime<Utc>);

    /// Approved payouts for the key since the cutoff.
    async fn approvals_since(&self, payer_key: &str, since: DateTime<Utc>) -> usize;

    /// Sum of approved payout amounts for the key since the cutoff.
    async fn amount_total_since(&self, payer_key: &str, since: DateTime<Utc>) -> f64;

    /// Record that a referrer was observed from an originating context.
    async fn record_origin(&self, origin: &str, referrer_id: &str, at: DateTime<Utc>);

    /// Distinct referrers observed from the origin since the cutoff.
    async fn distinct_referrers_from_origin(&self, origin: &str, since: DateTime<Utc>) -> usize;

    /// Drop observations older than the cutoff.
    async fn prune(&self, before: DateTime<Utc>);
}

/// In-memory fraud state over sliding-window deques.
#[derive(Default)]
pub struct MemoryFraudState {
    approvals: RwLock<HashMap<String, VecDeque<(DateTime<Utc>, f64)>>>,
    origins: RwLock<HashMap<String, VecDeque<(DateTime<Utc>, String)>>>,
}

impl MemoryFraudState {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FraudStateStore for MemoryFraudState {
    async fn record_approval(&self, payer_key: &str, amount: f64, at: DateTime<Utc>) {
        let mut approvals = self.approvals.write().await;
        approvals
            .entry(payer_key.to_string())
            .or_default()
            .push_back((at, amount));
    }

    async fn approvals_since(&self, payer_key: &str, since: DateTime<Utc>) -> usize {
        let approvals = self.approvals.read().await;
        approvals
            .get(payer_key)
            .map(|window| window.iter().filter(|(at, _)| *at >= since).count())
            .unwrap_or(0)
    }

    async fn amount_total_since(&self, payer_key: &str, since: DateTime<Utc>) -> f64 {
        let approvals = self.approvals.read().await;
        approvals
            .get(payer_key)
            .map(|window| {
                window
                    .iter()
                    .filter(|(at, _)| *at >= since)
                    .map(|(_, amount)| amount)
                    .sum()
            })
            .unwrap_or(0.0)
    }

    async fn record_origin(&self, origin: &str, referrer_id: &str, at: DateTime<Utc>) {
        let mut origins = self.origins.write().await;
        origins
            .entry(origin.to_string())
            .or_default()
            .push_back((at, referrer_id.to_string()));
    }

    async fn distinct_referrers_from_origin(&self, origin: &str, since: DateTime<Utc>) -> usize {
        let origins = self.origins.read().await;
        origins
            .get(origin)
            .map(|window| {
                window
                    .iter()
                    .filter(|(at, _)| *at >= since)
                    .map(|(_, referrer)| referrer.as_str())
                    .collect::<HashSet<_>>()
                    .len()
            })
            .unwrap_or(0)
    }

    async fn prune(&self, before: DateTime<Utc>) {
        {
            let mut approvals = self.approvals.write().await;
            for window in approvals.values_mut() {
                while window.front().map(|(at, _)| *at < before).unwrap_or(false) {
                    window.pop_front();
                }
            }
            approvals.retain(|_, window| !window.is_empty());
        }
        {
            let mut origins = self.origins.write().await;
            for window in origins.values_mut() {
                while window.front().map(|(at, _)| *at < before).unwrap_or(false) {
                    window.pop_front();
                }
            }
            origins.retain(|_, window| !window.is_empty());
        }
    }
}
