//! Immutable audit trail.
//!
//! One entry per fraud-check call, whatever the outcome. Entries are
//! append-only and queryable; retention is bounded by age and a hard entry
//! cap, enforced by the background cleanup task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Coarse risk classification gating payout approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskLevel {
    Low = 0,
    Medium = 1,
    High = 2,
}

/// Outcome recorded for an attempted payout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditDecision {
    Approved,
    Rejected,
    /// Allowed, but carrying non-zero risk worth manual review
    Flagged,
}

/// A single audit record. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    /// Accounts involved in the attempted payout
    pub actors: Vec<String>,
    pub original_transaction_id: String,
    pub amount: f64,
    pub risk_level: RiskLevel,
    pub reasons: Vec<String>,
    pub decision: AuditDecision,
}

impl AuditEntry {
    pub fn new(
        actors: Vec<String>,
        original_transaction_id: &str,
        amount: f64,
        risk_level: RiskLevel,
        reasons: Vec<String>,
        decision: AuditDecision,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: format!("audit_{}", Uuid::new_v4()),
            timestamp,
            actors,
            original_transaction_id: original_transaction_id.to_string(),
            amount,
            risk_level,
            reasons,
            decision,
        }
    }
}

/// Append-only audit log with bounded in-memory retention.
pub struct AuditLog {
    entries: RwLock<VecDeque<AuditEntry>>,
    max_entries: usize,
}

impl AuditLog {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::new()),
            max_entries,
        }
    }

    /// Append an entry, mirroring it to tracing for immediate visibility.
    pub async fn record(&self, entry: AuditEntry) {
        match entry.decision {
            AuditDecision::Approved => tracing::debug!(
                audit_id = %entry.id,
                tx = %entry.original_transaction_id,
                "AUDIT approved"
            ),
            AuditDecision::Flagged => tracing::warn!(
                audit_id = %entry.id,
                tx = %entry.original_transaction_id,
                reasons = ?entry.reasons,
                "AUDIT flagged for review"
            ),
            AuditDecision::Rejected => tracing::warn!(
                audit_id = %entry.id,
                tx = %entry.original_transaction_id,
                risk = ?entry.risk_level,
                reasons = ?entry.reasons,
                "AUDIT rejected"
            ),
        }

        let mut entries = self.entries.write().await;
        entries.push_back(entry);
        while entries.len() > self.max_entries {
            entries.pop_front();
        }
    }

    pub async fn recent(&self, limit: usize) -> Vec<AuditEntry> {
        let entries = self.entries.read().await;
        entries.iter().rev().take(limit).cloned().collect()
    }

    /// Entries involving the given account, newest first.
    pub async fn for_account(&self, account_id: &str, limit: usize) -> Vec<AuditEntry> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .rev()
            .filter(|e| e.actors.iter().any(|a| a == account_id))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Whether an approved entry exists for the transaction id. Rejected
    /// attempts never key duplicate prevention; a later legitimate retry
    /// with a corrected payload must not be blocked by them.
    pub async fn has_approved(&self, original_transaction_id: &str) -> bool {
        let entries = self.entries.read().await;
        entries.iter().any(|e| {
            e.original_transaction_id == original_transaction_id
                && matches!(
                    e.decision,
                    AuditDecision::Approved | AuditDecision::Flagged
                )
        })
    }

    /// Drop entries older than the cutoff. Returns how many were removed.
    pub async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|e| e.timestamp >= cutoff);
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
