//! Multiple-of-milestone trigger evaluation.

use crate::config::RewardConfig;
use crate::error::LedgerError;
use crate::fraud::FraudGuard;
use crate::ledger::Purse;
use crate::milestone::MilestoneAward;
use crate::sequence::SequenceTicket;
use crate::storage::LedgerStore;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Evaluates every newly issued ticket against the milestone table and pays
/// the resulting bonuses.
pub struct MilestoneEngine {
    store: Arc<dyn LedgerStore>,
    fraud: Arc<FraudGuard>,
    config: RewardConfig,
}

impl MilestoneEngine {
    pub fn new(store: Arc<dyn LedgerStore>, fraud: Arc<FraudGuard>, config: RewardConfig) -> Self {
        Self {
            store,
            fraud,
            config,
        }
    }

    /// Check a freshly issued ticket against every table multiplier, in
    /// ascending multiplier order. A ticket landing on several multiples
    /// (e.g. sequence 125 for multipliers 5 and 25) produces one award per
    /// qualifying multiplier, each to the holder of the corresponding
    /// earlier ticket.
    ///
    /// Awards are idempotent on the (recipient, trigger, multiplier) triple;
    /// re-running a trigger never double-pays. A missing recipient ticket is
    /// a store invariant violation: it is counted and skipped, never paid.
    pub async fn check_triggers(
        &self,
        trigger: &SequenceTicket,
    ) -> Result<Vec<MilestoneAward>, LedgerError> {
        let sequence = trigger.sequence_number;
        let mut awards = Vec::new();

        for (&multiplier, &bonus_points) in &self.config.milestone_table {
            if multiplier == 0 || sequence % multiplier != 0 {
                continue;
            }
            let recipient_sequence = sequence / multiplier;
            if recipient_sequence == 0 {
                continue;
            }

            let recipient_ticket = match self.store.ticket_by_sequence(recipient_sequence).await? {
                Some(ticket) => ticket,
                None => {
                    // Sequence numbers are gap-free, so every earlier number
                    // must have a ticket.
                    error!(
                        trigger_sequence = sequence,
                        recipient_sequence = recipient_sequence,
                        "Recipient ticket missing for milestone trigger"
                    );
                    self.fraud.note_invariant_violation();
                    continue;
                }
            };

            if self
                .store
                .award_exists(recipient_sequence, sequence, multiplier)
                .await?
            {
                continue;
            }

            let recipient = recipient_ticket.owner_account_id.clone();
            let payout_tx = format!("milestone-{sequence}-{recipient_sequence}-{multiplier}");
            let verdict = self
                .fraud
                .check_payout(&recipient, &payout_tx, bonus_points as f64)
                .await?;
            if !verdict.allow {
                warn!(
                    account_id = %recipient,
                    trigger_sequence = sequence,
                    multiplier = multiplier,
                    reasons = ?verdict.reasons,
                    "Milestone bonus blocked"
                );
                continue;
            }

            let award = MilestoneAward::new(
                recipient.clone(),
                recipient_sequence,
                sequence,
                multiplier,
                bonus_points,
            );

            // A concurrent trigger for the same triple may have landed
            // between the existence check and here; the store insert is the
            // authoritative guard.
            if !self.store.append_award(award.clone()).await? {
                continue;
            }

            self.store
                .credit(
                    &recipient,
                    Purse::Income,
                    bonus_points as f64,
                    &format!("milestone x{multiplier} bonus from sequence {sequence}"),
                )
                .await?;
            self.fraud
                .note_approved_payout(&recipient, bonus_points as f64)
                .await;

            info!(
                account_id = %recipient,
                recipient_sequence = recipient_sequence,
                trigger_sequence = sequence,
                multiplier = multiplier,
                bonus_points = bonus_points,
                "Milestone bonus awarded"
            );
            awards.push(award);
        }

        Ok(awards)
    }
}
