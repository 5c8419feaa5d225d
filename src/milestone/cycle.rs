//! Infinity-cycle expansion.

use crate::config::RewardConfig;
use crate::error::LedgerError;
use crate::fraud::FraudGuard;
use crate::ledger::Purse;
use crate::milestone::Cycle;
use crate::sequence::SequenceTicket;
use crate::storage::LedgerStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const MAX_COMMIT_RETRIES: u32 = 5;
const RETRY_BASE_DELAY_MS: u64 = 10;

/// Result of one completed cycle.
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub cycle: Cycle,
    pub tickets: Vec<SequenceTicket>,
}

/// Expands eligible accounts into infinity-cycle ticket batches.
///
/// Eligibility requires a completed base track and accumulated points at or
/// past the cycle threshold. Each cycle deducts only the two fixed pools
/// from the accumulator; the remaining points stay and may qualify the
/// account for the next cycle immediately.
pub struct CycleEngine {
    store: Arc<dyn LedgerStore>,
    fraud: Arc<FraudGuard>,
    config: RewardConfig,
}

impl CycleEngine {
    pub fn new(store: Arc<dyn LedgerStore>, fraud: Arc<FraudGuard>, config: RewardConfig) -> Self {
        Self {
            store,
            fraud,
            config,
        }
    }

    pub async fn is_eligible(&self, account_id: &str) -> Result<bool, LedgerError> {
        let account = self
            .store
            .account(account_id)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))?;
        Ok(account.completed_base_milestone
            && account.accumulated_points >= self.config.cycle_threshold)
    }

    /// Run at most one cycle for the account. Returns `None` when the
    /// account is not eligible or the payout is blocked by the fraud gate.
    pub async fn run_cycle(&self, account_id: &str) -> Result<Option<CycleOutcome>, LedgerError> {
        let pool_total = self.config.admin_pool_deduction + self.config.voucher_pool_deduction;

        for attempt in 0..MAX_COMMIT_RETRIES {
            let mut account = self
                .store
                .account(account_id)
                .await?
                .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))?;
            let expected_version = account.version;

            if !account.completed_base_milestone
                || account.accumulated_points < self.config.cycle_threshold
                || account.accumulated_points < pool_total
            {
                return Ok(None);
            }

            // Cycle numbers start at 1; the Nth cycle issues 4^N tickets.
            let cycle_number = account.cycle_count + 1;
            let tickets = self
                .config
                .cycle_growth_factor
                .checked_pow(cycle_number as u32)
                .filter(|&n| n <= u32::MAX as u64)
                .ok_or_else(|| {
                    LedgerError::Infrastructure(format!(
                        "cycle batch size overflow at cycle {cycle_number}"
                    ))
                })? as u32;
            let income_credit = (tickets as u64 * self.config.cycle_ticket_value) as f64;

            let payout_tx = format!("cycle-{account_id}-{cycle_number}");
            let verdict = self
                .fraud
                .check_payout(account_id, &payout_tx, income_credit)
                .await?;
            if !verdict.allow {
                warn!(
                    account_id = %account_id,
                    cycle_number = cycle_number,
                    reasons = ?verdict.reasons,
                    "Cycle expansion blocked"
                );
                return Ok(None);
            }

            let points_at_start = account.accumulated_points;
            account.accumulated_points -= pool_total;
            account.cycle_count += 1;

            let cycle = Cycle::new(
                account_id,
                cycle_number,
                points_at_start,
                tickets,
                self.config.admin_pool_deduction,
                self.config.voucher_pool_deduction,
            );

            match self
                .store
                .commit_cycle(
                    account,
                    expected_version,
                    cycle,
                    self.config.cycle_ticket_value,
                    income_credit,
                )
                .await
            {
                Ok((cycle, tickets)) => {
                    self.store
                        .credit(
                            &self.config.admin_pool_account,
                            Purse::Income,
                            self.config.admin_pool_deduction as f64,
                            &format!("cycle {} admin pool", cycle.id),
                        )
                        .await?;
                    self.fraud
                        .note_approved_payout(account_id, income_credit)
                        .await;
                    info!(
                        account_id = %account_id,
                        cycle_id = %cycle.id,
                        cycle_number = cycle.cycle_number,
                        tickets = tickets.len(),
                        income_credit = income_credit,
                        "Infinity cycle completed"
                    );
                    return Ok(Some(CycleOutcome { cycle, tickets }));
                }
                Err(LedgerError::Conflict { .. }) => {
                    let delay = RETRY_BASE_DELAY_MS << attempt;
                    warn!(
                        account_id = %account_id,
                        attempt = attempt + 1,
                        delay_ms = delay,
                        "Cycle commit conflict, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                Err(e) => return Err(e),
            }
        }

        Err(LedgerError::Conflict {
            account_id: account_id.to_string(),
        })
    }
}
