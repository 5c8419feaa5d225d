//! Point accrual toward sequence tickets.

use crate::config::RewardConfig;
use crate::error::LedgerError;
use crate::sequence::SequenceTicket;
use crate::storage::LedgerStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Maximum optimistic-concurrency retries before giving up
const MAX_COMMIT_RETRIES: u32 = 5;

/// Base delay for exponential backoff between retries
const RETRY_BASE_DELAY_MS: u64 = 10;

/// Result of one accrual call.
#[derive(Debug, Clone)]
pub struct Accrual {
    /// Tickets issued for each threshold crossing, in allocation order
    pub tickets: Vec<SequenceTicket>,
    /// Points left toward the next threshold after the crossings
    pub remainder: u64,
}

/// Adds earned points to an account and converts threshold crossings into
/// sequence tickets. A single large deposit may legitimately emit several
/// tickets in one call.
pub struct PointAccumulator {
    store: Arc<dyn LedgerStore>,
    config: RewardConfig,
}

impl PointAccumulator {
    pub fn new(store: Arc<dyn LedgerStore>, config: RewardConfig) -> Self {
        Self { store, config }
    }

    /// Accrue `points_delta` to the account, issuing one ticket per
    /// threshold crossing.
    ///
    /// The commit is all-or-nothing: no ticket is issued without the matching
    /// point deduction, and vice versa. On a concurrency conflict the whole
    /// accrual is recomputed and retried with exponential backoff.
    pub async fn accrue(&self, account_id: &str, points_delta: u64) -> Result<Accrual, LedgerError> {
        let threshold = self.config.base_threshold;

        for attempt in 0..MAX_COMMIT_RETRIES {
            let mut account = self
                .store
                .account(account_id)
                .await?
                .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))?;
            let expected_version = account.version;

            account.accumulated_points += points_delta;
            account.lifetime_earned_points += points_delta;

            let mut crossings: u32 = 0;
            while account.accumulated_points >= threshold {
                account.accumulated_points -= threshold;
                crossings += 1;
            }
            if crossings > 0 {
                account.completed_base_milestone = true;
            }
            let remainder = account.accumulated_points;

            match self
                .store
                .commit_accrual(account, expected_version, crossings, threshold)
                .await
            {
                Ok(tickets) => {
                    if !tickets.is_empty() {
                        info!(
                            account_id = %account_id,
                            tickets = tickets.len(),
                            first_sequence = tickets[0].sequence_number,
                            "Sequence tickets issued"
                        );
                    } else {
                        debug!(
                            account_id = %account_id,
                            remainder = remainder,
                            "Points accrued below threshold"
                        );
                    }
                    return Ok(Accrual { tickets, remainder });
                }
                Err(LedgerError::Conflict { .. }) => {
                    let delay = RETRY_BASE_DELAY_MS << attempt;
                    warn!(
                        account_id = %account_id,
                        attempt = attempt + 1,
                        delay_ms = delay,
                        "Accrual commit conflict, retrying"
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{Account, AccountKind};
    use crate::storage::MemoryStore;

    async fn setup(account_id: &str) -> (Arc<MemoryStore>, PointAccumulator) {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_account(Account::new(account_id, AccountKind::Customer))
            .await
            .unwrap();
        let accumulator = PointAccumulator::new(store.clone(), RewardConfig::default());
        (store, accumulator)
    }

    #[tokio::test]
    async fn test_accrue_below_threshold_issues_nothing() {
        let (_store, accumulator) = setup("acct_1").await;

        let accrual = accumulator.accrue("acct_1", 1_000).await.unwrap();
        assert!(accrual.tickets.is_empty());
        assert_eq!(accrual.remainder, 1_000);
    }

    #[tokio::test]
    async fn test_exact_threshold_issues_one_ticket_and_resets() {
        let (store, accumulator) = setup("acct_1").await;

        let accrual = accumulator.accrue("acct_1", 1_500).await.unwrap();
        assert_eq!(accrual.tickets.len(), 1);
        assert_eq!(accrual.tickets[0].sequence_number, 1);
        assert_eq!(accrual.remainder, 0);

        let account = store.account("acct_1").await.unwrap().unwrap();
        assert_eq!(account.accumulated_points, 0);
        assert!(account.completed_base_milestone);
        assert_eq!(account.lifetime_earned_points, 1_500);
    }

    #[tokio::test]
    async fn test_large_deposit_issues_multiple_tickets() {
        let (_store, accumulator) = setup("acct_1").await;

        let accrual = accumulator.accrue("acct_1", 5_000).await.unwrap();
        assert_eq!(accrual.tickets.len(), 3);
        assert_eq!(accrual.remainder, 500);

        let numbers: Vec<u64> = accrual
            .tickets
            .iter()
            .map(|t| t.sequence_number)
            .collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_unknown_account_errors() {
        let (_store, accumulator) = setup("acct_1").await;

        let err = accumulator.accrue("missing", 100).await.unwrap_err();
        assert!(matches!(err, LedgerError::AccountNotFound(_)));
    }
}
