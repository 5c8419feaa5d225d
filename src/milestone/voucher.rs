//! Voucher pool distribution.

use crate::config::RewardConfig;
use crate::error::LedgerError;
use crate::milestone::Voucher;
use crate::storage::LedgerStore;
use std::sync::Arc;
use tracing::info;

/// Shares a cycle's voucher pool among the cycling account's historical
/// trade counterparties, pro rata by volume.
pub struct VoucherEngine {
    store: Arc<dyn LedgerStore>,
    config: RewardConfig,
}

impl VoucherEngine {
    pub fn new(store: Arc<dyn LedgerStore>, config: RewardConfig) -> Self {
        Self { store, config }
    }

    /// Distribute the voucher pool for one completed cycle.
    ///
    /// Shares are floored, so rounding dust stays undistributed rather than
    /// over-issuing. An account with no trade history gets no vouchers and
    /// the pool is simply retired; the cycle deduction already happened and
    /// is not reversed.
    pub async fn distribute(
        &self,
        account_id: &str,
        source_cycle_id: &str,
        pool_points: u64,
    ) -> Result<Vec<Voucher>, LedgerError> {
        let volumes = self.store.counterparty_volumes(account_id).await?;
        let total: f64 = volumes.iter().map(|(_, v)| v).sum();

        if volumes.is_empty() || total <= 0.0 {
            info!(
                account_id = %account_id,
                cycle_id = %source_cycle_id,
                "No trade history, voucher pool retired"
            );
            return Ok(Vec::new());
        }

        let mut vouchers = Vec::with_capacity(volumes.len());
        for (counterparty, volume) in volumes {
            let share = (pool_points as f64 * volume / total).floor() as u64;
            if share == 0 {
                continue;
            }
            vouchers.push(Voucher::new(
                counterparty,
                account_id,
                share,
                source_cycle_id,
                self.config.voucher_ttl_days,
            ));
        }

        self.store.append_vouchers(vouchers.clone()).await?;
        info!(
            account_id = %account_id,
            cycle_id = %source_cycle_id,
            vouchers = vouchers.len(),
            pool_points = pool_points,
            "Voucher pool distributed"
        );
        Ok(vouchers)
    }
}
