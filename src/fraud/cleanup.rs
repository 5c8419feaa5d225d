//! Background cleanup of aged audit and fraud-tracking records.
//!
//! Runs on its own periodic schedule and never blocks foreground payout
//! processing. The clock is injected and the pruning step is a free function
//! so retention behavior is testable without wall-clock delays.

use crate::config::{AuditConfig, FraudConfig};
use crate::fraud::{AuditLog, Clock, FraudStateStore};
use chrono::Duration;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// One cleanup pass: drop audit entries past retention and fraud-state
/// observations older than any sliding window still needs.
pub async fn run_cleanup_once(
    audit: &AuditLog,
    state: &dyn FraudStateStore,
    clock: &dyn Clock,
    audit_config: &AuditConfig,
    fraud_config: &FraudConfig,
) {
    let now = clock.now();

    let audit_cutoff = now - Duration::days(audit_config.retention_days);
    let removed = audit.prune_older_than(audit_cutoff).await;

    // The daily-total check looks back 24h; keep a margin beyond the widest
    // window so in-flight checks never lose observations.
    let widest_minutes = fraud_config
        .velocity_window_minutes
        .max(fraud_config.origin_window_minutes)
        .max(24 * 60);
    let state_cutoff = now - Duration::minutes(widest_minutes * 2);
    state.prune(state_cutoff).await;

    if removed > 0 {
        debug!(removed = removed, "Pruned expired audit entries");
    }
}

/// Handle to a running cleanup task.
pub struct CleanupHandle {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl CleanupHandle {
    /// Signal shutdown and wait for the task to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}

/// Periodic cleanup task.
pub struct CleanupTask;

impl CleanupTask {
    pub fn spawn(
        audit: Arc<AuditLog>,
        state: Arc<dyn FraudStateStore>,
        clock: Arc<dyn Clock>,
        audit_config: AuditConfig,
        fraud_config: FraudConfig,
    ) -> CleanupHandle {
        let (tx, mut rx) = watch::channel(false);
        let interval_secs = audit_config.cleanup_interval_secs;

        let handle = tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(interval_secs.max(1)));
            // The first tick fires immediately; skip it so a fresh engine
            // does not prune before anything exists.
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        run_cleanup_once(
                            &audit,
                            state.as_ref(),
                            clock.as_ref(),
                            &audit_config,
                            &fraud_config,
                        )
                        .await;
                    }
                    _ = rx.changed() => {
                        info!("Cleanup task shutting down");
                        break;
                    }
                }
            }
        });

        CleanupHandle {
            shutdown: tx,
            handle,
        }
    }
}
