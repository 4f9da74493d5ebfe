//! Environment transfer paths
//!
//! A path turns a [`TransferPlan`] into exactly one chain transaction in the
//! recipient's environment, or fails without moving anything.
//!
//! - `ledger_a` - one multi-coin bank `MsgSend`
//! - `ledger_b` - one `atomicMultiSend` call on the atomic contract
//!
//! Execution takes the session's lane guard for the environment. A transaction
//! that outlives its deadline is recorded on the lane, and the next execution
//! waits for it to settle before signing with the same nonce/sequence.

pub mod ledger_a;
pub mod ledger_b;

use async_trait::async_trait;
use dualchain_rs::{Environment, TxStatus};
use std::time::Duration;
use tracing::{info, warn};

use crate::error::DistributionError;
use crate::reconciler::TransferPlan;
use crate::session::LaneGuard;

pub use ledger_a::LedgerAPath;
pub use ledger_b::LedgerBPath;

/// Interval between status checks of an outstanding transaction
pub const SETTLE_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// An outstanding transaction older than this many submit deadlines is given up on
pub const ABANDON_AFTER_DEADLINES: u32 = 10;

/// A finalized distribution transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReceipt {
    /// Transaction hash in the environment's notation
    pub tx_reference: String,
    /// Block height / number of inclusion, when reported
    pub height: Option<u64>,
}

/// Submit-and-await-finality for one environment
#[async_trait]
pub trait TransferPath: Send + Sync {
    fn environment(&self) -> Environment;

    /// Where a transaction this path broadcast earlier stands
    async fn tx_status(&self, tx_reference: &str) -> eyre::Result<TxStatus>;

    /// Execute the whole plan as one transaction while holding `lane`
    async fn execute(
        &self,
        plan: &TransferPlan,
        lane: &mut LaneGuard<'_>,
    ) -> Result<TransferReceipt, DistributionError>;
}

/// Wait up to `deadline` for the lane's outstanding transaction to be
/// included or dropped. Still pending after that is a [`DistributionError::Timeout`]
/// and nothing new is signed.
pub async fn settle_outstanding(
    path: &dyn TransferPath,
    lane: &mut LaneGuard<'_>,
    deadline: Duration,
) -> Result<(), DistributionError> {
    debug_assert_eq!(lane.environment(), path.environment());
    let Some(outstanding) = lane.outstanding().cloned() else {
        return Ok(());
    };

    let started = std::time::Instant::now();
    loop {
        match path.tx_status(&outstanding.tx_reference).await {
            Ok(TxStatus::Included) | Ok(TxStatus::Dropped) => {
                info!(
                    environment = %path.environment(),
                    tx_reference = %outstanding.tx_reference,
                    "Outstanding transaction settled"
                );
                lane.clear_outstanding();
                return Ok(());
            }
            Ok(TxStatus::Pending) => {}
            Err(e) => warn!(
                tx_reference = %outstanding.tx_reference,
                error = %e,
                "Failed to query outstanding transaction"
            ),
        }

        if outstanding.since.elapsed() >= deadline * ABANDON_AFTER_DEADLINES {
            warn!(
                environment = %path.environment(),
                tx_reference = %outstanding.tx_reference,
                "Giving up on outstanding transaction"
            );
            lane.clear_outstanding();
            return Ok(());
        }

        if started.elapsed() >= deadline {
            return Err(DistributionError::Timeout {
                tx_reference: None,
                reason: format!(
                    "previous transaction {} still pending",
                    outstanding.tx_reference
                ),
            });
        }

        tokio::time::sleep(SETTLE_POLL_INTERVAL.min(deadline)).await;
    }
}

/// Record on the lane a transaction whose submission timed out after broadcast
pub fn track_outstanding(
    lane: &mut LaneGuard<'_>,
    result: Result<TransferReceipt, DistributionError>,
) -> Result<TransferReceipt, DistributionError> {
    if let Err(DistributionError::Timeout {
        tx_reference: Some(tx),
        ..
    }) = &result
    {
        lane.record_outstanding(tx.clone());
    }
    result
}
