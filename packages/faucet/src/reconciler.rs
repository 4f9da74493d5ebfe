//! Balance reconciler
//!
//! Reads the recipient's live balances in the environment the recipient
//! addressed, and computes the top-up plan against the configured targets.
//! Deficits are exact `U256` arithmetic; assets already at or above target are
//! left out. A single failed read fails the whole plan.

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use dualchain_rs::{Asset, Environment, NormalizedAddress};
use futures::future::try_join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::DistributionError;

/// Read access to account balances in either environment
#[async_trait]
pub trait BalanceSource: Send + Sync {
    /// Balance of `asset` held by `account` in `environment`, in base units
    async fn balance_of(
        &self,
        environment: Environment,
        account: &NormalizedAddress,
        asset: &Asset,
    ) -> eyre::Result<U256>;

    /// Allowance the atomic contract holds over `owner`'s ERC20 `token` on
    /// Ledger-B, or `None` when this source has no contract to ask about
    async fn contract_allowance(
        &self,
        _owner: &NormalizedAddress,
        _token: Address,
    ) -> eyre::Result<Option<U256>> {
        Ok(None)
    }
}

/// One top-up entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedTransfer {
    pub asset: Asset,
    /// Balance observed before the transfer
    pub current: U256,
    /// Deficit to send
    pub amount: U256,
}

/// Ordered deficits for one recipient, in configuration order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPlan {
    pub recipient: NormalizedAddress,
    pub transfers: Vec<PlannedTransfer>,
}

impl TransferPlan {
    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.transfers.len()
    }

    pub fn environment(&self) -> Environment {
        self.recipient.environment()
    }

    /// Symbol of the entry sent under Ledger-B asset reference `reference`
    pub fn ledger_b_symbol(&self, reference: Address) -> Option<&str> {
        self.transfers
            .iter()
            .find(|t| t.asset.ledger_b.contract_reference() == reference)
            .map(|t| t.asset.symbol.as_str())
    }

    /// `(symbol, amount)` pairs, mostly for logging
    pub fn amounts(&self) -> Vec<(&str, U256)> {
        self.transfers
            .iter()
            .map(|t| (t.asset.symbol.as_str(), t.amount))
            .collect()
    }
}

/// Deficit of one asset: `max(0, target - current)`
pub fn deficit(target: U256, current: U256) -> U256 {
    target.saturating_sub(current)
}

/// Build a plan from balances read in the same order as `assets`
pub fn compute_plan(recipient: &NormalizedAddress, assets: &[Asset], balances: &[U256]) -> TransferPlan {
    let transfers = assets
        .iter()
        .zip(balances)
        .filter_map(|(asset, current)| {
            let amount = deficit(asset.target_balance, *current);
            (!amount.is_zero()).then(|| PlannedTransfer {
                asset: asset.clone(),
                current: *current,
                amount,
            })
        })
        .collect();

    TransferPlan {
        recipient: recipient.clone(),
        transfers,
    }
}

/// Computes top-up plans from live balances
#[derive(Clone)]
pub struct BalanceReconciler {
    source: Arc<dyn BalanceSource>,
    query_timeout: Duration,
}

impl BalanceReconciler {
    pub fn new(source: Arc<dyn BalanceSource>, query_timeout: Duration) -> Self {
        Self {
            source,
            query_timeout,
        }
    }

    /// Query every asset for `recipient` in its own environment and return the deficits
    pub async fn plan_distribution(
        &self,
        recipient: &NormalizedAddress,
        assets: &[Asset],
    ) -> Result<TransferPlan, DistributionError> {
        let environment = recipient.environment();

        let reads = assets.iter().map(|asset| async move {
            self.source
                .balance_of(environment, recipient, asset)
                .await
                .map_err(|e| DistributionError::balance_query(Some(asset.symbol.as_str()), format!("{:#}", e)))
        });

        let balances = match tokio::time::timeout(self.query_timeout, try_join_all(reads)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(DistributionError::balance_query(
                    None,
                    format!("balance queries exceeded {:?}", self.query_timeout),
                ))
            }
        };

        let plan = compute_plan(recipient, assets, &balances);
        debug!(
            recipient = %recipient,
            assets = assets.len(),
            deficits = plan.len(),
            "Planned distribution"
        );
        Ok(plan)
    }
}
