//! Ledger-A path: one multi-coin bank send
//!
//! A single `MsgSend` carrying every coin of the plan is all-or-nothing by the
//! ledger's transaction model. The operator's bank balances (including the
//! fee) are checked first so an unfunded asset is named in the failure.

use alloy::primitives::U256;
use async_trait::async_trait;
use dualchain_rs::cosmos::{CosmosQueryClient, CosmosSigner, CosmosSignerConfig};
use dualchain_rs::{Environment, TxStatus};
use eyre::Result;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{info, warn};

use super::{settle_outstanding, track_outstanding, TransferPath, TransferReceipt};
use crate::config::Config;
use crate::error::DistributionError;
use crate::reconciler::TransferPlan;
use crate::session::{LaneGuard, OperatorSession};

/// Required amount per denom, with the symbol reported for it: the plan's
/// coins plus `fee` folded into `fee_denom`
fn requirements<'a>(
    plan: &'a TransferPlan,
    fee_denom: &'a str,
    fee_asset: &'a str,
    fee: U256,
) -> BTreeMap<&'a str, (&'a str, U256)> {
    let mut required: BTreeMap<&str, (&str, U256)> = BTreeMap::new();
    for transfer in &plan.transfers {
        let entry = required
            .entry(transfer.asset.ledger_a_denom.as_str())
            .or_insert((transfer.asset.symbol.as_str(), U256::ZERO));
        entry.1 = entry.1.saturating_add(transfer.amount);
    }

    if !fee.is_zero() {
        let entry = required.entry(fee_denom).or_insert((fee_asset, U256::ZERO));
        entry.1 = entry.1.saturating_add(fee);
    }
    required
}

pub struct LedgerAPath {
    signer: CosmosSigner,
    queries: CosmosQueryClient,
    submit_timeout: Duration,
    /// Symbol of the fee denom, or the denom itself when it is not a configured asset
    fee_asset: String,
}

impl LedgerAPath {
    pub fn connect(config: &Config, session: &OperatorSession) -> Result<Self> {
        let request_timeout = config.timeouts.query_timeout();
        let signer = CosmosSigner::new(
            CosmosSignerConfig {
                lcd_url: config.ledger_a.lcd_url.clone(),
                chain_id: config.ledger_a.chain_id.clone(),
                prefix: config.ledger_a.prefix.clone(),
                fee_denom: config.ledger_a.fee_denom.clone(),
                gas_limit: config.ledger_a.gas_limit,
                gas_price: config.ledger_a.gas_price,
                memo: config.ledger_a.memo.clone(),
                request_timeout,
            },
            session.key().clone(),
        )?;
        let queries = CosmosQueryClient::new(&config.ledger_a.lcd_url, request_timeout)?;
        let fee_asset = config
            .assets
            .iter()
            .find(|a| a.ledger_a_denom == config.ledger_a.fee_denom)
            .map(|a| a.symbol.clone())
            .unwrap_or_else(|| config.ledger_a.fee_denom.clone());

        Ok(Self {
            signer,
            queries,
            submit_timeout: config.timeouts.submit_timeout(),
            fee_asset,
        })
    }

    async fn precheck(&self, plan: &TransferPlan) -> Result<(), DistributionError> {
        let operator = self.signer.address().to_string();
        let fee = U256::from(self.signer.fee_amount());

        let required = requirements(plan, self.signer.fee_denom(), &self.fee_asset, fee);
        for (denom, (symbol, amount)) in required {
            let balance = self
                .queries
                .get_balance(&operator, denom)
                .await
                .map_err(|e| DistributionError::balance_query(Some(symbol), format!("{:#}", e)))?;
            if balance < amount {
                warn!(
                    asset = symbol,
                    denom = denom,
                    required = %amount,
                    available = %balance,
                    "Operator balance too low on Ledger-A"
                );
                return Err(DistributionError::unfunded(
                    symbol,
                    Environment::LedgerA,
                    amount,
                    balance,
                ));
            }
        }

        Ok(())
    }

    async fn submit(&self, plan: &TransferPlan) -> Result<TransferReceipt, DistributionError> {
        self.precheck(plan).await?;

        let coins: Vec<(String, U256)> = plan
            .transfers
            .iter()
            .map(|t| (t.asset.ledger_a_denom.clone(), t.amount))
            .collect();

        let result = self
            .signer
            .send_coins(plan.recipient.ledger_a(), &coins, self.submit_timeout)
            .await
            .map_err(|e| {
                DistributionError::from_chain_error(&e, Environment::LedgerA, &self.fee_asset, None)
            })?;

        if !result.confirmed {
            return Err(DistributionError::Timeout {
                tx_reference: Some(result.tx_hash),
                reason: format!("bank send not confirmed within {:?}", self.submit_timeout),
            });
        }

        if !result.success {
            let raw_log = result.raw_log.unwrap_or_else(|| "transaction failed".to_string());
            let err = DistributionError::from_chain_error(
                &eyre::eyre!("{}", raw_log),
                Environment::LedgerA,
                &self.fee_asset,
                Some(result.tx_hash.clone()),
            );
            return Err(match err {
                DistributionError::ChainSubmission { reason } => DistributionError::ChainSubmission {
                    reason: format!("{} (tx {})", reason, result.tx_hash),
                },
                other => other,
            });
        }

        info!(
            tx_hash = %result.tx_hash,
            height = ?result.height,
            coins = coins.len(),
            "Bank send finalized"
        );

        Ok(TransferReceipt {
            tx_reference: result.tx_hash,
            height: result.height,
        })
    }
}

#[async_trait]
impl TransferPath for LedgerAPath {
    fn environment(&self) -> Environment {
        Environment::LedgerA
    }

    async fn tx_status(&self, tx_reference: &str) -> Result<TxStatus> {
        self.signer.transaction_status(tx_reference).await
    }

    async fn execute(
        &self,
        plan: &TransferPlan,
        lane: &mut LaneGuard<'_>,
    ) -> Result<TransferReceipt, DistributionError> {
        settle_outstanding(self, lane, self.submit_timeout).await?;
        let result = self.submit(plan).await;
        track_outstanding(lane, result)
    }
}
