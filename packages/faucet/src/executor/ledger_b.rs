//! Ledger-B path: one `atomicMultiSend` call
//!
//! Before anything is signed the operator's balance and the contract's
//! allowance are checked for every asset of the plan, so the common
//! "operator ran dry" case is reported with the asset named instead of as an
//! opaque revert. Gas estimation then simulates the call; a call that would
//! revert never reaches the mempool. A receipt with failed status is a
//! [`DistributionError::ContractReverted`], never a partial success.
//!
//! Revert data is decoded from the failed estimate, or from replaying a mined
//! call that failed, and the asset it names is mapped back to its symbol.

use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use dualchain_rs::evm::contracts::{build_transfers, describe_revert, revert_asset, AtomicMultiSend};
use dualchain_rs::evm::signer::{atomic_multi_send_request, contract_revert};
use dualchain_rs::evm::{EvmQueryClient, EvmSigner, EvmSignerConfig};
use dualchain_rs::{Environment, LedgerBAsset, TxStatus};
use eyre::{Result, WrapErr};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{settle_outstanding, track_outstanding, TransferPath, TransferReceipt};
use crate::config::Config;
use crate::error::DistributionError;
use crate::reconciler::TransferPlan;
use crate::session::{LaneGuard, OperatorSession};

/// Amount the plan needs of one Ledger-B asset reference
struct Requirement<'a> {
    symbol: &'a str,
    asset: LedgerBAsset,
    amount: U256,
}

/// Sum plan entries per asset reference, keeping plan order
fn requirements(plan: &TransferPlan) -> Vec<Requirement<'_>> {
    let mut out: Vec<Requirement<'_>> = Vec::new();
    for transfer in &plan.transfers {
        match out.iter_mut().find(|r| r.asset == transfer.asset.ledger_b) {
            Some(existing) => existing.amount = existing.amount.saturating_add(transfer.amount),
            None => out.push(Requirement {
                symbol: &transfer.asset.symbol,
                asset: transfer.asset.ledger_b,
                amount: transfer.amount,
            }),
        }
    }
    out
}

pub struct LedgerBPath {
    signer: EvmSigner,
    queries: EvmQueryClient,
    contract: Address,
    submit_timeout: Duration,
    /// Symbol reported when the operator cannot pay for gas
    fee_asset: String,
}

impl LedgerBPath {
    pub fn new(
        signer: EvmSigner,
        queries: EvmQueryClient,
        contract: Address,
        submit_timeout: Duration,
        fee_asset: String,
    ) -> Self {
        Self {
            signer,
            queries,
            contract,
            submit_timeout,
            fee_asset,
        }
    }

    pub fn connect(config: &Config, session: &OperatorSession) -> Result<Self> {
        let signer = EvmSigner::new(
            EvmSignerConfig {
                rpc_url: config.ledger_b.rpc_url.clone(),
                chain_id: config.ledger_b.chain_id,
                gas_margin_percent: config.ledger_b.gas_margin_percent,
            },
            session.key(),
        )?;
        let queries = EvmQueryClient::new(&config.ledger_b.rpc_url)?;
        let fee_asset = config
            .native_asset()
            .map(|a| a.symbol.clone())
            .unwrap_or_else(|| "native".to_string());

        Ok(Self::new(
            signer,
            queries,
            config.ledger_b.atomic_contract,
            config.timeouts.submit_timeout(),
            fee_asset,
        ))
    }

    /// Verify at startup that the node serves the configured chain
    pub async fn verify_chain_id(&self) -> Result<()> {
        let reported = self.queries.get_chain_id().await?;
        if reported != self.signer.chain_id() {
            return Err(eyre::eyre!(
                "Ledger-B node reports chain id {}, configured {}",
                reported,
                self.signer.chain_id()
            ));
        }
        Ok(())
    }

    /// Verify at startup that the configured contract is operated by our key
    pub async fn verify_contract_operator(&self) -> Result<()> {
        let operator = self.queries.get_atomic_operator(self.contract).await?;
        if operator != self.signer.address() {
            return Err(eyre::eyre!(
                "Atomic contract {} is operated by {}, not by the configured key {}",
                self.contract,
                operator,
                self.signer.address()
            ));
        }
        Ok(())
    }

    fn reverted(
        plan: &TransferPlan,
        revert: &AtomicMultiSend::AtomicMultiSendErrors,
        tx_reference: Option<String>,
    ) -> DistributionError {
        DistributionError::ContractReverted {
            tx_reference,
            asset: revert_asset(revert)
                .and_then(|reference| plan.ledger_b_symbol(reference))
                .map(str::to_string),
            reason: describe_revert(revert),
        }
    }

    fn chain_error(&self, plan: &TransferPlan, err: &eyre::Report, tx_reference: Option<String>) -> DistributionError {
        match contract_revert(err) {
            Some(revert) => Self::reverted(plan, &revert, tx_reference),
            None => DistributionError::from_chain_error(err, Environment::LedgerB, &self.fee_asset, tx_reference),
        }
    }

    async fn precheck(&self, plan: &TransferPlan) -> Result<(), DistributionError> {
        let operator = self.signer.address();

        for req in requirements(plan) {
            let balance = self
                .queries
                .get_asset_balance(&req.asset, operator)
                .await
                .map_err(|e| DistributionError::balance_query(Some(req.symbol), format!("{:#}", e)))?;
            if balance < req.amount {
                warn!(
                    asset = req.symbol,
                    required = %req.amount,
                    available = %balance,
                    "Operator balance too low on Ledger-B"
                );
                return Err(DistributionError::unfunded(
                    req.symbol,
                    Environment::LedgerB,
                    req.amount,
                    balance,
                ));
            }

            if let LedgerBAsset::Erc20(token) = req.asset {
                let allowance = self
                    .queries
                    .get_erc20_allowance(token, operator, self.contract)
                    .await
                    .map_err(|e| {
                        DistributionError::balance_query(Some(req.symbol), format!("{:#}", e))
                    })?;
                if allowance < req.amount {
                    warn!(
                        asset = req.symbol,
                        required = %req.amount,
                        allowance = %allowance,
                        contract = %self.contract,
                        "Atomic contract allowance too low"
                    );
                    return Err(DistributionError::unfunded(
                        req.symbol,
                        Environment::LedgerB,
                        req.amount,
                        allowance,
                    ));
                }
            }
        }

        Ok(())
    }

    async fn submit(&self, plan: &TransferPlan) -> Result<TransferReceipt, DistributionError> {
        self.precheck(plan).await?;

        let entries: Vec<(Address, U256)> = plan
            .transfers
            .iter()
            .map(|t| (t.asset.ledger_b.contract_reference(), t.amount))
            .collect();
        let request =
            atomic_multi_send_request(self.contract, plan.recipient.ledger_b(), build_transfers(&entries));

        let submit = async {
            let prepared = self.signer.prepare(request.clone()).await?;
            self.signer.broadcast(prepared).await
        };
        let tx_hash = match tokio::time::timeout(self.submit_timeout, submit).await {
            Ok(Ok(hash)) => hash,
            Ok(Err(e)) => return Err(self.chain_error(plan, &e, None)),
            Err(_) => {
                return Err(DistributionError::Timeout {
                    tx_reference: None,
                    reason: format!("submission exceeded {:?}", self.submit_timeout),
                })
            }
        };
        let tx_reference = tx_hash.to_string();
        debug!(tx_hash = %tx_reference, recipient = %plan.recipient, "atomicMultiSend broadcast");

        let receipt = self
            .signer
            .wait_for_receipt(tx_hash, self.submit_timeout)
            .await
            .map_err(|e| self.chain_error(plan, &e, Some(tx_reference.clone())))?;

        if !receipt.status() {
            let block = receipt.block_number.unwrap_or_default();
            // The reverted call changed nothing in its block, so replaying
            // against that block's state reproduces the reason
            return Err(match self.signer.replay_revert(&request, block).await {
                Some(revert) => Self::reverted(plan, &revert, Some(tx_reference)),
                None => DistributionError::ContractReverted {
                    tx_reference: Some(tx_reference),
                    asset: None,
                    reason: format!("atomicMultiSend reverted in block {}", block),
                },
            });
        }

        info!(
            tx_hash = %tx_reference,
            block = ?receipt.block_number,
            gas_used = %receipt.gas_used,
            transfers = plan.len(),
            "atomicMultiSend finalized"
        );

        Ok(TransferReceipt {
            tx_reference,
            height: receipt.block_number,
        })
    }
}

#[async_trait]
impl TransferPath for LedgerBPath {
    fn environment(&self) -> Environment {
        Environment::LedgerB
    }

    async fn tx_status(&self, tx_reference: &str) -> Result<TxStatus> {
        let hash: B256 = tx_reference
            .parse()
            .wrap_err_with(|| format!("Invalid transaction hash {}", tx_reference))?;
        self.signer.transaction_status(hash).await
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
