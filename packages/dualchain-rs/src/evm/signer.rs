//! Ledger-B Transaction Signing Module
//!
//! Wraps the operator key in alloy's `EthereumWallet` and submits
//! transactions to the contract environment.
//!
//! ## Features
//!
//! - Explicit nonce (counting pending transactions), gas limit and gas price filling
//! - Gas estimation with a safety margin
//! - Submit-and-await-receipt with a caller-provided deadline
//! - Status lookup for a transaction left pending by an earlier deadline
//! - Revert data decoding from failed estimates and replayed calls
//! - Atomic multi-send call construction

use alloy::{
    network::{Ethereum, EthereumWallet, TransactionBuilder},
    primitives::{Address, Bytes, FixedBytes, U256},
    providers::{Provider, ProviderBuilder, RootProvider},
    rpc::types::{BlockId, TransactionReceipt, TransactionRequest},
    sol_types::SolCall,
    transports::{
        http::{Client, Http},
        TransportError,
    },
};
use eyre::{eyre, Result, WrapErr};
use std::time::Duration;
use tracing::{debug, info};

use crate::evm::contracts::{decode_revert, native_value, AtomicMultiSend};
use crate::key::OperatorKey;
use crate::types::TxStatus;

/// Gas estimate is multiplied by this percentage before submission
pub const DEFAULT_GAS_MARGIN_PERCENT: u64 = 120;

type WalletProvider = alloy::providers::fillers::FillProvider<
    alloy::providers::fillers::JoinFill<
        alloy::providers::Identity,
        alloy::providers::fillers::WalletFiller<EthereumWallet>,
    >,
    RootProvider<Http<Client>>,
    Http<Client>,
    Ethereum,
>;

/// Configuration for the Ledger-B signer
#[derive(Debug, Clone)]
pub struct EvmSignerConfig {
    /// JSON-RPC URL of the contract environment
    pub rpc_url: String,
    /// EIP-155 chain ID
    pub chain_id: u64,
    /// Percentage applied to gas estimates (120 = +20%)
    pub gas_margin_percent: u64,
}

/// Ledger-B transaction signer bound to the operator key
pub struct EvmSigner {
    /// Signer's address
    address: Address,
    /// Chain ID
    chain_id: u64,
    /// Gas margin percentage
    gas_margin_percent: u64,
    /// Provider with wallet attached
    provider: WalletProvider,
}

impl EvmSigner {
    /// Create a new signer for the operator key
    pub fn new(config: EvmSignerConfig, key: &OperatorKey) -> Result<Self> {
        let wallet = EthereumWallet::from(key.signer().clone());

        let provider = ProviderBuilder::new().wallet(wallet).on_http(
            config
                .rpc_url
                .parse()
                .map_err(|e| eyre!("Invalid RPC URL: {}", e))?,
        );

        info!(
            address = %key.address(),
            chain_id = config.chain_id,
            "Ledger-B signer initialized"
        );

        Ok(Self {
            address: key.address(),
            chain_id: config.chain_id,
            gas_margin_percent: config.gas_margin_percent.max(100),
            provider,
        })
    }

    /// Get the signer's address
    pub fn address(&self) -> Address {
        self.address
    }

    /// Get the chain ID
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    // =========================================================================
    // Nonce & Gas
    // =========================================================================

    /// Get the next nonce for this signer, counting transactions still in the mempool
    pub async fn get_nonce(&self) -> Result<u64> {
        let nonce = self
            .provider
            .get_transaction_count(self.address)
            .pending()
            .await
            .wrap_err("Failed to get nonce")?;
        Ok(nonce)
    }

    /// Estimate gas for a transaction
    pub async fn estimate_gas(&self, tx: &TransactionRequest) -> Result<u64> {
        let gas = self
            .provider
            .estimate_gas(tx)
            .await
            .wrap_err("Failed to estimate gas")?;
        Ok(gas)
    }

    /// Get current gas price
    pub async fn get_gas_price(&self) -> Result<u128> {
        let price = self
            .provider
            .get_gas_price()
            .await
            .wrap_err("Failed to get gas price")?;
        Ok(price)
    }

    /// Apply the configured margin to a gas estimate
    pub fn with_margin(&self, estimate: u64) -> u64 {
        estimate.saturating_mul(self.gas_margin_percent) / 100
    }

    /// Fill sender, nonce, chain id, gas price and gas limit.
    ///
    /// Gas estimation runs the call against current state, so a transfer that
    /// would revert fails here before anything is broadcast.
    pub async fn prepare(&self, tx: TransactionRequest) -> Result<TransactionRequest> {
        let tx = tx.with_from(self.address).with_chain_id(self.chain_id);

        let gas = self.estimate_gas(&tx).await?;
        let gas_price = self.get_gas_price().await?;
        let nonce = self.get_nonce().await?;

        debug!(
            nonce = nonce,
            gas_estimate = gas,
            gas_price = gas_price,
            "Prepared Ledger-B transaction"
        );

        Ok(tx
            .with_nonce(nonce)
            .with_gas_price(gas_price)
            .with_gas_limit(self.with_margin(gas)))
    }

    // =========================================================================
    // Transaction Sending
    // =========================================================================

    /// Broadcast a prepared transaction and return its hash
    pub async fn broadcast(&self, tx: TransactionRequest) -> Result<FixedBytes<32>> {
        let pending = self
            .provider
            .send_transaction(tx)
            .await
            .wrap_err("Failed to send transaction")?;

        Ok(*pending.tx_hash())
    }

    /// Wait for a transaction's receipt, polling until the deadline
    pub async fn wait_for_receipt(
        &self,
        tx_hash: FixedBytes<32>,
        timeout: Duration,
    ) -> Result<TransactionReceipt> {
        let start = std::time::Instant::now();
        let poll_interval = Duration::from_millis(500);

        while start.elapsed() < timeout {
            if let Some(receipt) = self.provider.get_transaction_receipt(tx_hash).await? {
                return Ok(receipt);
            }
            tokio::time::sleep(poll_interval).await;
        }

        Err(eyre!(
            "Transaction {} not confirmed after {:?}",
            tx_hash,
            timeout
        ))
    }

    /// Where a previously broadcast transaction stands
    pub async fn transaction_status(&self, tx_hash: FixedBytes<32>) -> Result<TxStatus> {
        if self
            .provider
            .get_transaction_receipt(tx_hash)
            .await
            .wrap_err("Failed to query receipt")?
            .is_some()
        {
            return Ok(TxStatus::Included);
        }

        let known = self
            .provider
            .get_transaction_by_hash(tx_hash)
            .await
            .wrap_err("Failed to query transaction")?;
        Ok(if known.is_some() {
            TxStatus::Pending
        } else {
            TxStatus::Dropped
        })
    }

    /// Re-run a mined call against the state of `block` to recover its revert reason
    pub async fn replay_revert(
        &self,
        tx: &TransactionRequest,
        block: u64,
    ) -> Option<AtomicMultiSend::AtomicMultiSendErrors> {
        let tx = tx.clone().with_from(self.address);
        match self.provider.call(&tx).block(BlockId::number(block)).await {
            Ok(_) => None,
            Err(e) => revert_of_transport(&e),
        }
    }

    /// Get the native balance of this signer
    pub async fn get_balance(&self) -> Result<U256> {
        let balance = self.provider.get_balance(self.address).await?;
        Ok(balance)
    }
}

fn revert_of_transport(err: &TransportError) -> Option<AtomicMultiSend::AtomicMultiSendErrors> {
    let data = err.as_error_resp()?.as_revert_data()?;
    decode_revert(&data)
}

/// Atomic contract revert carried anywhere in an error chain, e.g. a failed gas estimate
pub fn contract_revert(err: &eyre::Report) -> Option<AtomicMultiSend::AtomicMultiSendErrors> {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<TransportError>())
        .find_map(revert_of_transport)
}

/// Build the unsigned `atomicMultiSend` call with the summed native value attached
pub fn atomic_multi_send_request(
    contract: Address,
    recipient: Address,
    transfers: Vec<AtomicMultiSend::Transfer>,
) -> TransactionRequest {
    let value = native_value(&transfers);
    let data = AtomicMultiSend::atomicMultiSendCall {
        recipient,
        transfers,
    }
    .abi_encode();

    TransactionRequest::default()
        .with_to(contract)
        .with_input(Bytes::from(data))
        .with_value(value)
}
