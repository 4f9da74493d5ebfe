//! Ledger-B Query Helpers
//!
//! Typed read-only calls against the contract environment: native balance,
//! ERC20 balances and allowances, and the atomic contract's operator.

use alloy::{
    primitives::{Address, U256},
    providers::{Provider, ProviderBuilder, RootProvider},
    transports::http::{Client, Http},
};
use eyre::{eyre, Result};

use crate::evm::contracts::{AtomicMultiSend, ERC20};
use crate::types::LedgerBAsset;

/// Ledger-B query client
///
/// Uses a read-only provider (no signer needed).
#[derive(Clone)]
pub struct EvmQueryClient {
    /// Read-only provider
    provider: RootProvider<Http<Client>>,
}

impl EvmQueryClient {
    /// Create a new query client
    pub fn new(rpc_url: &str) -> Result<Self> {
        let provider = ProviderBuilder::new().on_http(
            rpc_url
                .parse()
                .map_err(|e| eyre!("Invalid RPC URL: {}", e))?,
        );

        Ok(Self { provider })
    }

    // =========================================================================
    // Balance Queries
    // =========================================================================

    /// Get native coin balance for an address
    pub async fn get_native_balance(&self, address: Address) -> Result<U256> {
        let balance = self
            .provider
            .get_balance(address)
            .await
            .map_err(|e| eyre!("Failed to get native balance: {}", e))?;
        Ok(balance)
    }

    /// Get ERC20 token balance
    pub async fn get_erc20_balance(&self, token_address: Address, account: Address) -> Result<U256> {
        let contract = ERC20::new(token_address, &self.provider);
        let result = contract
            .balanceOf(account)
            .call()
            .await
            .map_err(|e| eyre!("Failed to get ERC20 balance of {}: {}", token_address, e))?;

        Ok(result._0)
    }

    /// Get ERC20 allowance
    pub async fn get_erc20_allowance(
        &self,
        token_address: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256> {
        let contract = ERC20::new(token_address, &self.provider);
        let result = contract
            .allowance(owner, spender)
            .call()
            .await
            .map_err(|e| eyre!("Failed to get allowance on {}: {}", token_address, e))?;

        Ok(result._0)
    }

    /// Balance of either kind of Ledger-B asset
    pub async fn get_asset_balance(&self, asset: &LedgerBAsset, account: Address) -> Result<U256> {
        match asset {
            LedgerBAsset::Native => self.get_native_balance(account).await,
            LedgerBAsset::Erc20(token) => self.get_erc20_balance(*token, account).await,
        }
    }

    // =========================================================================
    // Atomic Contract Queries
    // =========================================================================

    /// Current operator of the atomic contract
    pub async fn get_atomic_operator(&self, contract_address: Address) -> Result<Address> {
        let contract = AtomicMultiSend::new(contract_address, &self.provider);
        let result = contract
            .operator()
            .call()
            .await
            .map_err(|e| eyre!("Failed to query atomic contract operator: {}", e))?;

        Ok(result._0)
    }

    // =========================================================================
    // Chain Queries
    // =========================================================================

    /// Get current block number
    pub async fn get_block_number(&self) -> Result<u64> {
        let block = self.provider.get_block_number().await?;
        Ok(block)
    }

    /// Get the chain id reported by the node
    pub async fn get_chain_id(&self) -> Result<u64> {
        let id = self.provider.get_chain_id().await?;
        Ok(id)
    }
}
