//! Chain-backed balance reads and operator funding checks

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dualchain_rs::cosmos::CosmosQueryClient;
use dualchain_rs::evm::EvmQueryClient;
use dualchain_rs::{Asset, Environment, LedgerBAsset, NormalizedAddress};
use eyre::Result;
use serde::Serialize;

use crate::config::Config;
use crate::reconciler::BalanceSource;

/// Reads balances from the Ledger-A LCD and the Ledger-B JSON-RPC endpoint
#[derive(Clone)]
pub struct ChainBalances {
    ledger_a: CosmosQueryClient,
    ledger_b: EvmQueryClient,
    /// Spender whose ERC20 allowances are reported
    atomic_contract: Address,
}

impl ChainBalances {
    pub fn new(ledger_a: CosmosQueryClient, ledger_b: EvmQueryClient, atomic_contract: Address) -> Self {
        Self {
            ledger_a,
            ledger_b,
            atomic_contract,
        }
    }

    pub fn connect(config: &Config) -> Result<Self> {
        Ok(Self::new(
            CosmosQueryClient::new(&config.ledger_a.lcd_url, config.timeouts.query_timeout())?,
            EvmQueryClient::new(&config.ledger_b.rpc_url)?,
            config.ledger_b.atomic_contract,
        ))
    }
}

#[async_trait]
impl BalanceSource for ChainBalances {
    async fn balance_of(
        &self,
        environment: Environment,
        account: &NormalizedAddress,
        asset: &Asset,
    ) -> Result<U256> {
        match environment {
            Environment::LedgerA => {
                self.ledger_a
                    .get_balance(account.ledger_a(), &asset.ledger_a_denom)
                    .await
            }
            Environment::LedgerB => {
                self.ledger_b
                    .get_asset_balance(&asset.ledger_b, account.ledger_b())
                    .await
            }
        }
    }

    async fn contract_allowance(&self, owner: &NormalizedAddress, token: Address) -> Result<Option<U256>> {
        self.ledger_b
            .get_erc20_allowance(token, owner.ledger_b(), self.atomic_contract)
            .await
            .map(Some)
    }
}

// ============================================================================
// Operator Funding
// ============================================================================

/// What falls short of one request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ShortfallKind {
    /// Operator's own holdings
    Balance,
    /// What the atomic contract may pull from the operator
    Allowance,
}

/// An asset the operator cannot fund one request of
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FundingShortfall {
    pub asset: String,
    pub environment: Environment,
    pub kind: ShortfallKind,
    pub available: String,
    pub required: String,
}

/// Result of one operator funding check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FundingReport {
    pub ready: bool,
    pub shortfalls: Vec<FundingShortfall>,
    pub checked_at: DateTime<Utc>,
}

fn shortfall(asset: &Asset, environment: Environment, kind: ShortfallKind, available: U256) -> FundingShortfall {
    FundingShortfall {
        asset: asset.symbol.clone(),
        environment,
        kind,
        available: dualchain_rs::format_units(available, asset.decimals),
        required: asset.display_amount_per_request(),
    }
}

/// Check that the operator holds at least one request's worth of every asset
/// in both environments, and that the atomic contract may spend that much of
/// every ERC20 asset on Ledger-B.
pub async fn check_operator_funding(
    source: &dyn BalanceSource,
    operator: &NormalizedAddress,
    assets: &[Asset],
) -> Result<FundingReport> {
    let mut shortfalls = Vec::new();

    for environment in [Environment::LedgerA, Environment::LedgerB] {
        for asset in assets {
            let balance = source.balance_of(environment, operator, asset).await?;
            if balance < asset.amount_per_request {
                shortfalls.push(shortfall(asset, environment, ShortfallKind::Balance, balance));
            }

            if let (Environment::LedgerB, LedgerBAsset::Erc20(token)) = (environment, asset.ledger_b) {
                if let Some(allowance) = source.contract_allowance(operator, token).await? {
                    if allowance < asset.amount_per_request {
                        shortfalls.push(shortfall(asset, environment, ShortfallKind::Allowance, allowance));
                    }
                }
            }
        }
    }

    Ok(FundingReport {
        ready: shortfalls.is_empty(),
        shortfalls,
        checked_at: Utc::now(),
    })
}
