//! Shared harness: an in-memory dual-environment chain behind the faucet's
//! trait seams. Ledger-B transfers run through the real atomic multi-send
//! contract over an in-memory ledger, with no client-side pre-check, so
//! contract reverts surface exactly as they would on chain.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use atomic_multisend::{
    AtomicMultiSendContract, CallContext, ExecuteMsg, InMemoryLedger, LedgerState, Transfer,
};
use dualchain_rs::{
    AddressTranslator, Asset, Environment, LedgerBAsset, NormalizedAddress, OperatorKey, TxStatus,
};
use eyre::eyre;
use faucet::dispatcher::Dispatcher;
use faucet::error::DistributionError;
use faucet::executor::{settle_outstanding, track_outstanding, TransferPath, TransferReceipt};
use faucet::metrics::Metrics;
use faucet::rate_limiter::RateLimiter;
use faucet::reconciler::{BalanceReconciler, BalanceSource, TransferPlan};
use faucet::session::{LaneGuard, OperatorSession};
use parking_lot::Mutex;

pub const PREFIX: &str = "evmos";
pub const OPERATOR_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

/// Second anvil account, in both encodings
pub const RECIPIENT_B: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";
pub const RECIPIENT_A: &str = "evmos1wzvhjux9rqfdcwspp37srdgwp5tac7wgfhwr9w";

/// Third anvil account
pub const OTHER_B: &str = "0x3C44CdDdB6a900fa2b585dd299e03d12FA4293BC";

/// How long a harness path waits on an earlier unconfirmed transaction
pub const SETTLE_DEADLINE: Duration = Duration::from_millis(100);

pub fn contract_address() -> Address {
    Address::repeat_byte(0xc0)
}

pub fn usdc_token() -> Address {
    Address::repeat_byte(0x11)
}

pub fn asset(symbol: &str, ledger_b: LedgerBAsset, per_request: u64, target: u64) -> Asset {
    Asset {
        symbol: symbol.to_string(),
        decimals: 6,
        ledger_a_denom: format!("u{}", symbol.to_lowercase()),
        ledger_b,
        amount_per_request: U256::from(per_request),
        target_balance: U256::from(target),
    }
}

/// Native DUAL (target 5) and USDC (target 10), in base units
pub fn default_assets() -> Vec<Asset> {
    vec![
        asset("DUAL", LedgerBAsset::Native, 1_000_000, 5_000_000),
        asset("USDC", LedgerBAsset::Erc20(usdc_token()), 10_000_000, 10_000_000),
    ]
}

pub fn normalize(raw: &str) -> NormalizedAddress {
    AddressTranslator::new(PREFIX).normalize(raw).unwrap()
}

// ============================================================================
// Simulated Chain
// ============================================================================

/// Failure forced onto the next submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Injected {
    /// Broadcast, but not confirmed in time; stays pending until told otherwise
    Timeout,
    /// Rejected by the node before broadcast
    Submission,
}

pub struct SimulatedChain {
    pub contract: Mutex<AtomicMultiSendContract>,
    pub ledger_b: Mutex<InMemoryLedger>,
    /// (bech32 account, denom) -> amount
    pub bank: Mutex<HashMap<(String, String), U256>>,
    /// Submitted transactions across both environments
    pub writes: AtomicUsize,
    /// Balance reads served
    pub queries: AtomicUsize,
    pub fail_queries: AtomicBool,
    pub submit_delay: Duration,
    inject: Mutex<Option<Injected>>,
    /// Transactions not known to be included; absent means included
    tx_statuses: Mutex<HashMap<String, TxStatus>>,
}

impl SimulatedChain {
    pub fn new(operator: Address, submit_delay: Duration) -> Self {
        Self {
            contract: Mutex::new(AtomicMultiSendContract::instantiate(contract_address(), operator)),
            ledger_b: Mutex::new(InMemoryLedger::new()),
            bank: Mutex::new(HashMap::new()),
            writes: AtomicUsize::new(0),
            queries: AtomicUsize::new(0),
            fail_queries: AtomicBool::new(false),
            submit_delay,
            inject: Mutex::new(None),
            tx_statuses: Mutex::new(HashMap::new()),
        }
    }

    pub fn inject(&self, failure: Injected) {
        *self.inject.lock() = Some(failure);
    }

    pub fn set_tx_status(&self, tx_reference: &str, status: TxStatus) {
        self.tx_statuses.lock().insert(tx_reference.to_string(), status);
    }

    pub fn tx_status(&self, tx_reference: &str) -> TxStatus {
        self.tx_statuses
            .lock()
            .get(tx_reference)
            .copied()
            .unwrap_or(TxStatus::Included)
    }

    /// Consume an injected failure, broadcasting a never-applied transaction for a timeout
    fn injected_failure(&self) -> Option<DistributionError> {
        let failure = self.inject.lock().take()?;
        Some(match failure {
            Injected::Timeout => {
                let tx_reference = self.next_tx();
                self.set_tx_status(&tx_reference, TxStatus::Pending);
                DistributionError::Timeout {
                    tx_reference: Some(tx_reference),
                    reason: format!("receipt not seen within {:?}", SETTLE_DEADLINE),
                }
            }
            Injected::Submission => DistributionError::ChainSubmission {
                reason: "error sending request: connection reset by peer".to_string(),
            },
        })
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn next_tx(&self) -> String {
        let n = self.writes.fetch_add(1, Ordering::SeqCst) + 1;
        format!("0x{:064x}", n)
    }

    pub fn bank_balance(&self, account: &str, denom: &str) -> U256 {
        self.bank
            .lock()
            .get(&(account.to_string(), denom.to_string()))
            .copied()
            .unwrap_or_default()
    }

    pub fn set_bank_balance(&self, account: &str, denom: &str, amount: u64) {
        self.bank
            .lock()
            .insert((account.to_string(), denom.to_string()), U256::from(amount));
    }

    pub fn native_balance(&self, account: Address) -> U256 {
        self.ledger_b.lock().native_balance(account)
    }

    pub fn token_balance(&self, token: Address, account: Address) -> U256 {
        self.ledger_b.lock().token_balance(token, account)
    }
}

#[async_trait]
impl BalanceSource for SimulatedChain {
    async fn balance_of(
        &self,
        environment: Environment,
        account: &NormalizedAddress,
        asset: &Asset,
    ) -> eyre::Result<U256> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(eyre!("error sending request: connection refused"));
        }

        Ok(match environment {
            Environment::LedgerA => self.bank_balance(account.ledger_a(), &asset.ledger_a_denom),
            Environment::LedgerB => {
                let ledger = self.ledger_b.lock();
                match asset.ledger_b {
                    LedgerBAsset::Native => ledger.native_balance(account.ledger_b()),
                    LedgerBAsset::Erc20(token) => ledger.token_balance(token, account.ledger_b()),
                }
            }
        })
    }
}

// ============================================================================
// Transfer Paths
// ============================================================================

/// Calls the atomic contract as the operator, attaching the native sum
pub struct SimulatedLedgerB {
    pub chain: Arc<SimulatedChain>,
    pub operator: Address,
}

impl SimulatedLedgerB {
    async fn submit(&self, plan: &TransferPlan) -> Result<TransferReceipt, DistributionError> {
        tokio::time::sleep(self.chain.submit_delay).await;
        if let Some(err) = self.chain.injected_failure() {
            return Err(err);
        }

        let transfers: Vec<Transfer> = plan
            .transfers
            .iter()
            .map(|t| Transfer::token(t.asset.ledger_b.contract_reference(), t.amount))
            .collect();
        let value = transfers
            .iter()
            .filter(|t| t.is_native())
            .fold(U256::ZERO, |acc, t| acc + t.amount);

        let tx_reference = self.chain.next_tx();
        let outcome = {
            let mut contract = self.chain.contract.lock();
            let mut ledger = self.chain.ledger_b.lock();
            contract.execute(
                &mut *ledger,
                CallContext::new(self.operator, value),
                ExecuteMsg::AtomicMultiSend {
                    recipient: plan.recipient.ledger_b(),
                    transfers,
                },
            )
        };

        match outcome {
            Ok(_) => Ok(TransferReceipt {
                tx_reference,
                height: Some(self.chain.writes() as u64),
            }),
            Err(e) => Err(DistributionError::ContractReverted {
                asset: e
                    .asset()
                    .and_then(|reference| plan.ledger_b_symbol(reference))
                    .map(str::to_string),
                tx_reference: Some(tx_reference),
                reason: e.to_string(),
            }),
        }
    }
}

#[async_trait]
impl TransferPath for SimulatedLedgerB {
    fn environment(&self) -> Environment {
        Environment::LedgerB
    }

    async fn tx_status(&self, tx_reference: &str) -> eyre::Result<TxStatus> {
        Ok(self.chain.tx_status(tx_reference))
    }

    async fn execute(
        &self,
        plan: &TransferPlan,
        lane: &mut LaneGuard<'_>,
    ) -> Result<TransferReceipt, DistributionError> {
        settle_outstanding(self, lane, SETTLE_DEADLINE).await?;
        let result = self.submit(plan).await;
        track_outstanding(lane, result)
    }
}

/// Moves every coin of the plan in one step, or none
pub struct SimulatedLedgerA {
    pub chain: Arc<SimulatedChain>,
    pub operator: String,
}

impl SimulatedLedgerA {
    async fn submit(&self, plan: &TransferPlan) -> Result<TransferReceipt, DistributionError> {
        tokio::time::sleep(self.chain.submit_delay).await;
        if let Some(err) = self.chain.injected_failure() {
            return Err(err);
        }

        let mut bank = self.chain.bank.lock();
        for t in &plan.transfers {
            let key = (self.operator.clone(), t.asset.ledger_a_denom.clone());
            let available = bank.get(&key).copied().unwrap_or_default();
            if available < t.amount {
                return Err(DistributionError::unfunded(
                    &t.asset.symbol,
                    Environment::LedgerA,
                    t.amount,
                    available,
                ));
            }
        }

        let tx_reference = self.chain.next_tx();
        for t in &plan.transfers {
            let from = (self.operator.clone(), t.asset.ledger_a_denom.clone());
            let to = (plan.recipient.ledger_a().to_string(), t.asset.ledger_a_denom.clone());
            let remaining = bank.get(&from).copied().unwrap_or_default() - t.amount;
            bank.insert(from, remaining);
            let credited = bank.get(&to).copied().unwrap_or_default() + t.amount;
            bank.insert(to, credited);
        }

        Ok(TransferReceipt {
            tx_reference,
            height: None,
        })
    }
}

#[async_trait]
impl TransferPath for SimulatedLedgerA {
    fn environment(&self) -> Environment {
        Environment::LedgerA
    }

    async fn tx_status(&self, tx_reference: &str) -> eyre::Result<TxStatus> {
        Ok(self.chain.tx_status(tx_reference))
    }

    async fn execute(
        &self,
        plan: &TransferPlan,
        lane: &mut LaneGuard<'_>,
    ) -> Result<TransferReceipt, DistributionError> {
        settle_outstanding(self, lane, SETTLE_DEADLINE).await?;
        let result = self.submit(plan).await;
        track_outstanding(lane, result)
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub chain: Arc<SimulatedChain>,
    pub dispatcher: Arc<Dispatcher>,
    pub limiter: Arc<RateLimiter>,
    pub metrics: Arc<Metrics>,
    pub session: Arc<OperatorSession>,
    pub assets: Vec<Asset>,
}

impl Harness {
    pub fn new(assets: Vec<Asset>) -> Self {
        Self::with_options(assets, Duration::ZERO, 1)
    }

    pub fn with_options(assets: Vec<Asset>, submit_delay: Duration, quota: u32) -> Self {
        let key = OperatorKey::from_private_key(OPERATOR_KEY).unwrap();
        let session = Arc::new(OperatorSession::new(key, PREFIX).unwrap());
        let chain = Arc::new(SimulatedChain::new(session.ledger_b_address(), submit_delay));
        let limiter = Arc::new(RateLimiter::new(Duration::from_secs(12 * 60 * 60), quota));
        let metrics = Arc::new(Metrics::new());

        let ledger_a = Arc::new(SimulatedLedgerA {
            chain: chain.clone(),
            operator: session.ledger_a_address().to_string(),
        });
        let ledger_b = Arc::new(SimulatedLedgerB {
            chain: chain.clone(),
            operator: session.ledger_b_address(),
        });

        let dispatcher = Arc::new(Dispatcher::new(
            AddressTranslator::new(PREFIX),
            limiter.clone(),
            BalanceReconciler::new(chain.clone(), Duration::from_secs(2)),
            session.clone(),
            ledger_a,
            ledger_b,
            Arc::new(assets.clone()),
            metrics.clone(),
        ));

        Self {
            chain,
            dispatcher,
            limiter,
            metrics,
            session,
            assets,
        }
    }

    pub fn operator_b(&self) -> Address {
        self.session.ledger_b_address()
    }

    pub fn operator_a(&self) -> String {
        self.session.ledger_a_address().to_string()
    }

    /// Give the operator plenty of every asset on both environments, with
    /// the contract approved for every token
    pub fn fund_operator(&self) {
        let plenty = U256::from(1_000_000_000_000u64);
        let operator = self.operator_b();
        {
            let mut ledger = self.chain.ledger_b.lock();
            for asset in &self.assets {
                match asset.ledger_b {
                    LedgerBAsset::Native => ledger.mint_native(operator, plenty),
                    LedgerBAsset::Erc20(token) => {
                        ledger.mint_token(token, operator, plenty);
                        ledger.approve(token, operator, contract_address(), plenty);
                    }
                }
            }
        }
        for asset in &self.assets {
            self.chain
                .set_bank_balance(&self.operator_a(), &asset.ledger_a_denom, 1_000_000_000_000);
        }
    }
}
