//! Ledger-A Transaction Signing Module
//!
//! Signs bank transactions with the operator key under the eth_secp256k1
//! scheme, so the signer address is the bech32 projection of the operator's
//! Ledger-B address rather than a ripemd160(sha256) derived one.
//!
//! ## Features
//!
//! - Multi-coin `MsgSend` in a single transaction (all coins move or none do)
//! - SIGN_MODE_DIRECT with a Keccak-256 digest over the sign doc
//! - Sequence lookup before every submission
//! - Broadcast in sync mode and poll for inclusion within a deadline

use alloy::primitives::{keccak256, U256};
use cosmrs::{
    bank::MsgSend,
    proto::cosmos::tx::v1beta1::TxRaw,
    tx::{self, Fee, ModeInfo, Msg, SignDoc, SignMode, SignerInfo, SignerPublicKey},
    AccountId, Any, Coin,
};
use eyre::{eyre, Result, WrapErr};
use reqwest::Client;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::cosmos::queries::{AccountInfo, CosmosQueryClient};
use crate::key::OperatorKey;
use crate::types::TxStatus;

/// Protobuf type URL of the Ethermint secp256k1 public key
pub const ETH_SECP256K1_PUBKEY_TYPE_URL: &str = "/ethermint.crypto.v1.ethsecp256k1.PubKey";

/// Default gas limit for a multi-coin bank send
pub const DEFAULT_GAS_LIMIT: u64 = 200_000;

/// Configuration for the Ledger-A signer
#[derive(Debug, Clone)]
pub struct CosmosSignerConfig {
    /// LCD URL for queries and broadcasting
    pub lcd_url: String,
    /// Cosmos chain ID (e.g. "evmos_9000-1")
    pub chain_id: String,
    /// Bech32 account prefix
    pub prefix: String,
    /// Denom used to pay fees
    pub fee_denom: String,
    /// Gas limit for every transaction
    pub gas_limit: u64,
    /// Fee price per unit of gas in `fee_denom` base units
    pub gas_price: u128,
    /// Memo attached to distribution transactions
    pub memo: String,
    /// HTTP request timeout
    pub request_timeout: Duration,
}

/// Transaction result after broadcast and confirmation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CosmosTxResult {
    /// Transaction hash
    pub tx_hash: String,
    /// Block height (if confirmed)
    pub height: Option<u64>,
    /// Whether the transaction executed successfully in a block
    pub success: bool,
    /// Whether inclusion in a block was observed before the deadline.
    /// An unconfirmed transaction is pending, not successful.
    pub confirmed: bool,
    /// Raw log from the chain
    pub raw_log: Option<String>,
}

/// Ledger-A signer bound to the operator key
pub struct CosmosSigner {
    key: OperatorKey,
    address: AccountId,
    config: CosmosSignerConfig,
    queries: CosmosQueryClient,
    client: Client,
}

impl CosmosSigner {
    /// Create a new signer for the operator key
    pub fn new(config: CosmosSignerConfig, key: OperatorKey) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .wrap_err("Failed to create HTTP client")?;

        let queries = CosmosQueryClient::new(&config.lcd_url, config.request_timeout)?;

        let address: AccountId = key
            .ledger_a_address(&config.prefix)?
            .parse()
            .map_err(|e| eyre!("Invalid operator account id: {}", e))?;

        info!(
            address = %address,
            chain_id = %config.chain_id,
            gas_limit = config.gas_limit,
            "Ledger-A signer initialized"
        );

        Ok(Self {
            key,
            address,
            config,
            queries,
            client,
        })
    }

    /// Get the signer's bech32 address
    pub fn address(&self) -> &AccountId {
        &self.address
    }

    pub fn chain_id(&self) -> &str {
        &self.config.chain_id
    }

    /// Fee paid by every transaction, in `fee_denom` base units
    pub fn fee_amount(&self) -> u128 {
        (self.config.gas_limit as u128).saturating_mul(self.config.gas_price)
    }

    pub fn fee_denom(&self) -> &str {
        &self.config.fee_denom
    }

    // =========================================================================
    // Transaction Building
    // =========================================================================

    /// Build the multi-coin bank send from `(denom, amount)` pairs.
    ///
    /// The bank module requires coins sorted by denom with no repeats, so
    /// entries sharing a denom are summed.
    pub fn build_send(&self, recipient: &str, coins: &[(String, U256)]) -> Result<MsgSend> {
        if coins.is_empty() {
            return Err(eyre!("Refusing to build a MsgSend with no coins"));
        }

        let mut merged: BTreeMap<&str, U256> = BTreeMap::new();
        for (denom, amount) in coins {
            let total = merged.entry(denom.as_str()).or_default();
            *total = total
                .checked_add(*amount)
                .ok_or_else(|| eyre!("Amount of {} overflows", denom))?;
        }

        let amount = merged
            .into_iter()
            .map(|(denom, amount)| {
                let amount: u128 = amount
                    .try_into()
                    .map_err(|_| eyre!("Amount {} of {} exceeds u128", amount, denom))?;
                Ok(Coin {
                    denom: denom
                        .parse()
                        .map_err(|e| eyre!("Invalid coin denom '{}': {}", denom, e))?,
                    amount,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(MsgSend {
            from_address: self.address.clone(),
            to_address: recipient
                .parse()
                .map_err(|e| eyre!("Invalid recipient '{}': {}", recipient, e))?,
            amount,
        })
    }

    /// Signer info carrying the Ethermint public key
    fn signer_info(&self, sequence: u64) -> SignerInfo {
        let compressed = self.key.compressed_public_key();
        let mut value = Vec::with_capacity(compressed.len() + 2);
        value.push(0x0a);
        value.push(compressed.len() as u8);
        value.extend_from_slice(compressed);

        SignerInfo {
            public_key: Some(SignerPublicKey::Any(Any {
                type_url: ETH_SECP256K1_PUBKEY_TYPE_URL.to_string(),
                value,
            })),
            mode_info: ModeInfo::single(SignMode::Direct),
            sequence,
        }
    }

    /// Sign a message into raw transaction bytes
    pub fn sign(&self, msg: &MsgSend, account: &AccountInfo) -> Result<Vec<u8>> {
        let body = tx::Body::new(
            vec![msg
                .to_any()
                .map_err(|e| eyre!("Failed to convert message: {}", e))?],
            self.config.memo.clone(),
            0u32,
        );

        let fee = Fee::from_amount_and_gas(
            Coin {
                denom: self
                    .config
                    .fee_denom
                    .parse()
                    .map_err(|e| eyre!("Invalid fee denom: {}", e))?,
                amount: self.fee_amount(),
            },
            self.config.gas_limit,
        );

        let auth_info = self.signer_info(account.sequence).auth_info(fee);

        let chain_id = self
            .config
            .chain_id
            .parse()
            .map_err(|_| eyre!("Invalid chain ID"))?;

        let sign_doc = SignDoc::new(&body, &auth_info, &chain_id, account.account_number)
            .map_err(|e| eyre!("Failed to create sign doc: {}", e))?;

        let body_bytes = sign_doc.body_bytes.clone();
        let auth_info_bytes = sign_doc.auth_info_bytes.clone();
        let sign_bytes = sign_doc
            .into_bytes()
            .map_err(|e| eyre!("Failed to encode sign doc: {}", e))?;

        let signature = self.key.sign_digest(keccak256(&sign_bytes))?;

        let raw = tx::Raw::from(TxRaw {
            body_bytes,
            auth_info_bytes,
            signatures: vec![signature.to_vec()],
        });

        raw.to_bytes()
            .map_err(|e| eyre!("Failed to serialize transaction: {}", e))
    }

    /// Sign and broadcast a multi-coin send, waiting up to `timeout` for inclusion
    pub async fn send_coins(
        &self,
        recipient: &str,
        coins: &[(String, U256)],
        timeout: Duration,
    ) -> Result<CosmosTxResult> {
        let msg = self.build_send(recipient, coins)?;
        let account = self
            .queries
            .get_account_info(&self.address.to_string())
            .await?;

        debug!(
            sequence = account.sequence,
            account_number = account.account_number,
            coins = coins.len(),
            "Signing Ledger-A transaction"
        );

        let tx_bytes = self.sign(&msg, &account)?;
        self.broadcast_and_confirm(&tx_bytes, timeout).await
    }

    // =========================================================================
    // Broadcasting
    // =========================================================================

    /// Broadcast a signed transaction and wait for confirmation
    async fn broadcast_and_confirm(&self, tx_bytes: &[u8], timeout: Duration) -> Result<CosmosTxResult> {
        let tx_b64 = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, tx_bytes);

        let broadcast_request = serde_json::json!({
            "tx_bytes": tx_b64,
            "mode": "BROADCAST_MODE_SYNC"
        });

        let broadcast_url = format!("{}/cosmos/tx/v1beta1/txs", self.queries.lcd_url());

        let response = self
            .client
            .post(&broadcast_url)
            .json(&broadcast_request)
            .send()
            .await
            .wrap_err("Failed to broadcast transaction")?;

        let status = response.status();
        let body: serde_json::Value = response
            .json()
            .await
            .unwrap_or_else(|_| serde_json::json!({"error": "Failed to parse response"}));

        if !status.is_success() {
            return Err(eyre!("Broadcast failed (HTTP {}): {}", status, body));
        }

        let tx_response = body
            .get("tx_response")
            .ok_or_else(|| eyre!("Missing tx_response in broadcast result: {}", body))?;

        let code = tx_response.get("code").and_then(|v| v.as_u64()).unwrap_or(0);

        if code != 0 {
            let raw_log = tx_response
                .get("raw_log")
                .and_then(|v| v.as_str())
                .unwrap_or("Unknown error");

            return Err(eyre!("Transaction failed (code {}): {}", code, raw_log));
        }

        let txhash = tx_response
            .get("txhash")
            .and_then(|v| v.as_str())
            .ok_or_else(|| eyre!("Missing txhash in broadcast result"))?
            .to_string();

        info!(txhash = %txhash, "Ledger-A transaction broadcast, awaiting confirmation");

        match self.wait_for_tx_confirmation(&txhash, timeout).await {
            Ok(result) => Ok(result),
            Err(e) => {
                warn!(
                    txhash = %txhash,
                    error = %e,
                    "Broadcast succeeded but confirmation timed out"
                );
                Ok(CosmosTxResult {
                    tx_hash: txhash,
                    height: None,
                    success: false,
                    confirmed: false,
                    raw_log: Some(e.to_string()),
                })
            }
        }
    }

    /// Wait for a transaction to be included in a block
    pub async fn wait_for_tx_confirmation(&self, txhash: &str, timeout: Duration) -> Result<CosmosTxResult> {
        let initial_delay = Duration::from_millis(500);
        let max_delay = Duration::from_secs(3);

        let start = Instant::now();
        let mut delay = initial_delay;

        while start.elapsed() < timeout {
            tokio::time::sleep(delay.min(timeout.saturating_sub(start.elapsed()))).await;

            match self.queries.get_tx(txhash).await {
                Ok(Some(body)) => {
                    if let Some(result) = parse_tx_result(txhash, &body) {
                        debug!(txhash = %txhash, height = ?result.height, success = result.success, "Transaction included");
                        return Ok(result);
                    }
                }
                Ok(None) => {
                    debug!(txhash = %txhash, "Transaction not yet in block, waiting...");
                }
                Err(e) => {
                    warn!(txhash = %txhash, error = %e, "Error querying transaction status");
                }
            }

            delay = std::cmp::min(delay * 2, max_delay);
        }

        Err(eyre!(
            "Timeout waiting for transaction {} to be confirmed after {:?}",
            txhash,
            timeout
        ))
    }

    /// Where a previously broadcast transaction stands.
    ///
    /// The LCD cannot see the mempool, so a transaction not yet in a block is
    /// reported as pending until the caller gives up on it.
    pub async fn transaction_status(&self, txhash: &str) -> Result<TxStatus> {
        Ok(match self.queries.get_tx(txhash).await? {
            Some(_) => TxStatus::Included,
            None => TxStatus::Pending,
        })
    }
}

/// Interpret a `/cosmos/tx/v1beta1/txs/{hash}` response
pub fn parse_tx_result(txhash: &str, body: &serde_json::Value) -> Option<CosmosTxResult> {
    let tx_response = body.get("tx_response")?;

    let code = tx_response.get("code").and_then(|v| v.as_u64()).unwrap_or(0);
    let height = tx_response
        .get("height")
        .and_then(|v| v.as_str())
        .and_then(|h| h.parse().ok());
    let raw_log = tx_response
        .get("raw_log")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    Some(CosmosTxResult {
        tx_hash: txhash.to_string(),
        height,
        success: code == 0,
        confirmed: true,
        raw_log,
    })
}
