//! Ledger-A Query Helpers
//!
//! Bank balances, account sequence numbers and transaction lookups over the
//! LCD REST API.

use alloy::primitives::U256;
use eyre::{eyre, Result, WrapErr};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

/// Account info from LCD (sequence = nonce)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct AccountInfo {
    /// Transaction sequence number (nonce)
    pub sequence: u64,
    /// Account number on chain
    pub account_number: u64,
}

/// Ledger-A LCD query client
#[derive(Debug, Clone)]
pub struct CosmosQueryClient {
    /// LCD URL (no trailing slash)
    lcd_url: String,
    /// HTTP client
    client: Client,
}

impl CosmosQueryClient {
    /// Create a new query client with the given request timeout
    pub fn new(lcd_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .wrap_err("Failed to create HTTP client")?;

        Ok(Self {
            lcd_url: lcd_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn lcd_url(&self) -> &str {
        &self.lcd_url
    }

    async fn get_json(&self, url: &str, what: &str) -> Result<serde_json::Value> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .wrap_err_with(|| format!("Failed to query {}", what))?;

        if !response.status().is_success() {
            return Err(eyre!(
                "{} query failed: {} - {}",
                what,
                response.status(),
                response.text().await.unwrap_or_default()
            ));
        }

        Ok(response.json().await?)
    }

    // =========================================================================
    // Balance Queries
    // =========================================================================

    /// Get a single bank balance
    pub async fn get_balance(&self, address: &str, denom: &str) -> Result<U256> {
        let url = format!(
            "{}/cosmos/bank/v1beta1/balances/{}/by_denom?denom={}",
            self.lcd_url, address, denom
        );

        let data = self.get_json(&url, "Balance").await?;
        parse_by_denom_response(&data)
    }

    // =========================================================================
    // Account Queries
    // =========================================================================

    /// Get current account info (sequence and account number)
    pub async fn get_account_info(&self, address: &str) -> Result<AccountInfo> {
        let url = format!("{}/cosmos/auth/v1beta1/accounts/{}", self.lcd_url, address);
        let data = self.get_json(&url, "Account").await?;
        parse_account_response(&data)
    }

    // =========================================================================
    // Transaction Queries
    // =========================================================================

    /// Get transaction by hash; `None` while it is not yet in a block
    pub async fn get_tx(&self, txhash: &str) -> Result<Option<serde_json::Value>> {
        let url = format!("{}/cosmos/tx/v1beta1/txs/{}", self.lcd_url, txhash);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .wrap_err("Failed to query transaction")?;

        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(eyre!("Tx query failed: {}", response.status()));
        }

        Ok(Some(response.json().await?))
    }

    /// Get current block height
    pub async fn get_latest_block_height(&self) -> Result<u64> {
        let url = format!(
            "{}/cosmos/base/tendermint/v1beta1/blocks/latest",
            self.lcd_url
        );
        let data = self.get_json(&url, "Block").await?;

        data.get("block")
            .and_then(|b| b.get("header"))
            .and_then(|h| h.get("height"))
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| eyre!("Failed to parse block height"))
    }
}

/// Parse `{"balance": {"denom": "...", "amount": "..."}}`; a missing balance is zero
pub fn parse_by_denom_response(data: &serde_json::Value) -> Result<U256> {
    let amount = data
        .get("balance")
        .and_then(|b| b.get("amount"))
        .and_then(|a| a.as_str())
        .unwrap_or("0");

    amount
        .parse()
        .map_err(|e| eyre!("Failed to parse balance '{}': {}", amount, e))
}

/// Parse an auth account response.
///
/// Ethermint accounts nest the base account under `base_account`.
pub fn parse_account_response(data: &serde_json::Value) -> Result<AccountInfo> {
    let account = data
        .get("account")
        .ok_or_else(|| eyre!("Missing 'account' field in response"))?;

    let field = |name: &str| -> Result<u64> {
        let raw = account
            .get(name)
            .or_else(|| account.get("base_account").and_then(|b| b.get(name)))
            .and_then(|v| v.as_str())
            .unwrap_or("0");
        raw.parse()
            .map_err(|e| eyre!("Failed to parse {} '{}': {}", name, raw, e))
    };

    Ok(AccountInfo {
        sequence: field("sequence")?,
        account_number: field("account_number")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_by_denom() {
        let data = json!({"balance": {"denom": "aevmos", "amount": "1500000000000000000"}});
        assert_eq!(
            parse_by_denom_response(&data).unwrap(),
            U256::from(1_500_000_000_000_000_000u128)
        );
    }

    #[test]
    fn test_parse_by_denom_missing_is_zero() {
        assert_eq!(parse_by_denom_response(&json!({})).unwrap(), U256::ZERO);
    }

    #[test]
    fn test_parse_by_denom_garbage_is_error() {
        let data = json!({"balance": {"denom": "aevmos", "amount": "lots"}});
        assert!(parse_by_denom_response(&data).is_err());
    }

    #[test]
    fn test_parse_eth_account() {
        let data = json!({
            "account": {
                "@type": "/ethermint.types.v1.EthAccount",
                "base_account": {
                    "address": "evmos17w0adeg64ky0daxwd2ugyuneellmjgnxpu2u3g",
                    "account_number": "12",
                    "sequence": "7"
                },
                "code_hash": "0xc5d2"
            }
        });
        let info = parse_account_response(&data).unwrap();
        assert_eq!(info.account_number, 12);
        assert_eq!(info.sequence, 7);
    }

    #[test]
    fn test_parse_base_account() {
        let data = json!({"account": {"account_number": "3", "sequence": "0"}});
        let info = parse_account_response(&data).unwrap();
        assert_eq!(info, AccountInfo { sequence: 0, account_number: 3 });
    }
}
