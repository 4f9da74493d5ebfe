//! Faucet configuration
//!
//! Endpoints, key material, limiter and server settings come from environment
//! variables (a `.env` file is loaded first when present). The ordered asset
//! list comes from a JSON file (`ASSETS_FILE`) or inline JSON (`ASSETS_JSON`).

use alloy::primitives::{Address, U256};
use dualchain_rs::redact::{redact_url, Redacted};
use dualchain_rs::types::MAX_DECIMALS;
use dualchain_rs::{parse_units, Asset, LedgerBAsset, OperatorKey};
use eyre::{eyre, Result, WrapErr};
use serde::Deserialize;
use std::collections::HashSet;
use std::env;
use std::fmt;
use std::path::Path;
use std::time::Duration;

// ============================================================================
// Defaults
// ============================================================================

fn default_window_secs() -> u64 {
    12 * 60 * 60
}

fn default_quota() -> u32 {
    1
}

fn default_sweep_interval_secs() -> u64 {
    300
}

fn default_query_timeout_ms() -> u64 {
    10_000
}

fn default_submit_timeout_secs() -> u64 {
    60
}

fn default_readiness_interval_secs() -> u64 {
    30
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_gas_limit() -> u64 {
    dualchain_rs::cosmos::signer::DEFAULT_GAS_LIMIT
}

fn default_gas_margin_percent() -> u64 {
    dualchain_rs::evm::signer::DEFAULT_GAS_MARGIN_PERCENT
}

fn default_memo() -> String {
    "dual-faucet".to_string()
}

// ============================================================================
// Sections
// ============================================================================

/// Ledger-A (bank environment) endpoint and fee settings
#[derive(Clone)]
pub struct LedgerAConfig {
    /// LCD REST URL
    pub lcd_url: String,
    /// Cosmos chain ID
    pub chain_id: String,
    /// Bech32 human-readable prefix
    pub prefix: String,
    /// Denom used to pay transaction fees
    pub fee_denom: String,
    /// Gas limit for every distribution transaction
    pub gas_limit: u64,
    /// Fee price per unit of gas in `fee_denom` base units
    pub gas_price: u128,
    /// Memo attached to distribution transactions
    pub memo: String,
}

impl fmt::Debug for LedgerAConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LedgerAConfig")
            .field("lcd_url", &redact_url(&self.lcd_url))
            .field("chain_id", &self.chain_id)
            .field("prefix", &self.prefix)
            .field("fee_denom", &self.fee_denom)
            .field("gas_limit", &self.gas_limit)
            .field("gas_price", &self.gas_price)
            .field("memo", &self.memo)
            .finish()
    }
}

/// Ledger-B (contract environment) endpoint settings
#[derive(Clone)]
pub struct LedgerBConfig {
    /// JSON-RPC URL
    pub rpc_url: String,
    /// EIP-155 chain ID
    pub chain_id: u64,
    /// Deployed atomic multi-send contract
    pub atomic_contract: Address,
    /// Percentage applied to gas estimates (120 = +20%)
    pub gas_margin_percent: u64,
}

impl fmt::Debug for LedgerBConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LedgerBConfig")
            .field("rpc_url", &redact_url(&self.rpc_url))
            .field("chain_id", &self.chain_id)
            .field("atomic_contract", &self.atomic_contract)
            .field("gas_margin_percent", &self.gas_margin_percent)
            .finish()
    }
}

/// Operator key material
#[derive(Debug, Clone)]
pub enum OperatorSecret {
    PrivateKey(Redacted<String>),
    Mnemonic(Redacted<String>),
}

impl OperatorSecret {
    /// Build the operator key
    pub fn load_key(&self) -> Result<OperatorKey> {
        match self {
            OperatorSecret::PrivateKey(key) => OperatorKey::from_private_key(key.expose()),
            OperatorSecret::Mnemonic(phrase) => OperatorKey::from_mnemonic(phrase.expose(), None),
        }
    }
}

/// Sliding-window limiter settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Window length in seconds
    pub window_secs: u64,
    /// Successful distributions allowed per address per window
    pub quota: u32,
    /// Interval of the idle-window sweep
    pub sweep_interval_secs: u64,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            quota: default_quota(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

/// Bounds on chain I/O
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Upper bound on one request's balance queries
    pub query_timeout_ms: u64,
    /// Upper bound on submit-and-await-finality
    pub submit_timeout_secs: u64,
}

impl TimeoutConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn submit_timeout(&self) -> Duration {
        Duration::from_secs(self.submit_timeout_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            query_timeout_ms: default_query_timeout_ms(),
            submit_timeout_secs: default_submit_timeout_secs(),
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    /// How often operator funding is re-checked for `/readyz`
    pub readiness_interval_secs: u64,
}

// ============================================================================
// Asset File
// ============================================================================

/// One asset as written in the asset file. Amounts are display-unit strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct AssetConfig {
    pub symbol: String,
    pub decimals: u8,
    pub ledger_a_denom: String,
    pub ledger_b: LedgerBAsset,
    pub amount_per_request: String,
    pub target_balance: String,
}

impl AssetConfig {
    /// Convert display amounts into base units
    pub fn into_asset(self) -> Result<Asset> {
        if self.decimals > MAX_DECIMALS {
            return Err(eyre!(
                "asset {}: decimals {} exceeds {}",
                self.symbol,
                self.decimals,
                MAX_DECIMALS
            ));
        }

        let amount_per_request = parse_units(&self.amount_per_request, self.decimals)
            .wrap_err_with(|| format!("asset {}: invalid amountPerRequest", self.symbol))?;
        let target_balance = parse_units(&self.target_balance, self.decimals)
            .wrap_err_with(|| format!("asset {}: invalid targetBalance", self.symbol))?;

        Ok(Asset {
            symbol: self.symbol,
            decimals: self.decimals,
            ledger_a_denom: self.ledger_a_denom,
            ledger_b: self.ledger_b,
            amount_per_request,
            target_balance,
        })
    }
}

/// Parse the ordered asset list from JSON
pub fn parse_assets(json: &str) -> Result<Vec<Asset>> {
    let entries: Vec<AssetConfig> =
        serde_json::from_str(json).wrap_err("Failed to parse asset list")?;
    entries.into_iter().map(AssetConfig::into_asset).collect()
}

// ============================================================================
// Config
// ============================================================================

/// Faucet configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub ledger_a: LedgerAConfig,
    pub ledger_b: LedgerBConfig,
    pub operator: OperatorSecret,
    pub rate_limit: RateLimitConfig,
    pub timeouts: TimeoutConfig,
    pub server: ServerConfig,
    /// Distributable assets in configuration order
    pub assets: Vec<Asset>,
}

fn optional<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| eyre!("Invalid {}: {}", name, raw)),
        _ => Ok(default),
    }
}

fn required(name: &str) -> Result<String> {
    env::var(name).map_err(|_| eyre!("{} required", name))
}

impl Config {
    /// Load configuration from environment, reading `.env` first if present
    pub fn load() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("Loaded .env from {:?}", path);
        }
        Self::from_env()
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Result<Self> {
        let ledger_a = LedgerAConfig {
            lcd_url: required("LEDGER_A_LCD_URL")?,
            chain_id: required("LEDGER_A_CHAIN_ID")?,
            prefix: required("LEDGER_A_PREFIX")?.trim().to_lowercase(),
            fee_denom: required("LEDGER_A_FEE_DENOM")?,
            gas_limit: optional("LEDGER_A_GAS_LIMIT", default_gas_limit())?,
            gas_price: optional("LEDGER_A_GAS_PRICE", 0u128)?,
            memo: env::var("LEDGER_A_MEMO").unwrap_or_else(|_| default_memo()),
        };

        let ledger_b = LedgerBConfig {
            rpc_url: required("LEDGER_B_RPC_URL")?,
            chain_id: required("LEDGER_B_CHAIN_ID")?
                .trim()
                .parse()
                .map_err(|_| eyre!("Invalid LEDGER_B_CHAIN_ID"))?,
            atomic_contract: required("ATOMIC_CONTRACT_ADDRESS")?
                .trim()
                .parse()
                .map_err(|_| eyre!("Invalid ATOMIC_CONTRACT_ADDRESS"))?,
            gas_margin_percent: optional("LEDGER_B_GAS_MARGIN_PERCENT", default_gas_margin_percent())?,
        };

        let operator = match (
            env::var("OPERATOR_PRIVATE_KEY").ok().filter(|v| !v.trim().is_empty()),
            env::var("OPERATOR_MNEMONIC").ok().filter(|v| !v.trim().is_empty()),
        ) {
            (Some(key), None) => OperatorSecret::PrivateKey(Redacted(key)),
            (None, Some(phrase)) => OperatorSecret::Mnemonic(Redacted(phrase)),
            (Some(_), Some(_)) => {
                return Err(eyre!(
                    "Set only one of OPERATOR_PRIVATE_KEY and OPERATOR_MNEMONIC"
                ))
            }
            (None, None) => {
                return Err(eyre!("OPERATOR_PRIVATE_KEY or OPERATOR_MNEMONIC required"))
            }
        };

        let rate_limit = RateLimitConfig {
            window_secs: optional("RATE_LIMIT_WINDOW_SECS", default_window_secs())?,
            quota: optional("RATE_LIMIT_QUOTA", default_quota())?,
            sweep_interval_secs: optional(
                "RATE_LIMIT_SWEEP_INTERVAL_SECS",
                default_sweep_interval_secs(),
            )?,
        };

        let timeouts = TimeoutConfig {
            query_timeout_ms: optional("QUERY_TIMEOUT_MS", default_query_timeout_ms())?,
            submit_timeout_secs: optional("SUBMIT_TIMEOUT_SECS", default_submit_timeout_secs())?,
        };

        let server = ServerConfig {
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| default_bind_address()),
            port: optional("PORT", default_port())?,
            readiness_interval_secs: optional(
                "READINESS_INTERVAL_SECS",
                default_readiness_interval_secs(),
            )?,
        };

        let assets_json = match (env::var("ASSETS_JSON"), env::var("ASSETS_FILE")) {
            (Ok(json), _) if !json.trim().is_empty() => json,
            (_, Ok(path)) => std::fs::read_to_string(Path::new(&path))
                .wrap_err_with(|| format!("Failed to read ASSETS_FILE {}", path))?,
            _ => return Err(eyre!("ASSETS_FILE or ASSETS_JSON required")),
        };
        let assets = parse_assets(&assets_json)?;

        let config = Config {
            ledger_a,
            ledger_b,
            operator,
            rate_limit,
            timeouts,
            server,
            assets,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validate_url("LEDGER_A_LCD_URL", &self.ledger_a.lcd_url)?;
        validate_url("LEDGER_B_RPC_URL", &self.ledger_b.rpc_url)?;

        if self.ledger_a.chain_id.trim().is_empty() {
            return Err(eyre!("ledger_a.chain_id cannot be empty"));
        }
        if self.ledger_a.prefix.is_empty()
            || !self.ledger_a.prefix.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(eyre!(
                "ledger_a.prefix must be a non-empty alphanumeric bech32 prefix"
            ));
        }
        if self.ledger_a.fee_denom.trim().is_empty() {
            return Err(eyre!("ledger_a.fee_denom cannot be empty"));
        }
        if self.ledger_a.gas_limit == 0 {
            return Err(eyre!("ledger_a.gas_limit must be positive"));
        }

        if self.ledger_b.atomic_contract == Address::ZERO {
            return Err(eyre!("ledger_b.atomic_contract cannot be the zero address"));
        }

        if self.rate_limit.window_secs == 0 {
            return Err(eyre!("rate_limit.window_secs must be positive"));
        }
        if self.rate_limit.quota == 0 {
            return Err(eyre!("rate_limit.quota must be at least 1"));
        }
        if self.timeouts.query_timeout_ms == 0 || self.timeouts.submit_timeout_secs == 0 {
            return Err(eyre!("timeouts must be positive"));
        }

        self.validate_assets()
    }

    fn validate_assets(&self) -> Result<()> {
        if self.assets.is_empty() {
            return Err(eyre!("asset list cannot be empty"));
        }

        let mut symbols = HashSet::new();
        let mut native = None;

        for asset in &self.assets {
            if asset.symbol.trim().is_empty() {
                return Err(eyre!("asset symbol cannot be empty"));
            }
            if !symbols.insert(asset.symbol.to_uppercase()) {
                return Err(eyre!("duplicate asset symbol {}", asset.symbol));
            }
            if asset.ledger_a_denom.trim().is_empty() {
                return Err(eyre!("asset {}: ledgerADenom cannot be empty", asset.symbol));
            }
            if asset.target_balance == U256::ZERO {
                return Err(eyre!("asset {}: targetBalance must be positive", asset.symbol));
            }
            if let LedgerBAsset::Erc20(token) = asset.ledger_b {
                if token == Address::ZERO {
                    return Err(eyre!(
                        "asset {}: erc20 address cannot be the zero address",
                        asset.symbol
                    ));
                }
            }
            if asset.is_native() {
                if let Some(previous) = native.replace(&asset.symbol) {
                    return Err(eyre!(
                        "assets {} and {} are both native on Ledger-B",
                        previous,
                        asset.symbol
                    ));
                }
            }
        }

        Ok(())
    }

    /// Native Ledger-B asset, if configured
    pub fn native_asset(&self) -> Option<&Asset> {
        self.assets.iter().find(|a| a.is_native())
    }
}

fn validate_url(name: &str, raw: &str) -> Result<()> {
    let url = url::Url::parse(raw).map_err(|e| eyre!("{} is not a valid URL: {}", name, e))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(eyre!("{} must be http(s), got {}", name, other)),
    }
}
