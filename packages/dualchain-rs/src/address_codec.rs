//! Dual-Environment Address Translation
//!
//! Ledger-A (bank/account environment) and Ledger-B (EVM contract environment)
//! address the same 20-byte account identifier. The two encodings are plain
//! repackings of those bytes; no hashing happens on either side.
//!
//! ## Address Format
//!
//! ```text
//! Ledger-B:  0x + 40 hex chars          0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266
//! Ledger-A:  bech32(prefix, 20 bytes)   evmos17w0adeg64ky0daxwd2ugyuneellmjgnxpu2u3g
//! ```
//!
//! The key scheme is eth_secp256k1: the account id is the Ethereum address of
//! the key, and the bech32 form reuses it byte-for-byte. Hash-based Cosmos
//! derivation (ripemd160(sha256(pubkey))) produces a different account and must
//! not be used here.

use alloy::primitives::Address;
use bech32::{self, FromBase32, ToBase32, Variant};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Length of the shared account identifier in bytes
pub const ACCOUNT_ID_LEN: usize = 20;

/// Number of hex characters in a Ledger-B address (without `0x`)
pub const EVM_HEX_LEN: usize = 40;

// ============================================================================
// Environment
// ============================================================================

/// The two execution environments of the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Environment {
    /// Account-based ledger, bech32 addressing
    LedgerA,
    /// Contract-execution (EVM) environment, hex addressing
    LedgerB,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::LedgerA => "ledger-a",
            Environment::LedgerB => "ledger-b",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Every way an inbound address string can be rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("address is empty")]
    Empty,

    #[error("invalid hex address length: expected {EVM_HEX_LEN} hex chars, got {0}")]
    HexLength(usize),

    #[error("invalid hex address: {0}")]
    HexEncoding(String),

    #[error("invalid EIP-55 checksum: {0}")]
    Checksum(String),

    #[error("invalid bech32 address: {0}")]
    Bech32(String),

    #[error("unsupported bech32 variant (bech32m): {0}")]
    Bech32Variant(String),

    #[error("wrong bech32 prefix: expected '{expected}', got '{actual}'")]
    WrongPrefix { expected: String, actual: String },

    #[error("invalid account length: expected {ACCOUNT_ID_LEN} bytes, got {0}")]
    AccountLength(usize),

    #[error("unrecognized address format: '{0}' (expected 0x-prefixed hex or bech32 with prefix '{1}')")]
    Unrecognized(String, String),
}

// ============================================================================
// Normalized Address
// ============================================================================

/// A validated address together with both of its projections.
///
/// `environment` records which encoding the requester submitted; that is the
/// environment the distribution is delivered to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NormalizedAddress {
    environment: Environment,
    account: [u8; ACCOUNT_ID_LEN],
    ledger_a: String,
}

impl NormalizedAddress {
    fn new(environment: Environment, account: [u8; ACCOUNT_ID_LEN], prefix: &str) -> Result<Self, AddressError> {
        let ledger_a = encode_bech32_address(&account, prefix)?;
        Ok(Self {
            environment,
            account,
            ledger_a,
        })
    }

    /// Environment the request was submitted in
    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Raw 20-byte account identifier
    pub fn account_id(&self) -> &[u8; ACCOUNT_ID_LEN] {
        &self.account
    }

    /// Environment-independent key (lowercase hex of the account id).
    ///
    /// Both encodings of one key map to the same value.
    pub fn account_key(&self) -> String {
        hex::encode(self.account)
    }

    /// Ledger-A (bech32, lowercase) projection
    pub fn ledger_a(&self) -> &str {
        &self.ledger_a
    }

    /// Ledger-B projection
    pub fn ledger_b(&self) -> Address {
        Address::from(self.account)
    }

    /// Ledger-B projection as lowercase `0x` hex
    pub fn ledger_b_string(&self) -> String {
        encode_evm_address(&self.account)
    }

    /// The address in the environment it was submitted in
    pub fn recipient(&self) -> String {
        match self.environment {
            Environment::LedgerA => self.ledger_a.clone(),
            Environment::LedgerB => self.ledger_b_string(),
        }
    }
}

impl fmt::Display for NormalizedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.environment, self.recipient())
    }
}

/// Outcome of classifying a raw input string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    LedgerA(NormalizedAddress),
    LedgerB(NormalizedAddress),
    Invalid(AddressError),
}

impl Classification {
    /// Convert into a result, surfacing the classification error
    pub fn into_result(self) -> Result<NormalizedAddress, AddressError> {
        match self {
            Classification::LedgerA(addr) | Classification::LedgerB(addr) => Ok(addr),
            Classification::Invalid(err) => Err(err),
        }
    }
}

// ============================================================================
// Translator
// ============================================================================

/// Pure translator between the two encodings for a configured bech32 prefix
#[derive(Debug, Clone)]
pub struct AddressTranslator {
    prefix: String,
}

impl AddressTranslator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into().to_lowercase(),
        }
    }

    /// The configured Ledger-A human-readable prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Classify a raw address string.
    ///
    /// `0x`-prefixed input is treated as Ledger-B, anything beginning with
    /// `<prefix>1` as Ledger-A. Everything else is invalid.
    pub fn classify(&self, raw: &str) -> Classification {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Classification::Invalid(AddressError::Empty);
        }

        if trimmed.starts_with("0x") || trimmed.starts_with("0X") {
            return match parse_evm_address(trimmed)
                .and_then(|account| NormalizedAddress::new(Environment::LedgerB, account, &self.prefix))
            {
                Ok(addr) => Classification::LedgerB(addr),
                Err(e) => Classification::Invalid(e),
            };
        }

        if trimmed.contains('1') {
            return match self
                .decode_ledger_a(trimmed)
                .and_then(|account| NormalizedAddress::new(Environment::LedgerA, account, &self.prefix))
            {
                Ok(addr) => Classification::LedgerA(addr),
                Err(e) => Classification::Invalid(e),
            };
        }

        Classification::Invalid(AddressError::Unrecognized(
            trimmed.to_string(),
            self.prefix.clone(),
        ))
    }

    /// Classify and return the normalized address or the rejection reason
    pub fn normalize(&self, raw: &str) -> Result<NormalizedAddress, AddressError> {
        self.classify(raw).into_result()
    }

    /// Ledger-A bech32 → Ledger-B hex (EIP-55 checksummed)
    pub fn to_ledger_b(&self, ledger_a: &str) -> Result<String, AddressError> {
        let account = self.decode_ledger_a(ledger_a.trim())?;
        Ok(Address::from(account).to_checksum(None))
    }

    /// Ledger-B hex → Ledger-A bech32 using the configured prefix
    pub fn to_ledger_a(&self, ledger_b: &str) -> Result<String, AddressError> {
        to_ledger_a(ledger_b, &self.prefix)
    }

    fn decode_ledger_a(&self, addr: &str) -> Result<[u8; ACCOUNT_ID_LEN], AddressError> {
        let (account, hrp) = decode_bech32_address(addr)?;
        if hrp != self.prefix {
            return Err(AddressError::WrongPrefix {
                expected: self.prefix.clone(),
                actual: hrp,
            });
        }
        Ok(account)
    }
}

/// Ledger-B hex → Ledger-A bech32 for an explicit prefix
pub fn to_ledger_a(ledger_b: &str, prefix: &str) -> Result<String, AddressError> {
    let account = parse_evm_address(ledger_b.trim())?;
    encode_bech32_address(&account, prefix)
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Parse a 0x-prefixed hex address to 20 bytes.
///
/// Single-case input is accepted as-is; mixed-case input must be a valid
/// EIP-55 checksum.
pub fn parse_evm_address(addr: &str) -> Result<[u8; ACCOUNT_ID_LEN], AddressError> {
    let hex_str = addr
        .strip_prefix("0x")
        .or_else(|| addr.strip_prefix("0X"))
        .unwrap_or(addr);

    if hex_str.len() != EVM_HEX_LEN {
        return Err(AddressError::HexLength(hex_str.len()));
    }

    let bytes = hex::decode(hex_str).map_err(|e| AddressError::HexEncoding(e.to_string()))?;

    let has_upper = hex_str.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = hex_str.chars().any(|c| c.is_ascii_lowercase());
    if has_upper && has_lower {
        let prefixed = format!("0x{}", hex_str);
        Address::parse_checksummed(&prefixed, None)
            .map_err(|_| AddressError::Checksum(prefixed.clone()))?;
    }

    let mut result = [0u8; ACCOUNT_ID_LEN];
    result.copy_from_slice(&bytes);
    Ok(result)
}

/// Encode 20 bytes to a lowercase hex string with 0x prefix
pub fn encode_evm_address(bytes: &[u8; ACCOUNT_ID_LEN]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Decode a bech32 address to raw 20 bytes.
///
/// Returns (raw_bytes, hrp) where hrp is the lowercase human-readable prefix.
pub fn decode_bech32_address(addr: &str) -> Result<([u8; ACCOUNT_ID_LEN], String), AddressError> {
    let (hrp, data, variant) =
        bech32::decode(addr).map_err(|e| AddressError::Bech32(format!("{}: {}", addr, e)))?;

    if variant != Variant::Bech32 {
        return Err(AddressError::Bech32Variant(addr.to_string()));
    }

    let bytes = Vec::<u8>::from_base32(&data)
        .map_err(|e| AddressError::Bech32(format!("{}: {}", addr, e)))?;

    if bytes.len() != ACCOUNT_ID_LEN {
        return Err(AddressError::AccountLength(bytes.len()));
    }

    let mut result = [0u8; ACCOUNT_ID_LEN];
    result.copy_from_slice(&bytes);
    Ok((result, hrp))
}

/// Encode raw 20 bytes to a bech32 address with given prefix
pub fn encode_bech32_address(bytes: &[u8; ACCOUNT_ID_LEN], hrp: &str) -> Result<String, AddressError> {
    bech32::encode(hrp, bytes.to_base32(), Variant::Bech32)
        .map_err(|e| AddressError::Bech32(format!("failed to encode with prefix '{}': {}", hrp, e)))
}
