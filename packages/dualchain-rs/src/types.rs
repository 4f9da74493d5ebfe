//! Asset types shared by the reconciler, the transfer paths and the API
//!
//! Amounts are always `U256` base units. Conversion from the display strings
//! used in configuration is exact; nothing passes through floating point.

use alloy::primitives::{Address, U256};
use eyre::{eyre, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest precision accepted for an asset (U256 holds 10^77)
pub const MAX_DECIMALS: u8 = 77;

// ============================================================================
// Ledger-B Asset Reference
// ============================================================================

/// How an asset is addressed in the contract environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "address")]
pub enum LedgerBAsset {
    /// The chain's native coin (zero-address sentinel in the atomic contract)
    Native,
    /// An ERC20 token contract
    Erc20(Address),
}

impl LedgerBAsset {
    /// Address used in the atomic contract's transfer list
    pub fn contract_reference(&self) -> Address {
        match self {
            LedgerBAsset::Native => Address::ZERO,
            LedgerBAsset::Erc20(token) => *token,
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self, LedgerBAsset::Native)
    }
}

impl fmt::Display for LedgerBAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerBAsset::Native => f.write_str("native"),
            LedgerBAsset::Erc20(addr) => write!(f, "{}", addr),
        }
    }
}

// ============================================================================
// Asset
// ============================================================================

/// A distributable asset, loaded once at startup and never mutated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    /// Unique symbol (e.g. "EVMOS", "USDC")
    pub symbol: String,
    /// Decimal precision of the base unit
    pub decimals: u8,
    /// Bank denom on Ledger-A
    pub ledger_a_denom: String,
    /// Reference on Ledger-B
    pub ledger_b: LedgerBAsset,
    /// Amount advertised per request, in base units
    pub amount_per_request: U256,
    /// Balance a recipient is topped up to, in base units
    pub target_balance: U256,
}

impl Asset {
    pub fn is_native(&self) -> bool {
        self.ledger_b.is_native()
    }

    /// Target balance in display units
    pub fn display_target(&self) -> String {
        format_units(self.target_balance, self.decimals)
    }

    /// Per-request amount in display units
    pub fn display_amount_per_request(&self) -> String {
        format_units(self.amount_per_request, self.decimals)
    }
}

// ============================================================================
// Unit Conversion
// ============================================================================

/// Parse a display-unit decimal string into base units.
///
/// `parse_units("1.5", 6) == 1_500_000`. More fractional digits than
/// `decimals` is an error rather than a silent truncation.
pub fn parse_units(display: &str, decimals: u8) -> Result<U256> {
    if decimals > MAX_DECIMALS {
        return Err(eyre!("decimals {} exceeds maximum {}", decimals, MAX_DECIMALS));
    }

    let s = display.trim();
    if s.is_empty() {
        return Err(eyre!("empty amount"));
    }

    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };

    if whole.is_empty() && frac.is_empty() {
        return Err(eyre!("invalid amount '{}'", display));
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return Err(eyre!("invalid amount '{}': only digits and one '.' allowed", display));
    }
    if frac.len() > decimals as usize {
        return Err(eyre!(
            "amount '{}' has {} fractional digits, asset supports {}",
            display,
            frac.len(),
            decimals
        ));
    }

    let mut digits = String::with_capacity(whole.len() + decimals as usize);
    digits.push_str(whole);
    digits.push_str(frac);
    digits.extend(std::iter::repeat('0').take(decimals as usize - frac.len()));

    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }

    U256::from_str_radix(digits, 10).map_err(|e| eyre!("amount '{}' out of range: {}", display, e))
}

/// Format base units as a display-unit decimal string without trailing zeros
pub fn format_units(amount: U256, decimals: u8) -> String {
    let raw = amount.to_string();
    if decimals == 0 {
        return raw;
    }

    let decimals = decimals as usize;
    let padded = if raw.len() <= decimals {
        format!("{}{}", "0".repeat(decimals - raw.len() + 1), raw)
    } else {
        raw
    };

    let (whole, frac) = padded.split_at(padded.len() - decimals);
    let frac = frac.trim_end_matches('0');
    if frac.is_empty() {
        whole.to_string()
    } else {
        format!("{}.{}", whole, frac)
    }
}

// ============================================================================
// Transaction Status
// ============================================================================

/// Where a previously broadcast transaction stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    /// In a block, whatever its execution result
    Included,
    /// Known to the node but not yet in a block, or not yet visible
    Pending,
    /// No longer known to the node; its nonce is free again
    Dropped,
}
