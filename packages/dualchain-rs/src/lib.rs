//! Dualchain-RS: Shared Dual-Environment Chain Library for the Faucet
//!
//! This crate provides the chain-facing building blocks used by the faucet service:
//!
//! - **Address Translation** - Hash-free mapping between Ledger-A (bech32) and Ledger-B (hex)
//! - **Types** - Asset definitions and exact decimal/base-unit conversion
//! - **Operator Key** - One secp256k1 key projected into both environments
//! - **EVM Module** - Ledger-B contract bindings, queries, and transaction signing
//! - **Cosmos Module** - Ledger-A bank queries and eth_secp256k1 transaction signing
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! dualchain-rs = { path = "../dualchain-rs" }
//! ```
//!
//! ## Feature Flags
//!
//! - `evm` - Enable Ledger-B (EVM) support (default)
//! - `cosmos` - Enable Ledger-A (Cosmos SDK bank) support (default)

// Core modules (always available)
pub mod address_codec;
pub mod key;
pub mod redact;
pub mod types;

// Chain-specific modules (feature-gated)
#[cfg(feature = "evm")]
pub mod evm;

#[cfg(feature = "cosmos")]
pub mod cosmos;

// Re-export commonly used items at the crate root
pub use address_codec::{
    decode_bech32_address, encode_bech32_address, encode_evm_address, parse_evm_address,
    AddressError, AddressTranslator, Classification, Environment, NormalizedAddress,
};

pub use key::OperatorKey;
pub use types::{format_units, parse_units, Asset, LedgerBAsset, TxStatus};
