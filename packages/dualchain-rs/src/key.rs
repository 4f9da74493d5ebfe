//! Operator Key
//!
//! The distributing operator owns exactly one secp256k1 key. Its Ledger-B
//! address is the Ethereum address of the key and its Ledger-A address is the
//! bech32 encoding of those same 20 bytes, so both projections are derived
//! here and nowhere else.
//!
//! ## Features
//!
//! - Load from a hex private key or a BIP39 mnemonic (`m/44'/60'/0'/0/0`)
//! - Ledger-B signer for alloy providers
//! - Raw digest signing and compressed public key for Ledger-A transactions

use alloy::{
    primitives::{Address, B256},
    signers::{local::PrivateKeySigner, SignerSync},
};
use bip39::Mnemonic;
use cosmrs::bip32::{DerivationPath, XPrv};
use eyre::{eyre, Result};
use std::fmt;

use crate::address_codec::encode_bech32_address;

/// Ethereum-compatible derivation path (BIP44 coin type 60)
pub const ETH_DERIVATION_PATH: &str = "m/44'/60'/0'/0/0";

/// The operator's signing key and its two address projections
#[derive(Clone)]
pub struct OperatorKey {
    signer: PrivateKeySigner,
    compressed_public_key: Vec<u8>,
}

impl fmt::Debug for OperatorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorKey")
            .field("address", &self.address())
            .field("private_key", &"<redacted>")
            .finish()
    }
}

impl OperatorKey {
    /// Load from a hex private key (with or without 0x prefix)
    pub fn from_private_key(private_key: &str) -> Result<Self> {
        let hex_str = private_key.trim();
        let hex_str = hex_str.strip_prefix("0x").unwrap_or(hex_str);
        let bytes = hex::decode(hex_str).map_err(|_| eyre!("Invalid private key: not hex"))?;
        if bytes.len() != 32 {
            return Err(eyre!(
                "Invalid private key: expected 32 bytes, got {}",
                bytes.len()
            ));
        }
        Self::from_secret_bytes(&bytes)
    }

    /// Derive from a BIP39 mnemonic using the given path (defaults to ETH_DERIVATION_PATH)
    pub fn from_mnemonic(phrase: &str, derivation_path: Option<&str>) -> Result<Self> {
        let mnemonic = Mnemonic::parse(phrase.trim()).map_err(|e| eyre!("Invalid mnemonic: {}", e))?;
        let seed = mnemonic.to_seed("");

        let path: DerivationPath = derivation_path
            .unwrap_or(ETH_DERIVATION_PATH)
            .parse()
            .map_err(|e| eyre!("Invalid derivation path: {:?}", e))?;

        let xprv = XPrv::derive_from_path(seed, &path)
            .map_err(|e| eyre!("Failed to derive signing key: {}", e))?;

        Self::from_secret_bytes(xprv.private_key().to_bytes().as_slice())
    }

    fn from_secret_bytes(bytes: &[u8]) -> Result<Self> {
        let signer = PrivateKeySigner::from_bytes(&B256::from_slice(bytes))
            .map_err(|e| eyre!("Invalid private key: {}", e))?;

        let compressed_public_key = cosmrs::crypto::secp256k1::SigningKey::from_slice(bytes)
            .map_err(|e| eyre!("Invalid private key: {}", e))?
            .public_key()
            .to_bytes();

        Ok(Self {
            signer,
            compressed_public_key,
        })
    }

    /// Ledger-B address (the Ethereum address of the key)
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Ledger-A address for the given bech32 prefix
    pub fn ledger_a_address(&self, prefix: &str) -> Result<String> {
        encode_bech32_address(&self.address().0 .0, prefix)
            .map_err(|e| eyre!("Failed to encode operator address: {}", e))
    }

    /// Signer for alloy providers
    pub fn signer(&self) -> &PrivateKeySigner {
        &self.signer
    }

    /// 33-byte SEC1 compressed public key
    pub fn compressed_public_key(&self) -> &[u8] {
        &self.compressed_public_key
    }

    /// Sign a 32-byte digest, returning the 64-byte `r || s` form used by Cosmos SDK
    pub fn sign_digest(&self, digest: B256) -> Result<[u8; 64]> {
        let signature = self
            .signer
            .sign_hash_sync(&digest)
            .map_err(|e| eyre!("Failed to sign digest: {}", e))?;

        let mut out = [0u8; 64];
        out[..32].copy_from_slice(&signature.r().to_be_bytes::<32>());
        out[32..].copy_from_slice(&signature.s().to_be_bytes::<32>());
        Ok(out)
    }
}
