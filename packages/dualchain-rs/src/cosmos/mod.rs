//! Ledger-A (Cosmos SDK bank) Support Module
//!
//! Talks to the account-based environment through its LCD REST API.
//!
//! ## Submodules
//!
//! - `queries` - Bank balances, account info and transaction lookup
//! - `signer` - eth_secp256k1 signing of multi-coin `MsgSend` transactions

pub mod queries;
pub mod signer;

// Re-export commonly used items
pub use queries::{AccountInfo, CosmosQueryClient};
pub use signer::{CosmosSigner, CosmosSignerConfig, CosmosTxResult};
