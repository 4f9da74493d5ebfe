//! Ledger-B (EVM) Support Module
//!
//! Talks to the contract-execution environment over JSON-RPC.
//!
//! ## Submodules
//!
//! - `contracts` - AtomicMultiSend and ERC20 bindings using alloy sol! macro
//! - `queries` - Native and ERC20 balance / allowance reads
//! - `signer` - Operator transaction signing and submission

pub mod contracts;
pub mod queries;
pub mod signer;

// Re-export commonly used items
pub use contracts::{AtomicMultiSend, ERC20};
pub use queries::EvmQueryClient;
pub use signer::{EvmSigner, EvmSignerConfig};
