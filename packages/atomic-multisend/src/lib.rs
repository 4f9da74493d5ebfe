//! Atomic Multi-Send Executor
//!
//! The contract that moves a bundle of assets from the operator to one
//! recipient as a single indivisible operation. It runs with EVM call
//! semantics: `msg.sender`, attached `msg.value`, and revert-on-error, where a
//! revert discards every write of the call including the attached value.
//!
//! ## Modules
//!
//! - `contract` - Entry points (`execute`, `query`) and the validate-then-execute flow
//! - `msg` - Execute/query messages, responses and emitted events
//! - `state` - Ledger state trait, in-memory ledger and the per-call journal
//! - `error` - Revert reasons

pub mod contract;
pub mod error;
pub mod msg;
pub mod state;

pub use contract::{AtomicMultiSendContract, CallContext, Response};
pub use error::ContractError;
pub use msg::{Event, ExecuteMsg, QueryMsg, QueryResponse, Transfer, NATIVE};
pub use state::{InMemoryLedger, Journal, LedgerState};
