//! Dual-Environment Faucet - Library interface
//!
//! Re-exports internal modules for use in integration tests.

pub mod balances;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod metrics;
pub mod rate_limiter;
pub mod reconciler;
pub mod server;
pub mod session;
