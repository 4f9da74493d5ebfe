//! Distribution failure taxonomy
//!
//! Every failed request ends in exactly one [`ErrorKind`]. Chain clients
//! return `eyre` reports; [`classify_chain_error`] maps their messages onto
//! the taxonomy the same way the submission retry logic classifies RPC errors.

use alloy::primitives::U256;
use dualchain_rs::{AddressError, Environment};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Error kind reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    InvalidAddress,
    RateLimited,
    BalanceQueryError,
    InsufficientOperatorFunds,
    ChainSubmissionError,
    Timeout,
    ContractReverted,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidAddress => "invalid_address",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::BalanceQueryError => "balance_query_error",
            ErrorKind::InsufficientOperatorFunds => "insufficient_operator_funds",
            ErrorKind::ChainSubmissionError => "chain_submission_error",
            ErrorKind::Timeout => "timeout",
            ErrorKind::ContractReverted => "contract_reverted",
        }
    }

    /// Whether retrying the whole flow from scratch can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::BalanceQueryError | ErrorKind::Timeout)
    }

    /// Whether the failure happened before any chain access
    pub fn is_pre_chain(&self) -> bool {
        matches!(self, ErrorKind::InvalidAddress | ErrorKind::RateLimited)
    }
}

/// A failed distribution
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DistributionError {
    #[error("Invalid address: {0}")]
    InvalidAddress(#[from] AddressError),

    #[error("Rate limited: retry in {}s", .retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    #[error("Balance query failed{}: {reason}", asset_suffix(.asset))]
    BalanceQuery {
        asset: Option<String>,
        reason: String,
    },

    #[error("Operator cannot fund {asset} on {environment}{}", funding_detail(.required, .available, .reason))]
    InsufficientOperatorFunds {
        asset: String,
        environment: Environment,
        /// Known when the shortfall was measured before submission
        required: Option<U256>,
        available: Option<U256>,
        /// Chain message when the chain itself refused the transaction
        reason: Option<String>,
    },

    #[error("Chain submission failed: {reason}")]
    ChainSubmission { reason: String },

    #[error("Timed out: {reason}")]
    Timeout {
        tx_reference: Option<String>,
        reason: String,
    },

    #[error("Contract reverted{}: {reason}", asset_suffix(.asset))]
    ContractReverted {
        tx_reference: Option<String>,
        /// Asset the revert reason names, when it could be decoded
        asset: Option<String>,
        reason: String,
    },
}

impl DistributionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DistributionError::InvalidAddress(_) => ErrorKind::InvalidAddress,
            DistributionError::RateLimited { .. } => ErrorKind::RateLimited,
            DistributionError::BalanceQuery { .. } => ErrorKind::BalanceQueryError,
            DistributionError::InsufficientOperatorFunds { .. } => {
                ErrorKind::InsufficientOperatorFunds
            }
            DistributionError::ChainSubmission { .. } => ErrorKind::ChainSubmissionError,
            DistributionError::Timeout { .. } => ErrorKind::Timeout,
            DistributionError::ContractReverted { .. } => ErrorKind::ContractReverted,
        }
    }

    /// Asset symbol the failure is about, where one is known
    pub fn asset(&self) -> Option<&str> {
        match self {
            DistributionError::BalanceQuery { asset, .. }
            | DistributionError::ContractReverted { asset, .. } => asset.as_deref(),
            DistributionError::InsufficientOperatorFunds { asset, .. } => Some(asset),
            _ => None,
        }
    }

    /// Transaction already on chain when the failure was observed
    pub fn tx_reference(&self) -> Option<&str> {
        match self {
            DistributionError::Timeout { tx_reference, .. }
            | DistributionError::ContractReverted { tx_reference, .. } => tx_reference.as_deref(),
            _ => None,
        }
    }

    /// Shortfall measured before anything was submitted
    pub fn unfunded(asset: &str, environment: Environment, required: U256, available: U256) -> Self {
        DistributionError::InsufficientOperatorFunds {
            asset: asset.to_string(),
            environment,
            required: Some(required),
            available: Some(available),
            reason: None,
        }
    }

    pub fn balance_query(asset: Option<&str>, err: impl std::fmt::Display) -> Self {
        DistributionError::BalanceQuery {
            asset: asset.map(str::to_string),
            reason: err.to_string(),
        }
    }

    /// Map a chain client error onto the taxonomy.
    ///
    /// `fee_asset` names the asset that pays for gas, reported when the chain
    /// says the operator cannot pay.
    pub fn from_chain_error(
        err: &eyre::Report,
        environment: Environment,
        fee_asset: &str,
        tx_reference: Option<String>,
    ) -> Self {
        let reason = format!("{:#}", err);
        match classify_chain_error(&reason) {
            ChainErrorClass::Reverted => DistributionError::ContractReverted {
                tx_reference,
                asset: None,
                reason,
            },
            ChainErrorClass::Timeout => DistributionError::Timeout {
                tx_reference,
                reason,
            },
            ChainErrorClass::InsufficientFunds => DistributionError::InsufficientOperatorFunds {
                asset: fee_asset.to_string(),
                environment,
                required: None,
                available: None,
                reason: Some(reason),
            },
            ChainErrorClass::NonceMismatch | ChainErrorClass::Transient | ChainErrorClass::Other => {
                DistributionError::ChainSubmission { reason }
            }
        }
    }
}

fn funding_detail(required: &Option<U256>, available: &Option<U256>, reason: &Option<String>) -> String {
    match (required, available, reason) {
        (Some(required), Some(available), _) => {
            format!(": required {}, available {}", required, available)
        }
        (_, _, Some(reason)) => format!(": {}", reason),
        _ => String::new(),
    }
}

fn asset_suffix(asset: &Option<String>) -> String {
    asset
        .as_deref()
        .map(|a| format!(" for {}", a))
        .unwrap_or_default()
}

// ============================================================================
// Chain Error Classification
// ============================================================================

/// Coarse class of a chain client error message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainErrorClass {
    /// Execution reverted (estimate or receipt)
    Reverted,
    /// Operator cannot pay fees or value
    InsufficientFunds,
    /// Nonce / account sequence out of step
    NonceMismatch,
    /// No finality or no response within the deadline
    Timeout,
    /// Connection-level failure
    Transient,
    Other,
}

/// Classify an error message from a chain client
pub fn classify_chain_error(error: &str) -> ChainErrorClass {
    let error_lower = error.to_lowercase();

    if error_lower.contains("execution reverted") || error_lower.contains("revert") {
        return ChainErrorClass::Reverted;
    }

    if error_lower.contains("insufficient funds")
        || error_lower.contains("insufficient fee")
        || error_lower.contains("insufficient balance")
    {
        return ChainErrorClass::InsufficientFunds;
    }

    if error_lower.contains("nonce too low")
        || error_lower.contains("nonce too high")
        || error_lower.contains("already known")
        || error_lower.contains("account sequence mismatch")
        || error_lower.contains("incorrect account sequence")
    {
        return ChainErrorClass::NonceMismatch;
    }

    if error_lower.contains("timeout")
        || error_lower.contains("timed out")
        || error_lower.contains("not confirmed")
        || error_lower.contains("deadline")
    {
        return ChainErrorClass::Timeout;
    }

    if error_lower.contains("connection")
        || error_lower.contains("network")
        || error_lower.contains("503")
        || error_lower.contains("502")
        || error_lower.contains("temporarily unavailable")
    {
        return ChainErrorClass::Transient;
    }

    ChainErrorClass::Other
}
