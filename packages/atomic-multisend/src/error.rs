use alloy::primitives::{Address, U256};
use thiserror::Error;

/// Revert reasons. Any of these discards every write of the call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContractError {
    #[error("Unauthorized: only the operator can perform this action")]
    Unauthorized,

    #[error("Transfer list is empty")]
    EmptyTransfers,

    #[error("Recipient must not be the zero address")]
    InvalidRecipient,

    #[error("Zero amount for token {token}")]
    ZeroAmount { token: Address },

    #[error("Insufficient balance of {token}: required {required}, available {available}")]
    InsufficientBalance {
        token: Address,
        required: U256,
        available: U256,
    },

    #[error("Insufficient allowance of {token}: required {required}, available {available}")]
    InsufficientAllowance {
        token: Address,
        required: U256,
        available: U256,
    },

    #[error("Insufficient native value: required {required}, provided {provided}")]
    InsufficientNativeValue { required: U256, provided: U256 },

    #[error("Sender cannot cover attached value: required {required}, available {available}")]
    InsufficientSenderFunds { required: U256, available: U256 },

    #[error("Function is not payable")]
    NonPayable,

    #[error("Arithmetic overflow")]
    Overflow,
}

impl ContractError {
    /// Asset reference the revert is about; [`crate::NATIVE`] for the native coin
    pub fn asset(&self) -> Option<Address> {
        match self {
            ContractError::ZeroAmount { token }
            | ContractError::InsufficientBalance { token, .. }
            | ContractError::InsufficientAllowance { token, .. } => Some(*token),
            ContractError::InsufficientNativeValue { .. }
            | ContractError::InsufficientSenderFunds { .. } => Some(crate::NATIVE),
            ContractError::Unauthorized
            | ContractError::EmptyTransfers
            | ContractError::InvalidRecipient
            | ContractError::NonPayable
            | ContractError::Overflow => None,
        }
    }
}
