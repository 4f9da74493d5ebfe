use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};

/// Asset reference that denotes the native coin
pub const NATIVE: Address = Address::ZERO;

/// One entry of a distribution bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    /// ERC20 contract, or [`NATIVE`]
    pub token: Address,
    /// Amount in base units
    pub amount: U256,
}

impl Transfer {
    pub fn native(amount: U256) -> Self {
        Self {
            token: NATIVE,
            amount,
        }
    }

    pub fn token(token: Address, amount: U256) -> Self {
        Self { token, amount }
    }

    pub fn is_native(&self) -> bool {
        self.token == NATIVE
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecuteMsg {
    /// Send every transfer to `recipient` or revert. Payable: attached value
    /// must cover the summed native entries; excess is refunded to the caller.
    AtomicMultiSend {
        recipient: Address,
        transfers: Vec<Transfer>,
    },
    /// Operator: pull `amount` of `token` into the contract (requires allowance)
    DepositToken { token: Address, amount: U256 },
    /// Operator: send held tokens out of the contract
    WithdrawToken {
        token: Address,
        amount: U256,
        to: Address,
    },
    /// Operator: send held native coin out of the contract
    WithdrawNative { amount: U256, to: Address },
    /// Operator: move everything the contract holds (listed tokens plus native) to `to`
    EmergencyRecover { tokens: Vec<Address>, to: Address },
    /// Operator: hand the operator role to another account
    TransferOperator { new_operator: Address },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryMsg {
    /// Current operator
    Operator {},
    /// Amount of `token` (or native for [`NATIVE`]) held by the contract itself
    HeldBalance { token: Address },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryResponse {
    Operator { operator: Address },
    HeldBalance { token: Address, amount: U256 },
}

/// Structured log entries emitted by successful calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Event {
    /// Exactly one per successful `AtomicMultiSend`
    Distributed {
        recipient: Address,
        native_amount: U256,
        transfers: Vec<Transfer>,
    },
    TokenDeposited {
        token: Address,
        amount: U256,
    },
    Withdrawn {
        token: Address,
        amount: U256,
        to: Address,
    },
    Recovered {
        to: Address,
        native_amount: U256,
        tokens: Vec<Transfer>,
    },
    OperatorTransferred {
        previous_operator: Address,
        new_operator: Address,
    },
}
