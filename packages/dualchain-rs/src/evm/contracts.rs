//! Ledger-B contract ABI definitions
//!
//! Uses alloy's sol! macro to generate type-safe bindings for the atomic
//! multi-asset sender and the ERC20 tokens it moves.
//!
//! The zero address in a `Transfer.token` field denotes the native coin.

use alloy::primitives::{Address, U256};
use alloy::sol;
use alloy::sol_types::SolInterface;
use AtomicMultiSend::AtomicMultiSendErrors;

sol! {
    /// All-or-nothing multi-asset sender
    #[sol(rpc)]
    contract AtomicMultiSend {
        struct Transfer {
            address token;
            uint256 amount;
        }

        // ========================================================================
        // Distribution
        // ========================================================================

        /// Validate every transfer, then move all of them; reverts on any shortfall.
        /// `msg.value` must cover the summed native entries; excess is refunded.
        function atomicMultiSend(address recipient, Transfer[] transfers) external payable;

        // ========================================================================
        // Administration (operator only)
        // ========================================================================

        function depositToken(address token, uint256 amount) external;
        function withdrawToken(address token, uint256 amount, address to) external;
        function withdrawNative(uint256 amount, address to) external;
        function emergencyRecover(address[] tokens, address to) external;
        function transferOperator(address newOperator) external;

        // ========================================================================
        // Queries
        // ========================================================================

        function operator() external view returns (address);
        /// Amount of `token` (native for the zero address) held by the contract itself
        function heldBalance(address token) external view returns (uint256);

        // ========================================================================
        // Events
        // ========================================================================

        event Distributed(address indexed recipient, uint256 nativeAmount, Transfer[] transfers);
        event TokenDeposited(address indexed token, uint256 amount);
        event Withdrawn(address indexed token, uint256 amount, address indexed to);
        event Recovered(address indexed to, uint256 nativeAmount, Transfer[] tokens);
        event OperatorTransferred(address indexed previousOperator, address indexed newOperator);

        // ========================================================================
        // Errors
        // ========================================================================

        error Unauthorized();
        error EmptyTransfers();
        error InvalidRecipient();
        error ZeroAmount(address token);
        error InsufficientBalance(address token, uint256 required, uint256 available);
        error InsufficientAllowance(address token, uint256 required, uint256 available);
        error InsufficientNativeValue(uint256 required, uint256 provided);
        error InsufficientSenderFunds(uint256 required, uint256 available);
        error NonPayable();
        error Overflow();
    }

    /// Standard ERC20 interface
    #[sol(rpc)]
    contract ERC20 {
        function name() external view returns (string);
        function symbol() external view returns (string);
        function decimals() external view returns (uint8);
        function balanceOf(address account) external view returns (uint256);
        function transfer(address to, uint256 amount) external returns (bool);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
        function transferFrom(address from, address to, uint256 amount) external returns (bool);

        event Transfer(address indexed from, address indexed to, uint256 value);
        event Approval(address indexed owner, address indexed spender, uint256 value);
    }
}

/// Build the contract's transfer list from (asset reference, amount) pairs
pub fn build_transfers(entries: &[(Address, U256)]) -> Vec<AtomicMultiSend::Transfer> {
    entries
        .iter()
        .map(|(token, amount)| AtomicMultiSend::Transfer {
            token: *token,
            amount: *amount,
        })
        .collect()
}

/// Sum of the native (zero-address) entries, i.e. the `msg.value` to attach
pub fn native_value(transfers: &[AtomicMultiSend::Transfer]) -> U256 {
    transfers
        .iter()
        .filter(|t| t.token == Address::ZERO)
        .fold(U256::ZERO, |acc, t| acc.saturating_add(t.amount))
}

// ============================================================================
// Revert Decoding
// ============================================================================

/// Decode revert data returned by the atomic contract
pub fn decode_revert(data: &[u8]) -> Option<AtomicMultiSendErrors> {
    AtomicMultiSendErrors::abi_decode(data, true).ok()
}

/// Asset reference a revert is about; the zero address for the native coin
pub fn revert_asset(err: &AtomicMultiSendErrors) -> Option<Address> {
    match err {
        AtomicMultiSendErrors::ZeroAmount(e) => Some(e.token),
        AtomicMultiSendErrors::InsufficientBalance(e) => Some(e.token),
        AtomicMultiSendErrors::InsufficientAllowance(e) => Some(e.token),
        AtomicMultiSendErrors::InsufficientNativeValue(_)
        | AtomicMultiSendErrors::InsufficientSenderFunds(_) => Some(Address::ZERO),
        AtomicMultiSendErrors::Unauthorized(_)
        | AtomicMultiSendErrors::EmptyTransfers(_)
        | AtomicMultiSendErrors::InvalidRecipient(_)
        | AtomicMultiSendErrors::NonPayable(_)
        | AtomicMultiSendErrors::Overflow(_) => None,
    }
}

/// Human-readable revert reason
pub fn describe_revert(err: &AtomicMultiSendErrors) -> String {
    match err {
        AtomicMultiSendErrors::Unauthorized(_) => "caller is not the operator".to_string(),
        AtomicMultiSendErrors::EmptyTransfers(_) => "transfer list is empty".to_string(),
        AtomicMultiSendErrors::InvalidRecipient(_) => "invalid recipient".to_string(),
        AtomicMultiSendErrors::ZeroAmount(e) => format!("zero amount for {}", e.token),
        AtomicMultiSendErrors::InsufficientBalance(e) => format!(
            "insufficient balance of {}: required {}, available {}",
            e.token, e.required, e.available
        ),
        AtomicMultiSendErrors::InsufficientAllowance(e) => format!(
            "insufficient allowance of {}: required {}, available {}",
            e.token, e.required, e.available
        ),
        AtomicMultiSendErrors::InsufficientNativeValue(e) => format!(
            "insufficient native value: required {}, provided {}",
            e.required, e.provided
        ),
        AtomicMultiSendErrors::InsufficientSenderFunds(e) => format!(
            "sender cannot cover attached value: required {}, available {}",
            e.required, e.available
        ),
        AtomicMultiSendErrors::NonPayable(_) => "function is not payable".to_string(),
        AtomicMultiSendErrors::Overflow(_) => "arithmetic overflow".to_string(),
    }
}
