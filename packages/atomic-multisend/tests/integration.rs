//! Integration tests for the atomic multi-send contract.
//!
//! These tests cover the distribution hot path, its all-or-nothing revert
//! behaviour, and the operator-only administration side channel.

use alloy::primitives::{Address, U256};

use atomic_multisend::msg::{Event, ExecuteMsg, QueryMsg, QueryResponse, Transfer, NATIVE};
use atomic_multisend::state::{InMemoryLedger, LedgerState};
use atomic_multisend::{AtomicMultiSendContract, CallContext, ContractError};

// ============================================================================
// Test Setup
// ============================================================================

const OPERATOR_NATIVE: u64 = 1_000_000;
const OPERATOR_TOKENS: u64 = 500_000;

struct Setup {
    ledger: InMemoryLedger,
    contract: AtomicMultiSendContract,
    operator: Address,
    recipient: Address,
    stranger: Address,
    token_a: Address,
    token_b: Address,
}

fn setup() -> Setup {
    let operator = Address::repeat_byte(0x0a);
    let recipient = Address::repeat_byte(0x0b);
    let stranger = Address::repeat_byte(0x0c);
    let contract_addr = Address::repeat_byte(0xcc);
    let token_a = Address::repeat_byte(0xa1);
    let token_b = Address::repeat_byte(0xb1);

    let mut ledger = InMemoryLedger::new();
    ledger.mint_native(operator, U256::from(OPERATOR_NATIVE));
    ledger.mint_native(stranger, U256::from(OPERATOR_NATIVE));
    for token in [token_a, token_b] {
        ledger.mint_token(token, operator, U256::from(OPERATOR_TOKENS));
        ledger.approve(token, operator, contract_addr, U256::from(OPERATOR_TOKENS));
    }

    Setup {
        ledger,
        contract: AtomicMultiSendContract::instantiate(contract_addr, operator),
        operator,
        recipient,
        stranger,
        token_a,
        token_b,
    }
}

fn amt(v: u64) -> U256 {
    U256::from(v)
}

// ============================================================================
// Distribution
// ============================================================================

#[test]
fn test_multi_asset_bundle_delivered() {
    let mut s = setup();
    let transfers = vec![
        Transfer::token(s.token_a, amt(100)),
        Transfer::native(amt(50)),
        Transfer::token(s.token_b, amt(7)),
    ];

    let response = s
        .contract
        .execute(
            &mut s.ledger,
            CallContext::new(s.operator, amt(50)),
            ExecuteMsg::AtomicMultiSend {
                recipient: s.recipient,
                transfers: transfers.clone(),
            },
        )
        .unwrap();

    assert_eq!(s.ledger.token_balance(s.token_a, s.recipient), amt(100));
    assert_eq!(s.ledger.token_balance(s.token_b, s.recipient), amt(7));
    assert_eq!(s.ledger.native_balance(s.recipient), amt(50));
    assert_eq!(
        s.ledger.native_balance(s.operator),
        amt(OPERATOR_NATIVE - 50)
    );
    assert_eq!(
        s.ledger
            .allowance(s.token_a, s.operator, s.contract.address()),
        amt(OPERATOR_TOKENS - 100)
    );

    // Exactly one structured event
    assert_eq!(
        response.events,
        vec![Event::Distributed {
            recipient: s.recipient,
            native_amount: amt(50),
            transfers,
        }]
    );
}

#[test]
fn test_excess_native_value_is_refunded() {
    let mut s = setup();
    s.contract
        .execute(
            &mut s.ledger,
            CallContext::new(s.operator, amt(80)),
            ExecuteMsg::AtomicMultiSend {
                recipient: s.recipient,
                transfers: vec![Transfer::native(amt(30))],
            },
        )
        .unwrap();

    assert_eq!(s.ledger.native_balance(s.recipient), amt(30));
    assert_eq!(
        s.ledger.native_balance(s.operator),
        amt(OPERATOR_NATIVE - 30)
    );
    assert_eq!(s.ledger.native_balance(s.contract.address()), U256::ZERO);
}

#[test]
fn test_repeated_token_entries_are_aggregated() {
    let mut s = setup();
    s.ledger
        .approve(s.token_a, s.operator, s.contract.address(), amt(10));

    // 6 + 6 exceeds the allowance of 10 even though each entry fits
    let err = s
        .contract
        .execute(
            &mut s.ledger,
            CallContext::without_value(s.operator),
            ExecuteMsg::AtomicMultiSend {
                recipient: s.recipient,
                transfers: vec![
                    Transfer::token(s.token_a, amt(6)),
                    Transfer::token(s.token_a, amt(6)),
                ],
            },
        )
        .unwrap_err();

    assert_eq!(
        err,
        ContractError::InsufficientAllowance {
            token: s.token_a,
            required: amt(12),
            available: amt(10),
        }
    );
    assert_eq!(s.ledger.token_balance(s.token_a, s.recipient), U256::ZERO);
}

#[test]
fn test_insufficient_allowance_reverts_native_leg_too() {
    let mut s = setup();
    s.ledger
        .approve(s.token_a, s.operator, s.contract.address(), amt(1));

    let err = s
        .contract
        .execute(
            &mut s.ledger,
            CallContext::new(s.operator, amt(40)),
            ExecuteMsg::AtomicMultiSend {
                recipient: s.recipient,
                transfers: vec![
                    Transfer::native(amt(40)),
                    Transfer::token(s.token_a, amt(5)),
                ],
            },
        )
        .unwrap_err();

    assert!(matches!(err, ContractError::InsufficientAllowance { .. }));
    assert_eq!(err.asset(), Some(s.token_a));
    // Nothing moved, including the attached value
    assert_eq!(s.ledger.native_balance(s.recipient), U256::ZERO);
    assert_eq!(s.ledger.native_balance(s.operator), amt(OPERATOR_NATIVE));
    assert_eq!(s.ledger.native_balance(s.contract.address()), U256::ZERO);
    assert_eq!(s.ledger.token_balance(s.token_a, s.recipient), U256::ZERO);
}

#[test]
fn test_insufficient_operator_balance_reverts() {
    let mut s = setup();
    let err = s
        .contract
        .execute(
            &mut s.ledger,
            CallContext::without_value(s.operator),
            ExecuteMsg::AtomicMultiSend {
                recipient: s.recipient,
                transfers: vec![
                    Transfer::token(s.token_b, amt(1)),
                    Transfer::token(s.token_a, amt(OPERATOR_TOKENS + 1)),
                ],
            },
        )
        .unwrap_err();

    assert_eq!(
        err,
        ContractError::InsufficientBalance {
            token: s.token_a,
            required: amt(OPERATOR_TOKENS + 1),
            available: amt(OPERATOR_TOKENS),
        }
    );
    assert_eq!(s.ledger.token_balance(s.token_b, s.recipient), U256::ZERO);
}

#[test]
fn test_native_value_must_cover_native_entries() {
    let mut s = setup();
    let err = s
        .contract
        .execute(
            &mut s.ledger,
            CallContext::new(s.operator, amt(10)),
            ExecuteMsg::AtomicMultiSend {
                recipient: s.recipient,
                transfers: vec![Transfer::native(amt(6)), Transfer::native(amt(6))],
            },
        )
        .unwrap_err();

    assert_eq!(
        err,
        ContractError::InsufficientNativeValue {
            required: amt(12),
            provided: amt(10),
        }
    );
    assert_eq!(s.ledger.native_balance(s.operator), amt(OPERATOR_NATIVE));
}

#[test]
fn test_validation_failures() {
    let mut s = setup();
    let op = CallContext::without_value(s.operator);

    let empty = s.contract.execute(
        &mut s.ledger,
        op,
        ExecuteMsg::AtomicMultiSend {
            recipient: s.recipient,
            transfers: vec![],
        },
    );
    assert_eq!(empty.unwrap_err(), ContractError::EmptyTransfers);

    let zero_recipient = s.contract.execute(
        &mut s.ledger,
        op,
        ExecuteMsg::AtomicMultiSend {
            recipient: Address::ZERO,
            transfers: vec![Transfer::token(s.token_a, amt(1))],
        },
    );
    assert_eq!(zero_recipient.unwrap_err(), ContractError::InvalidRecipient);

    let zero_amount = s.contract.execute(
        &mut s.ledger,
        op,
        ExecuteMsg::AtomicMultiSend {
            recipient: s.recipient,
            transfers: vec![Transfer::token(s.token_a, U256::ZERO)],
        },
    );
    assert_eq!(
        zero_amount.unwrap_err(),
        ContractError::ZeroAmount { token: s.token_a }
    );
}

#[test]
fn test_only_operator_can_distribute() {
    let mut s = setup();
    let err = s
        .contract
        .execute(
            &mut s.ledger,
            CallContext::new(s.stranger, amt(5)),
            ExecuteMsg::AtomicMultiSend {
                recipient: s.stranger,
                transfers: vec![Transfer::native(amt(5))],
            },
        )
        .unwrap_err();

    assert_eq!(err, ContractError::Unauthorized);
    assert_eq!(s.ledger.native_balance(s.stranger), amt(OPERATOR_NATIVE));
}

#[test]
fn test_sender_must_afford_attached_value() {
    let mut s = setup();
    let err = s
        .contract
        .execute(
            &mut s.ledger,
            CallContext::new(s.operator, amt(OPERATOR_NATIVE + 1)),
            ExecuteMsg::AtomicMultiSend {
                recipient: s.recipient,
                transfers: vec![Transfer::native(amt(1))],
            },
        )
        .unwrap_err();

    assert!(matches!(err, ContractError::InsufficientSenderFunds { .. }));
    assert_eq!(err.asset(), Some(NATIVE));
}

// ============================================================================
// Administration
// ============================================================================

#[test]
fn test_deposit_and_withdraw_token() {
    let mut s = setup();
    let op = CallContext::without_value(s.operator);
    let contract_addr = s.contract.address();

    s.contract
        .execute(
            &mut s.ledger,
            op,
            ExecuteMsg::DepositToken {
                token: s.token_a,
                amount: amt(1_000),
            },
        )
        .unwrap();
    assert_eq!(
        s.contract.query(&s.ledger, QueryMsg::HeldBalance { token: s.token_a }),
        QueryResponse::HeldBalance {
            token: s.token_a,
            amount: amt(1_000)
        }
    );

    s.contract
        .execute(
            &mut s.ledger,
            op,
            ExecuteMsg::WithdrawToken {
                token: s.token_a,
                amount: amt(400),
                to: s.recipient,
            },
        )
        .unwrap();
    assert_eq!(s.ledger.token_balance(s.token_a, contract_addr), amt(600));
    assert_eq!(s.ledger.token_balance(s.token_a, s.recipient), amt(400));

    let overdraw = s.contract.execute(
        &mut s.ledger,
        op,
        ExecuteMsg::WithdrawToken {
            token: s.token_a,
            amount: amt(601),
            to: s.recipient,
        },
    );
    assert!(matches!(
        overdraw.unwrap_err(),
        ContractError::InsufficientBalance { .. }
    ));
}

#[test]
fn test_emergency_recover_moves_everything_held() {
    let mut s = setup();
    let contract_addr = s.contract.address();
    s.ledger.mint_token(s.token_a, contract_addr, amt(11));
    s.ledger.mint_token(s.token_b, contract_addr, amt(22));
    s.ledger.mint_native(contract_addr, amt(33));

    let response = s
        .contract
        .execute(
            &mut s.ledger,
            CallContext::without_value(s.operator),
            ExecuteMsg::EmergencyRecover {
                tokens: vec![s.token_a, s.token_b, s.token_a, NATIVE],
                to: s.operator,
            },
        )
        .unwrap();

    assert_eq!(s.ledger.token_balance(s.token_a, contract_addr), U256::ZERO);
    assert_eq!(s.ledger.token_balance(s.token_b, contract_addr), U256::ZERO);
    assert_eq!(s.ledger.native_balance(contract_addr), U256::ZERO);
    assert_eq!(
        response.events,
        vec![Event::Recovered {
            to: s.operator,
            native_amount: amt(33),
            tokens: vec![
                Transfer::token(s.token_a, amt(11)),
                Transfer::token(s.token_b, amt(22)),
            ],
        }]
    );
}

#[test]
fn test_admin_calls_are_operator_only_and_non_payable() {
    let mut s = setup();

    let err = s
        .contract
        .execute(
            &mut s.ledger,
            CallContext::without_value(s.stranger),
            ExecuteMsg::WithdrawNative {
                amount: amt(1),
                to: s.stranger,
            },
        )
        .unwrap_err();
    assert_eq!(err, ContractError::Unauthorized);

    let err = s
        .contract
        .execute(
            &mut s.ledger,
            CallContext::new(s.operator, amt(1)),
            ExecuteMsg::WithdrawNative {
                amount: amt(1),
                to: s.recipient,
            },
        )
        .unwrap_err();
    assert_eq!(err, ContractError::NonPayable);
    assert_eq!(s.ledger.native_balance(s.operator), amt(OPERATOR_NATIVE));
}

#[test]
fn test_transfer_operator() {
    let mut s = setup();
    let new_operator = s.stranger;

    s.contract
        .execute(
            &mut s.ledger,
            CallContext::without_value(s.operator),
            ExecuteMsg::TransferOperator { new_operator },
        )
        .unwrap();

    assert_eq!(
        s.contract.query(&s.ledger, QueryMsg::Operator {}),
        QueryResponse::Operator {
            operator: new_operator
        }
    );

    // The previous operator has lost access
    let err = s
        .contract
        .execute(
            &mut s.ledger,
            CallContext::without_value(s.operator),
            ExecuteMsg::TransferOperator {
                new_operator: s.operator,
            },
        )
        .unwrap_err();
    assert_eq!(err, ContractError::Unauthorized);

    let err = s
        .contract
        .execute(
            &mut s.ledger,
            CallContext::without_value(new_operator),
            ExecuteMsg::TransferOperator {
                new_operator: Address::ZERO,
            },
        )
        .unwrap_err();
    assert_eq!(err, ContractError::InvalidRecipient);
}

#[test]
fn test_messages_serialize_snake_case() {
    let msg = ExecuteMsg::TransferOperator {
        new_operator: Address::ZERO,
    };
    let json = serde_json::to_string(&msg).unwrap();
    assert!(json.starts_with("{\"transfer_operator\""));
}
