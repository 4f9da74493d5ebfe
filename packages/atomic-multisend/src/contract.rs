use alloy::primitives::{Address, U256};

use crate::error::ContractError;
use crate::msg::{Event, ExecuteMsg, QueryMsg, QueryResponse, Transfer};
use crate::state::{ContractState, Journal, LedgerState};

/// Caller context of one contract call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallContext {
    /// `msg.sender`
    pub sender: Address,
    /// `msg.value` attached to the call
    pub value: U256,
}

impl CallContext {
    pub fn new(sender: Address, value: U256) -> Self {
        Self { sender, value }
    }

    /// Call without attached value
    pub fn without_value(sender: Address) -> Self {
        Self::new(sender, U256::ZERO)
    }
}

/// Result of a successful call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    pub events: Vec<Event>,
}

impl Response {
    fn with_event(event: Event) -> Self {
        Self {
            events: vec![event],
        }
    }
}

/// The deployed atomic multi-send contract
#[derive(Debug, Clone)]
pub struct AtomicMultiSendContract {
    state: ContractState,
}

impl AtomicMultiSendContract {
    pub fn instantiate(address: Address, operator: Address) -> Self {
        Self {
            state: ContractState { address, operator },
        }
    }

    pub fn address(&self) -> Address {
        self.state.address
    }

    pub fn operator(&self) -> Address {
        self.state.operator
    }

    /// Execute one call. On error nothing is written, including `ctx.value`.
    pub fn execute<S: LedgerState>(
        &mut self,
        ledger: &mut S,
        ctx: CallContext,
        msg: ExecuteMsg,
    ) -> Result<Response, ContractError> {
        let mut journal = Journal::new(ledger);
        let mut next = self.state.clone();

        // msg.value reaches the contract before the body runs
        if !ctx.value.is_zero() {
            let available = journal.native_balance(ctx.sender);
            journal
                .transfer_native(ctx.sender, next.address, ctx.value)
                .map_err(|_| ContractError::InsufficientSenderFunds {
                    required: ctx.value,
                    available,
                })?;
        }

        let response = dispatch(&mut journal, &mut next, ctx, msg)?;

        journal.commit();
        self.state = next;
        Ok(response)
    }

    pub fn query<S: LedgerState>(&self, ledger: &S, msg: QueryMsg) -> QueryResponse {
        match msg {
            QueryMsg::Operator {} => QueryResponse::Operator {
                operator: self.state.operator,
            },
            QueryMsg::HeldBalance { token } => QueryResponse::HeldBalance {
                token,
                amount: held(ledger, self.state.address, token),
            },
        }
    }
}

fn dispatch<S: LedgerState>(
    ledger: &mut S,
    state: &mut ContractState,
    ctx: CallContext,
    msg: ExecuteMsg,
) -> Result<Response, ContractError> {
    if ctx.sender != state.operator {
        return Err(ContractError::Unauthorized);
    }

    let payable = matches!(msg, ExecuteMsg::AtomicMultiSend { .. });
    if !payable && !ctx.value.is_zero() {
        return Err(ContractError::NonPayable);
    }

    match msg {
        ExecuteMsg::AtomicMultiSend {
            recipient,
            transfers,
        } => execute_atomic_multi_send(ledger, state, ctx, recipient, transfers),
        ExecuteMsg::DepositToken { token, amount } => {
            execute_deposit_token(ledger, state, token, amount)
        }
        ExecuteMsg::WithdrawToken { token, amount, to } => {
            execute_withdraw_token(ledger, state, token, amount, to)
        }
        ExecuteMsg::WithdrawNative { amount, to } => {
            execute_withdraw_native(ledger, state, amount, to)
        }
        ExecuteMsg::EmergencyRecover { tokens, to } => {
            execute_emergency_recover(ledger, state, tokens, to)
        }
        ExecuteMsg::TransferOperator { new_operator } => {
            execute_transfer_operator(state, new_operator)
        }
    }
}

// ============================================================================
// Distribution
// ============================================================================

/// Per-token totals in first-appearance order, plus the native total
struct Totals {
    tokens: Vec<(Address, U256)>,
    native: U256,
}

fn aggregate(transfers: &[Transfer]) -> Result<Totals, ContractError> {
    let mut tokens: Vec<(Address, U256)> = Vec::new();
    let mut native = U256::ZERO;

    for transfer in transfers {
        if transfer.is_native() {
            native = native
                .checked_add(transfer.amount)
                .ok_or(ContractError::Overflow)?;
            continue;
        }

        if transfer.amount.is_zero() {
            return Err(ContractError::ZeroAmount {
                token: transfer.token,
            });
        }

        match tokens.iter_mut().find(|(token, _)| *token == transfer.token) {
            Some((_, total)) => {
                *total = total
                    .checked_add(transfer.amount)
                    .ok_or(ContractError::Overflow)?;
            }
            None => tokens.push((transfer.token, transfer.amount)),
        }
    }

    Ok(Totals { tokens, native })
}

fn execute_atomic_multi_send<S: LedgerState>(
    ledger: &mut S,
    state: &ContractState,
    ctx: CallContext,
    recipient: Address,
    transfers: Vec<Transfer>,
) -> Result<Response, ContractError> {
    // Phase 1: validate everything, write nothing
    if transfers.is_empty() {
        return Err(ContractError::EmptyTransfers);
    }
    if recipient == Address::ZERO {
        return Err(ContractError::InvalidRecipient);
    }

    let totals = aggregate(&transfers)?;

    for (token, required) in &totals.tokens {
        let balance = ledger.token_balance(*token, state.operator);
        if balance < *required {
            return Err(ContractError::InsufficientBalance {
                token: *token,
                required: *required,
                available: balance,
            });
        }

        let allowance = ledger.allowance(*token, state.operator, state.address);
        if allowance < *required {
            return Err(ContractError::InsufficientAllowance {
                token: *token,
                required: *required,
                available: allowance,
            });
        }
    }

    if ctx.value < totals.native {
        return Err(ContractError::InsufficientNativeValue {
            required: totals.native,
            provided: ctx.value,
        });
    }

    // Phase 2: execute, tokens first and native last
    for (token, amount) in &totals.tokens {
        ledger.transfer_token_from(*token, state.address, state.operator, recipient, *amount)?;
    }

    if !totals.native.is_zero() {
        ledger.transfer_native(state.address, recipient, totals.native)?;
    }

    let refund = ctx.value - totals.native;
    if !refund.is_zero() {
        ledger.transfer_native(state.address, ctx.sender, refund)?;
    }

    Ok(Response::with_event(Event::Distributed {
        recipient,
        native_amount: totals.native,
        transfers,
    }))
}

// ============================================================================
// Administration
// ============================================================================

fn held<S: LedgerState>(ledger: &S, contract: Address, token: Address) -> U256 {
    if token == Address::ZERO {
        ledger.native_balance(contract)
    } else {
        ledger.token_balance(token, contract)
    }
}

fn execute_deposit_token<S: LedgerState>(
    ledger: &mut S,
    state: &ContractState,
    token: Address,
    amount: U256,
) -> Result<Response, ContractError> {
    if amount.is_zero() {
        return Err(ContractError::ZeroAmount { token });
    }

    ledger.transfer_token_from(token, state.address, state.operator, state.address, amount)?;

    Ok(Response::with_event(Event::TokenDeposited { token, amount }))
}

fn execute_withdraw_token<S: LedgerState>(
    ledger: &mut S,
    state: &ContractState,
    token: Address,
    amount: U256,
    to: Address,
) -> Result<Response, ContractError> {
    if to == Address::ZERO {
        return Err(ContractError::InvalidRecipient);
    }
    ledger.transfer_token(token, state.address, to, amount)?;

    Ok(Response::with_event(Event::Withdrawn { token, amount, to }))
}

fn execute_withdraw_native<S: LedgerState>(
    ledger: &mut S,
    state: &ContractState,
    amount: U256,
    to: Address,
) -> Result<Response, ContractError> {
    if to == Address::ZERO {
        return Err(ContractError::InvalidRecipient);
    }
    ledger.transfer_native(state.address, to, amount)?;

    Ok(Response::with_event(Event::Withdrawn {
        token: Address::ZERO,
        amount,
        to,
    }))
}

fn execute_emergency_recover<S: LedgerState>(
    ledger: &mut S,
    state: &ContractState,
    tokens: Vec<Address>,
    to: Address,
) -> Result<Response, ContractError> {
    if to == Address::ZERO {
        return Err(ContractError::InvalidRecipient);
    }

    let mut recovered = Vec::new();
    for token in tokens {
        if token == Address::ZERO || recovered.iter().any(|t: &Transfer| t.token == token) {
            continue;
        }
        let amount = ledger.token_balance(token, state.address);
        if amount.is_zero() {
            continue;
        }
        ledger.transfer_token(token, state.address, to, amount)?;
        recovered.push(Transfer::token(token, amount));
    }

    let native_amount = ledger.native_balance(state.address);
    if !native_amount.is_zero() {
        ledger.transfer_native(state.address, to, native_amount)?;
    }

    Ok(Response::with_event(Event::Recovered {
        to,
        native_amount,
        tokens: recovered,
    }))
}

fn execute_transfer_operator(
    state: &mut ContractState,
    new_operator: Address,
) -> Result<Response, ContractError> {
    if new_operator == Address::ZERO {
        return Err(ContractError::InvalidRecipient);
    }

    let previous_operator = state.operator;
    state.operator = new_operator;

    Ok(Response::with_event(Event::OperatorTransferred {
        previous_operator,
        new_operator,
    }))
}
