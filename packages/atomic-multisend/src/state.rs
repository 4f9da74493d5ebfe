use alloy::primitives::{Address, U256};
use std::collections::HashMap;

use crate::error::ContractError;

/// Contract-level storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractState {
    /// The contract's own account (holds deposits, receives `msg.value`)
    pub address: Address,
    /// The only account allowed to call state-changing entry points
    pub operator: Address,
}

// ============================================================================
// Ledger State
// ============================================================================

/// Native balances, ERC20 balances and ERC20 allowances of the environment
pub trait LedgerState {
    fn native_balance(&self, account: Address) -> U256;
    fn token_balance(&self, token: Address, account: Address) -> U256;
    fn allowance(&self, token: Address, owner: Address, spender: Address) -> U256;

    fn set_native_balance(&mut self, account: Address, amount: U256);
    fn set_token_balance(&mut self, token: Address, account: Address, amount: U256);
    fn set_allowance(&mut self, token: Address, owner: Address, spender: Address, amount: U256);

    /// Move native coin; fails without writing when `from` is short
    fn transfer_native(&mut self, from: Address, to: Address, amount: U256) -> Result<(), ContractError> {
        let available = self.native_balance(from);
        let remaining = available
            .checked_sub(amount)
            .ok_or(ContractError::InsufficientBalance {
                token: Address::ZERO,
                required: amount,
                available,
            })?;
        self.set_native_balance(from, remaining);

        let credited = self
            .native_balance(to)
            .checked_add(amount)
            .ok_or(ContractError::Overflow)?;
        self.set_native_balance(to, credited);
        Ok(())
    }

    /// ERC20 `transfer` from `from`'s own balance
    fn transfer_token(
        &mut self,
        token: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), ContractError> {
        let available = self.token_balance(token, from);
        let remaining = available
            .checked_sub(amount)
            .ok_or(ContractError::InsufficientBalance {
                token,
                required: amount,
                available,
            })?;
        self.set_token_balance(token, from, remaining);

        let credited = self
            .token_balance(token, to)
            .checked_add(amount)
            .ok_or(ContractError::Overflow)?;
        self.set_token_balance(token, to, credited);
        Ok(())
    }

    /// ERC20 `transferFrom` executed by `spender`, consuming allowance
    fn transfer_token_from(
        &mut self,
        token: Address,
        spender: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), ContractError> {
        let allowed = self.allowance(token, from, spender);
        let left = allowed
            .checked_sub(amount)
            .ok_or(ContractError::InsufficientAllowance {
                token,
                required: amount,
                available: allowed,
            })?;
        self.set_allowance(token, from, spender, left);
        self.transfer_token(token, from, to, amount)
    }
}

// ============================================================================
// In-Memory Ledger
// ============================================================================

/// HashMap-backed ledger used by tests and local simulation
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    native: HashMap<Address, U256>,
    tokens: HashMap<(Address, Address), U256>,
    allowances: HashMap<(Address, Address, Address), U256>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit native coin out of thin air
    pub fn mint_native(&mut self, account: Address, amount: U256) {
        let next = self.native_balance(account).saturating_add(amount);
        self.set_native_balance(account, next);
    }

    /// Credit tokens out of thin air
    pub fn mint_token(&mut self, token: Address, account: Address, amount: U256) {
        let next = self.token_balance(token, account).saturating_add(amount);
        self.set_token_balance(token, account, next);
    }

    /// ERC20 `approve` on behalf of `owner`
    pub fn approve(&mut self, token: Address, owner: Address, spender: Address, amount: U256) {
        self.set_allowance(token, owner, spender, amount);
    }
}

impl LedgerState for InMemoryLedger {
    fn native_balance(&self, account: Address) -> U256 {
        self.native.get(&account).copied().unwrap_or_default()
    }

    fn token_balance(&self, token: Address, account: Address) -> U256 {
        self.tokens.get(&(token, account)).copied().unwrap_or_default()
    }

    fn allowance(&self, token: Address, owner: Address, spender: Address) -> U256 {
        self.allowances
            .get(&(token, owner, spender))
            .copied()
            .unwrap_or_default()
    }

    fn set_native_balance(&mut self, account: Address, amount: U256) {
        self.native.insert(account, amount);
    }

    fn set_token_balance(&mut self, token: Address, account: Address, amount: U256) {
        self.tokens.insert((token, account), amount);
    }

    fn set_allowance(&mut self, token: Address, owner: Address, spender: Address, amount: U256) {
        self.allowances.insert((token, owner, spender), amount);
    }
}

// ============================================================================
// Journal
// ============================================================================

/// Write overlay for one call.
///
/// Reads check the overlay first, then fall through to the base ledger.
/// Writes stay in the overlay until [`Journal::commit`]; dropping the journal
/// discards them, which is how a revert is realised.
pub struct Journal<'a, S: LedgerState> {
    base: &'a mut S,
    native: HashMap<Address, U256>,
    tokens: HashMap<(Address, Address), U256>,
    allowances: HashMap<(Address, Address, Address), U256>,
}

impl<'a, S: LedgerState> Journal<'a, S> {
    pub fn new(base: &'a mut S) -> Self {
        Self {
            base,
            native: HashMap::new(),
            tokens: HashMap::new(),
            allowances: HashMap::new(),
        }
    }

    /// Number of pending writes
    pub fn pending_writes(&self) -> usize {
        self.native.len() + self.tokens.len() + self.allowances.len()
    }

    /// Apply every pending write to the base ledger
    pub fn commit(self) {
        for (account, amount) in self.native {
            self.base.set_native_balance(account, amount);
        }
        for ((token, account), amount) in self.tokens {
            self.base.set_token_balance(token, account, amount);
        }
        for ((token, owner, spender), amount) in self.allowances {
            self.base.set_allowance(token, owner, spender, amount);
        }
    }
}

impl<S: LedgerState> LedgerState for Journal<'_, S> {
    fn native_balance(&self, account: Address) -> U256 {
        match self.native.get(&account) {
            Some(amount) => *amount,
            None => self.base.native_balance(account),
        }
    }

    fn token_balance(&self, token: Address, account: Address) -> U256 {
        match self.tokens.get(&(token, account)) {
            Some(amount) => *amount,
            None => self.base.token_balance(token, account),
        }
    }

    fn allowance(&self, token: Address, owner: Address, spender: Address) -> U256 {
        match self.allowances.get(&(token, owner, spender)) {
            Some(amount) => *amount,
            None => self.base.allowance(token, owner, spender),
        }
    }

    fn set_native_balance(&mut self, account: Address, amount: U256) {
        self.native.insert(account, amount);
    }

    fn set_token_balance(&mut self, token: Address, account: Address, amount: U256) {
        self.tokens.insert((token, account), amount);
    }

    fn set_allowance(&mut self, token: Address, owner: Address, spender: Address, amount: U256) {
        self.allowances.insert((token, owner, spender), amount);
    }
}
