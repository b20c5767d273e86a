//! # In-Memory Token Ledger
//!
//! A minimal fungible token with balances, a tracked total supply and
//! owner → spender allowances. It exists so the vault can be exercised end
//! to end without a real chain underneath.
//!
//! ## Allowance Semantics
//!
//! - `approve` overwrites the previous allowance; it does not add to it.
//! - `transfer_from` checks the allowance first, then the balance, and only
//!   then mutates. A shortfall in either leaves every map untouched.
//! - An allowance of `u64::MAX` is unlimited and is never decremented.

use std::collections::HashMap;

use super::{AssetLedger, LedgerError};
use crate::identity::AccountId;

/// Balances, supply and allowances for a single token.
#[derive(Debug, Clone, Default)]
pub struct TokenLedger {
    /// Ticker shown in logs and API responses.
    symbol: String,
    /// Sum of all balances.
    total_supply: u64,
    /// Per-account balances. Absent means zero.
    balances: HashMap<AccountId, u64>,
    /// `(owner, spender) -> remaining allowance`.
    allowances: HashMap<(AccountId, AccountId), u64>,
}

impl TokenLedger {
    /// Creates an empty ledger for `symbol`.
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            ..Default::default()
        }
    }

    /// The token ticker.
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Total units in existence.
    pub fn total_supply(&self) -> u64 {
        self.total_supply
    }

    /// Sets the allowance `owner` grants `spender`, replacing any previous value.
    pub fn approve(&mut self, owner: &AccountId, spender: &AccountId, amount: u64) {
        if amount == 0 {
            self.allowances.remove(&(*owner, *spender));
        } else {
            self.allowances.insert((*owner, *spender), amount);
        }
        tracing::debug!(
            token = %self.symbol,
            owner = %owner,
            spender = %spender,
            amount,
            "allowance set"
        );
    }

    /// Remaining allowance `owner` has granted `spender`.
    pub fn allowance(&self, owner: &AccountId, spender: &AccountId) -> u64 {
        self.allowances
            .get(&(*owner, *spender))
            .copied()
            .unwrap_or(0)
    }

    /// Number of accounts holding a non-zero balance.
    pub fn holder_count(&self) -> usize {
        self.balances.values().filter(|b| **b > 0).count()
    }

    /// Checks a move of `amount` out of `from` and into `to` without
    /// touching state. Returns the post-move balances.
    fn plan_move(
        &self,
        from: &AccountId,
        to: &AccountId,
        amount: u64,
    ) -> Result<(u64, u64), LedgerError> {
        let from_balance = self.balance_of(from);
        if from_balance < amount {
            return Err(LedgerError::InsufficientBalance {
                available: from_balance,
                requested: amount,
            });
        }
        if from == to {
            return Ok((from_balance, from_balance));
        }
        let to_balance = self.balance_of(to);
        let new_to = to_balance.checked_add(amount).ok_or(LedgerError::Overflow {
            current: to_balance,
            credit: amount,
        })?;
        Ok((from_balance - amount, new_to))
    }

    fn set_balance(&mut self, account: &AccountId, amount: u64) {
        if amount == 0 {
            self.balances.remove(account);
        } else {
            self.balances.insert(*account, amount);
        }
    }

    fn apply_move(&mut self, from: &AccountId, to: &AccountId, new_from: u64, new_to: u64) {
        if from == to {
            return;
        }
        self.set_balance(from, new_from);
        self.set_balance(to, new_to);
    }
}

impl AssetLedger for TokenLedger {
    fn balance_of(&self, account: &AccountId) -> u64 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    fn transfer(
        &mut self,
        from: &AccountId,
        to: &AccountId,
        amount: u64,
    ) -> Result<(), LedgerError> {
        let (new_from, new_to) = self.plan_move(from, to, amount)?;
        self.apply_move(from, to, new_from, new_to);
        tracing::debug!(token = %self.symbol, from = %from, to = %to, amount, "transfer");
        Ok(())
    }

    fn transfer_from(
        &mut self,
        spender: &AccountId,
        from: &AccountId,
        to: &AccountId,
        amount: u64,
    ) -> Result<(), LedgerError> {
        let remaining_allowance = if spender == from {
            None
        } else {
            let allowed = self.allowance(from, spender);
            if allowed < amount {
                return Err(LedgerError::InsufficientAllowance {
                    allowed,
                    requested: amount,
                });
            }
            Some(allowed)
        };

        let (new_from, new_to) = self.plan_move(from, to, amount)?;

        // Everything checked; commit.
        if let Some(allowed) = remaining_allowance {
            if allowed != u64::MAX {
                let left = allowed - amount;
                if left == 0 {
                    self.allowances.remove(&(*from, *spender));
                } else {
                    self.allowances.insert((*from, *spender), left);
                }
            }
        }
        self.apply_move(from, to, new_from, new_to);
        tracing::debug!(
            token = %self.symbol,
            spender = %spender,
            from = %from,
            to = %to,
            amount,
            "transfer_from"
        );
        Ok(())
    }

    fn mint(&mut self, account: &AccountId, amount: u64) -> Result<(), LedgerError> {
        let new_supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(LedgerError::Overflow {
                current: self.total_supply,
                credit: amount,
            })?;
        let balance = self.balance_of(account);
        // Cannot overflow: balance <= total_supply.
        let new_balance = balance + amount;

        self.total_supply = new_supply;
        self.set_balance(account, new_balance);
        tracing::debug!(token = %self.symbol, account = %account, amount, "mint");
        Ok(())
    }

    fn burn(&mut self, account: &AccountId, amount: u64) -> Result<(), LedgerError> {
        let balance = self.balance_of(account);
        if balance < amount {
            return Err(LedgerError::InsufficientBalance {
                available: balance,
                requested: amount,
            });
        }
        self.set_balance(account, balance - amount);
        self.total_supply -= amount;
        tracing::debug!(token = %self.symbol, account = %account, amount, "burn");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
