//! # Asset Ledger: the Vault's External Collaborator
//!
//! The vault never holds token balances itself. It asks a fungible-token
//! ledger to move the underlying asset and reads its own balance back from
//! that ledger. This module defines the seam ([`AssetLedger`]) and ships an
//! in-memory implementation ([`TokenLedger`]) for tests, the simulator and
//! devnets.
//!
//! ## Design Principles
//!
//! 1. **All amounts are `u64` in smallest-unit denomination.** No floating
//!    point, no decimals in arithmetic.
//! 2. **Every failure is typed.** Allowance and balance shortfalls carry the
//!    numbers that caused them so callers can report something useful.
//! 3. **A failed call changes nothing.** Implementations must check
//!    everything before mutating anything.

pub mod token;

use thiserror::Error;

use crate::identity::AccountId;

pub use token::TokenLedger;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors surfaced by an asset ledger.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// The spender is not approved to move this much on the owner's behalf.
    #[error("transfer amount exceeds allowance: allowed {allowed}, requested {requested}")]
    InsufficientAllowance {
        /// Remaining allowance granted by the owner to the spender.
        allowed: u64,
        /// Amount the spender tried to move.
        requested: u64,
    },

    /// The source account does not hold enough of the asset.
    #[error("transfer amount exceeds balance: available {available}, requested {requested}")]
    InsufficientBalance {
        /// Current balance of the source account.
        available: u64,
        /// Amount that was requested.
        requested: u64,
    },

    /// A credit or mint would overflow `u64`.
    #[error("balance overflow: current {current}, credit {credit}")]
    Overflow {
        /// Balance (or supply) before the failed credit.
        current: u64,
        /// Amount that caused the overflow.
        credit: u64,
    },
}

// ---------------------------------------------------------------------------
// AssetLedger
// ---------------------------------------------------------------------------

/// A fungible-token ledger the vault can move its underlying asset through.
///
/// Calls are synchronous and atomic: either the whole movement happens or
/// the ledger is left untouched and an error is returned.
pub trait AssetLedger {
    /// Balance of `account`, zero for accounts the ledger has never seen.
    fn balance_of(&self, account: &AccountId) -> u64;

    /// Owner-initiated transfer. Only the balance is checked.
    fn transfer(&mut self, from: &AccountId, to: &AccountId, amount: u64)
        -> Result<(), LedgerError>;

    /// Spender-initiated transfer on the owner's behalf.
    ///
    /// The allowance `from` granted `spender` is checked (and consumed)
    /// before the balance is. A spender moving its own funds needs no
    /// allowance.
    fn transfer_from(
        &mut self,
        spender: &AccountId,
        from: &AccountId,
        to: &AccountId,
        amount: u64,
    ) -> Result<(), LedgerError>;

    /// Create `amount` new units in `account`.
    fn mint(&mut self, account: &AccountId, amount: u64) -> Result<(), LedgerError>;

    /// Destroy `amount` units held by `account`.
    fn burn(&mut self, account: &AccountId, amount: u64) -> Result<(), LedgerError>;
}
