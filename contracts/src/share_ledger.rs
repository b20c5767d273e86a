//! # Share Ledger
//!
//! Tracks how many vault shares exist and who holds them, and converts
//! between asset amounts and shares at the pool's current exchange rate.
//!
//! ## Conversion Rules
//!
//! ```text
//! deposit:  shares = assets                                  if total_shares == 0 or total_assets == 0
//!           shares = floor(assets * total_shares / total_assets)  otherwise
//! redeem:   assets = floor(shares * total_assets / total_shares)
//! ```
//!
//! Division always floors. Whatever a depositor or redeemer loses to
//! rounding stays in the pool and accrues to the remaining holders.
//!
//! Products are computed in `u128`, so `u64 * u64` can never overflow
//! mid-calculation. Only a quotient that does not fit back into `u64` is an
//! error.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stakebar_protocol::identity::AccountId;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from share conversion and share bookkeeping.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ShareError {
    /// Tried to price shares against a pool with no shares outstanding.
    #[error("division undefined: pool has zero total shares")]
    DivisionUndefined,

    /// Tried to burn more shares than the account holds.
    #[error("burn amount exceeds balance: account {account} holds {available}, requested {requested}")]
    InsufficientBalance {
        /// The account being debited.
        account: AccountId,
        /// Shares the account holds.
        available: u64,
        /// Shares the caller tried to burn.
        requested: u64,
    },

    /// A share count or a conversion result does not fit in `u64`.
    #[error("share arithmetic overflow")]
    Overflow,

    /// The per-account balances no longer add up to the pool total.
    #[error("share ledger invariant violated: {0}")]
    InvariantViolation(String),
}

// ---------------------------------------------------------------------------
// Conversion Math
// ---------------------------------------------------------------------------

/// `floor(a * b / c)` in `u128`. `None` when `c == 0` or the quotient
/// does not fit in `u64`.
fn mul_div_floor(a: u64, b: u64, c: u64) -> Option<u64> {
    if c == 0 {
        return None;
    }
    let q = (a as u128) * (b as u128) / (c as u128);
    u64::try_from(q).ok()
}

/// Shares minted for a deposit of `assets`, priced against the pool as it
/// stood before the deposit.
///
/// An empty pool (no shares, or no assets backing them) mints 1:1.
///
/// # Errors
///
/// Returns [`ShareError::Overflow`] if the share count does not fit in `u64`.
pub fn shares_for_deposit(assets: u64, total_shares: u64, total_assets: u64) -> Result<u64, ShareError> {
    if total_shares == 0 || total_assets == 0 {
        return Ok(assets);
    }
    mul_div_floor(assets, total_shares, total_assets).ok_or(ShareError::Overflow)
}

/// Assets owed for redeeming `shares` at the current exchange rate.
///
/// # Errors
///
/// Returns [`ShareError::DivisionUndefined`] if `total_shares == 0`.
/// Returns [`ShareError::Overflow`] if the result does not fit in `u64`.
pub fn assets_for_shares(shares: u64, total_shares: u64, total_assets: u64) -> Result<u64, ShareError> {
    if total_shares == 0 {
        return Err(ShareError::DivisionUndefined);
    }
    mul_div_floor(shares, total_assets, total_shares).ok_or(ShareError::Overflow)
}

// ---------------------------------------------------------------------------
// ShareAccount
// ---------------------------------------------------------------------------

/// One depositor's position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareAccount {
    /// Shares held.
    pub shares: u64,
    /// When the account last called `enter`. Every deposit overwrites it;
    /// there are no per-lot timestamps.
    pub last_deposit_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// ShareLedger
// ---------------------------------------------------------------------------

/// Total shares outstanding plus every holder's balance.
///
/// Accounts appear on first mint and disappear when their balance returns
/// to zero. The sum of all balances always equals [`total_shares`](Self::total_shares).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShareLedger {
    total_shares: u64,
    accounts: BTreeMap<AccountId, ShareAccount>,
}

impl ShareLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Shares outstanding across all holders.
    pub fn total_shares(&self) -> u64 {
        self.total_shares
    }

    /// Shares held by `account`; zero if it never deposited.
    pub fn balance_of(&self, account: &AccountId) -> u64 {
        self.accounts.get(account).map(|a| a.shares).unwrap_or(0)
    }

    /// Full position for `account`, if it holds anything.
    pub fn account(&self, account: &AccountId) -> Option<&ShareAccount> {
        self.accounts.get(account)
    }

    /// When `account` last deposited, if it holds anything.
    pub fn last_deposit_at(&self, account: &AccountId) -> Option<DateTime<Utc>> {
        self.accounts.get(account).map(|a| a.last_deposit_at)
    }

    /// All holders in address order.
    pub fn holders(&self) -> impl Iterator<Item = (&AccountId, &ShareAccount)> {
        self.accounts.iter()
    }

    /// Number of accounts holding shares.
    pub fn holder_count(&self) -> usize {
        self.accounts.len()
    }

    /// Checks that minting `shares` to `account` would succeed, without
    /// changing anything.
    ///
    /// # Errors
    ///
    /// Returns [`ShareError::Overflow`] if either the account balance or the
    /// pool total would overflow.
    pub fn check_mint(&self, account: &AccountId, shares: u64) -> Result<(), ShareError> {
        self.total_shares
            .checked_add(shares)
            .ok_or(ShareError::Overflow)?;
        self.balance_of(account)
            .checked_add(shares)
            .ok_or(ShareError::Overflow)?;
        Ok(())
    }

    /// Credits `shares` to `account` and stamps its deposit time.
    ///
    /// A zero-share mint to an existing holder still refreshes the deposit
    /// time. A zero-share mint to an account holding nothing records
    /// nothing: there is no position to time-stamp.
    ///
    /// Returns the account's new balance.
    ///
    /// # Errors
    ///
    /// Returns [`ShareError::Overflow`] if the mint would overflow.
    pub fn mint_shares(
        &mut self,
        account: &AccountId,
        shares: u64,
        at: DateTime<Utc>,
    ) -> Result<u64, ShareError> {
        self.check_mint(account, shares)?;

        if shares == 0 {
            return Ok(match self.accounts.get_mut(account) {
                Some(position) => {
                    position.last_deposit_at = at;
                    position.shares
                }
                None => 0,
            });
        }

        self.total_shares += shares;
        let position = self.accounts.entry(*account).or_insert(ShareAccount {
            shares: 0,
            last_deposit_at: at,
        });
        position.shares += shares;
        position.last_deposit_at = at;
        Ok(position.shares)
    }

    /// Checks that burning `shares` from `account` would succeed, without
    /// changing anything.
    ///
    /// # Errors
    ///
    /// Returns [`ShareError::InsufficientBalance`] if the account holds fewer
    /// than `shares`.
    pub fn check_burn(&self, account: &AccountId, shares: u64) -> Result<(), ShareError> {
        let available = self.balance_of(account);
        if shares > available {
            return Err(ShareError::InsufficientBalance {
                account: *account,
                available,
                requested: shares,
            });
        }
        Ok(())
    }

    /// Debits `shares` from `account` and from the pool total.
    ///
    /// Returns the account's remaining balance. An account burned down to
    /// zero is forgotten, deposit time included.
    ///
    /// # Errors
    ///
    /// Returns [`ShareError::InsufficientBalance`] if the account holds fewer
    /// than `shares`. Nothing is burned in that case.
    pub fn burn_shares(&mut self, account: &AccountId, shares: u64) -> Result<u64, ShareError> {
        self.check_burn(account, shares)?;
        if shares == 0 {
            return Ok(self.balance_of(account));
        }

        let remaining = match self.accounts.get_mut(account) {
            Some(position) => {
                position.shares -= shares;
                position.shares
            }
            None => 0,
        };
        if remaining == 0 {
            self.accounts.remove(account);
        }
        self.total_shares -= shares;
        Ok(remaining)
    }

    /// Verifies the ledger's structural invariants:
    ///
    /// - the sum of all balances equals the pool total;
    /// - no tracked account has a zero balance;
    /// - the pool total is zero exactly when nobody holds shares.
    ///
    /// # Errors
    ///
    /// Returns [`ShareError::InvariantViolation`] describing the first
    /// broken invariant.
    pub fn check_invariants(&self) -> Result<(), ShareError> {
        let mut sum: u128 = 0;
        for (id, position) in &self.accounts {
            if position.shares == 0 {
                return Err(ShareError::InvariantViolation(format!(
                    "account {} tracked with zero shares",
                    id
                )));
            }
            sum += position.shares as u128;
        }
        if sum != self.total_shares as u128 {
            return Err(ShareError::InvariantViolation(format!(
                "balances sum to {} but total shares is {}",
                sum, self.total_shares
            )));
        }
        if (self.total_shares == 0) != self.accounts.is_empty() {
            return Err(ShareError::InvariantViolation(format!(
                "total shares {} with {} holders",
                self.total_shares,
                self.accounts.len()
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn id(label: &str) -> AccountId {
        AccountId::from_label(label)
    }

    // -- conversion math ----------------------------------------------------

    #[test]
    fn empty_pool_mints_one_to_one() {
        assert_eq!(shares_for_deposit(100, 0, 0).unwrap(), 100);
        assert_eq!(shares_for_deposit(7, 0, 500).unwrap(), 7);
    }

    #[test]
    fn drained_pool_mints_one_to_one() {
        // Shares outstanding but nothing backing them.
        assert_eq!(shares_for_deposit(40, 30, 0).unwrap(), 40);
    }

    #[test]
    fn deposit_uses_current_rate() {
        // 30 shares backed by 50 assets: 10 assets buy floor(10*30/50) = 6.
        assert_eq!(shares_for_deposit(10, 30, 50).unwrap(), 6);
    }

    #[test]
    fn deposit_rounds_down() {
        // 1 * 3 / 2 = 1.5 -> 1
        assert_eq!(shares_for_deposit(1, 3, 2).unwrap(), 1);
        // Dust deposit into an expensive pool mints nothing.
        assert_eq!(shares_for_deposit(1, 10, 100).unwrap(), 0);
    }

    #[test]
    fn redeem_uses_current_rate() {
        // 5 shares of a 36-share pool holding 60 assets: floor(300/36) = 8.
        assert_eq!(assets_for_shares(5, 36, 60).unwrap(), 8);
    }

    #[test]
    fn redeem_against_empty_pool_is_undefined() {
        assert_eq!(assets_for_shares(5, 0, 60), Err(ShareError::DivisionUndefined));
        assert_eq!(assets_for_shares(0, 0, 0), Err(ShareError::DivisionUndefined));
    }

    #[test]
    fn large_products_do_not_overflow() {
        let big = u64::MAX / 2;
        assert_eq!(shares_for_deposit(big, big, big).unwrap(), big);
        assert_eq!(assets_for_shares(big, big, big).unwrap(), big);
    }

    #[test]
    fn oversized_quotient_is_overflow() {
        assert_eq!(
            shares_for_deposit(u64::MAX, u64::MAX, 1),
            Err(ShareError::Overflow)
        );
    }

    #[test]
    fn full_redemption_never_exceeds_pool() {
        for (shares, assets) in [(3u64, 10u64), (7, 3), (1, 1), (999, 1_000_003)] {
            let out = assets_for_shares(shares, shares, assets).unwrap();
            assert_eq!(out, assets);
        }
    }

    // -- bookkeeping --------------------------------------------------------

    #[test]
    fn mint_creates_position() {
        let mut ledger = ShareLedger::new();
        let balance = ledger.mint_shares(&id("alice"), 20, t(0)).unwrap();
        assert_eq!(balance, 20);
        assert_eq!(ledger.total_shares(), 20);
        assert_eq!(ledger.last_deposit_at(&id("alice")), Some(t(0)));
        ledger.check_invariants().unwrap();
    }

    #[test]
    fn mint_overwrites_deposit_time() {
        let mut ledger = ShareLedger::new();
        ledger.mint_shares(&id("alice"), 20, t(0)).unwrap();
        ledger.mint_shares(&id("alice"), 6, t(100)).unwrap();
        assert_eq!(ledger.balance_of(&id("alice")), 26);
        assert_eq!(ledger.last_deposit_at(&id("alice")), Some(t(100)));
    }

    #[test]
    fn zero_mint_refreshes_existing_holder_only() {
        let mut ledger = ShareLedger::new();
        ledger.mint_shares(&id("alice"), 10, t(0)).unwrap();
        ledger.mint_shares(&id("alice"), 0, t(50)).unwrap();
        assert_eq!(ledger.last_deposit_at(&id("alice")), Some(t(50)));

        ledger.mint_shares(&id("bob"), 0, t(50)).unwrap();
        assert!(ledger.account(&id("bob")).is_none());
        ledger.check_invariants().unwrap();
    }

    #[test]
    fn mint_overflow_rejected_without_change() {
        let mut ledger = ShareLedger::new();
        ledger.mint_shares(&id("alice"), u64::MAX, t(0)).unwrap();
        assert_eq!(
            ledger.mint_shares(&id("bob"), 1, t(1)),
            Err(ShareError::Overflow)
        );
        assert_eq!(ledger.balance_of(&id("bob")), 0);
        assert_eq!(ledger.total_shares(), u64::MAX);
    }

    #[test]
    fn burn_reduces_both_balances() {
        let mut ledger = ShareLedger::new();
        ledger.mint_shares(&id("bob"), 10, t(0)).unwrap();
        let remaining = ledger.burn_shares(&id("bob"), 5).unwrap();
        assert_eq!(remaining, 5);
        assert_eq!(ledger.total_shares(), 5);
        ledger.check_invariants().unwrap();
    }

    #[test]
    fn burn_more_than_balance_rejected() {
        let mut ledger = ShareLedger::new();
        ledger.mint_shares(&id("alice"), 100, t(0)).unwrap();
        let err = ledger.burn_shares(&id("alice"), 200).unwrap_err();
        assert!(matches!(
            err,
            ShareError::InsufficientBalance {
                available: 100,
                requested: 200,
                ..
            }
        ));
        assert_eq!(ledger.balance_of(&id("alice")), 100);
        assert_eq!(ledger.total_shares(), 100);
    }

    #[test]
    fn burn_to_zero_forgets_account() {
        let mut ledger = ShareLedger::new();
        ledger.mint_shares(&id("alice"), 100, t(0)).unwrap();
        ledger.burn_shares(&id("alice"), 100).unwrap();
        assert_eq!(ledger.holder_count(), 0);
        assert_eq!(ledger.total_shares(), 0);
        assert_eq!(ledger.last_deposit_at(&id("alice")), None);
        ledger.check_invariants().unwrap();
    }

    #[test]
    fn burn_from_stranger_rejected() {
        let mut ledger = ShareLedger::new();
        assert!(ledger.burn_shares(&id("mallory"), 1).is_err());
        assert_eq!(ledger.burn_shares(&id("mallory"), 0).unwrap(), 0);
    }

    #[test]
    fn invariants_hold_across_mixed_activity() {
        let mut ledger = ShareLedger::new();
        let start = t(0);
        for (i, who) in ["a", "b", "c", "d"].iter().enumerate() {
            ledger
                .mint_shares(&id(who), (i as u64 + 1) * 10, start + Duration::hours(i as i64))
                .unwrap();
        }
        ledger.burn_shares(&id("b"), 20).unwrap();
        ledger.burn_shares(&id("c"), 7).unwrap();
        ledger.mint_shares(&id("b"), 3, start).unwrap();
        ledger.check_invariants().unwrap();
        let sum: u64 = ledger.holders().map(|(_, p)| p.shares).sum();
        assert_eq!(sum, ledger.total_shares());
    }

    #[test]
    fn snapshot_roundtrips_through_json() {
        let mut ledger = ShareLedger::new();
        ledger.mint_shares(&id("alice"), 26, t(10)).unwrap();
        ledger.mint_shares(&id("bob"), 5, t(20)).unwrap();

        let json = serde_json::to_string(&ledger).expect("serialize");
        let recovered: ShareLedger = serde_json::from_str(&json).expect("deserialize");

        assert_eq!(recovered.total_shares(), 31);
        assert_eq!(recovered.balance_of(&id("alice")), 26);
        assert_eq!(recovered.last_deposit_at(&id("bob")), Some(t(20)));
    }
}
