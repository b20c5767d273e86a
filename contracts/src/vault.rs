//! # Vault Controller
//!
//! Orchestrates the two operations a depositor can perform:
//!
//! 1. **Enter**: pull `amount` of the underlying asset from the caller,
//!    price it against the pool as it stood *before* the pull, mint the
//!    resulting shares, stamp the caller's deposit time.
//! 2. **Leave**: check the caller holds the shares, price them against the
//!    current pool, run the penalty gate, pay out the untaxed part, burn the
//!    shares. The tax never leaves the vault.
//!
//! Both are all-or-nothing. Every check that can fail runs before the first
//! mutation, and the only fallible mutation (the ledger call) runs before
//! any share bookkeeping changes.
//!
//! The vault does not own the asset ledger. Callers pass it in on every
//! operation, which lets the same ledger see direct transfers (yield) that
//! bypass the vault entirely.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use stakebar_protocol::clock::Clock;
use stakebar_protocol::identity::AccountId;
use stakebar_protocol::ledger::{AssetLedger, LedgerError};
use thiserror::Error;
use uuid::Uuid;

use crate::penalty_policy::{PenaltyError, PenaltyPolicy, PolicyConfig};
use crate::share_ledger::{self, ShareError, ShareLedger};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// What a balance error was counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceUnit {
    /// The underlying asset, on the external ledger.
    Asset,
    /// Vault shares.
    Shares,
}

impl std::fmt::Display for BalanceUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BalanceUnit::Asset => write!(f, "asset"),
            BalanceUnit::Shares => write!(f, "shares"),
        }
    }
}

/// Errors that can occur during vault operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VaultError {
    /// The caller has not approved the vault to pull enough of the asset.
    #[error("insufficient allowance: approved {allowed}, requested {requested}")]
    InsufficientAllowance {
        /// Allowance the caller granted the vault.
        allowed: u64,
        /// Amount the vault tried to pull.
        requested: u64,
    },

    /// The caller lacks the asset (on enter) or the shares (on leave).
    #[error("insufficient {unit} balance: available {available}, requested {requested}")]
    InsufficientBalance {
        /// Which balance fell short.
        unit: BalanceUnit,
        /// What the caller holds.
        available: u64,
        /// What the operation needed.
        requested: u64,
    },

    /// Redeeming against a pool with no shares outstanding.
    #[error("division undefined: pool has zero total shares")]
    DivisionUndefined,

    /// The penalty schedule does not allow this redemption yet.
    #[error(
        "unable to unstake at this time: tier {tier} allows {max_withdraw_percent}% \
         ({requested} of {balance} shares requested)"
    )]
    PenaltyGateViolation {
        /// Tier the caller is currently in.
        tier: usize,
        /// Shares requested.
        requested: u64,
        /// Shares held.
        balance: u64,
        /// Cap for the tier, in percent.
        max_withdraw_percent: u8,
    },

    /// A share count, supply or balance would overflow.
    #[error("arithmetic overflow")]
    ArithmeticOverflow,

    /// The vault was asked to deposit into or redeem from itself.
    #[error("the vault account cannot enter or leave itself")]
    SelfDealing,

    /// The configured penalty schedule is malformed.
    #[error("invalid penalty policy: {0}")]
    InvalidPolicy(String),

    /// Share bookkeeping no longer balances. Indicates a bug, not bad input.
    #[error("share ledger invariant violated: {0}")]
    Invariant(String),
}

impl VaultError {
    /// Stable machine-readable error kind for API responses and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            VaultError::InsufficientAllowance { .. } => "insufficient_allowance",
            VaultError::InsufficientBalance { .. } => "insufficient_balance",
            VaultError::DivisionUndefined => "division_undefined",
            VaultError::PenaltyGateViolation { .. } => "penalty_gate_violation",
            VaultError::ArithmeticOverflow => "arithmetic_overflow",
            VaultError::SelfDealing => "self_dealing",
            VaultError::InvalidPolicy(_) => "invalid_policy",
            VaultError::Invariant(_) => "invariant",
        }
    }
}

impl From<LedgerError> for VaultError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientAllowance { allowed, requested } => {
                VaultError::InsufficientAllowance { allowed, requested }
            }
            LedgerError::InsufficientBalance {
                available,
                requested,
            } => VaultError::InsufficientBalance {
                unit: BalanceUnit::Asset,
                available,
                requested,
            },
            LedgerError::Overflow { .. } => VaultError::ArithmeticOverflow,
        }
    }
}

impl From<ShareError> for VaultError {
    fn from(err: ShareError) -> Self {
        match err {
            ShareError::DivisionUndefined => VaultError::DivisionUndefined,
            ShareError::InsufficientBalance {
                available,
                requested,
                ..
            } => VaultError::InsufficientBalance {
                unit: BalanceUnit::Shares,
                available,
                requested,
            },
            ShareError::Overflow => VaultError::ArithmeticOverflow,
            ShareError::InvariantViolation(msg) => VaultError::Invariant(msg),
        }
    }
}

impl From<PenaltyError> for VaultError {
    fn from(err: PenaltyError) -> Self {
        match err {
            PenaltyError::GateViolation {
                tier,
                requested,
                balance,
                max_withdraw_percent,
            } => VaultError::PenaltyGateViolation {
                tier,
                requested,
                balance,
                max_withdraw_percent,
            },
            PenaltyError::InvalidSchedule(msg) => VaultError::InvalidPolicy(msg),
        }
    }
}

// ---------------------------------------------------------------------------
// Receipts & Views
// ---------------------------------------------------------------------------

/// Record of a committed `enter`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnterReceipt {
    /// Unique identifier for this operation.
    pub receipt_id: Uuid,
    /// Depositor.
    pub account: AccountId,
    /// Asset units pulled into the vault.
    pub assets_in: u64,
    /// Shares minted to the depositor.
    pub shares_minted: u64,
    /// Depositor's share balance afterwards.
    pub share_balance: u64,
    /// Pool shares afterwards.
    pub total_shares: u64,
    /// Vault asset balance afterwards.
    pub total_assets: u64,
    /// When the deposit happened; the depositor's new deposit time.
    pub at: DateTime<Utc>,
}

/// Priced, penalty-checked redemption that has not been executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveQuote {
    /// Shares to burn.
    pub shares: u64,
    /// Asset value of those shares at the current rate.
    pub gross_assets: u64,
    /// Portion of `gross_assets` retained by the vault.
    pub tax: u64,
    /// Portion of `gross_assets` paid to the redeemer.
    pub net_assets: u64,
    /// Tax rate applied, in percent.
    pub tax_percent: u8,
    /// Penalty tier the redeemer is in.
    pub tier: usize,
}

/// Record of a committed `leave`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveReceipt {
    /// Unique identifier for this operation.
    pub receipt_id: Uuid,
    /// Redeemer.
    pub account: AccountId,
    /// Shares burned.
    pub shares_burned: u64,
    /// Asset value of the burned shares.
    pub gross_assets: u64,
    /// Retained by the vault.
    pub tax: u64,
    /// Paid to the redeemer.
    pub net_assets: u64,
    /// Tax rate applied, in percent.
    pub tax_percent: u8,
    /// Redeemer's share balance afterwards.
    pub share_balance: u64,
    /// Pool shares afterwards.
    pub total_shares: u64,
    /// Vault asset balance afterwards.
    pub total_assets: u64,
    /// When the redemption happened.
    pub at: DateTime<Utc>,
}

/// Assets backing a quantity of shares, kept as a ratio so nothing is lost
/// to floating point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRate {
    /// Vault asset balance.
    pub assets: u64,
    /// Shares outstanding.
    pub shares: u64,
}

impl ExchangeRate {
    /// Assets per share as a float, for display only. `None` for an empty pool.
    pub fn as_f64(&self) -> Option<f64> {
        if self.shares == 0 {
            None
        } else {
            Some(self.assets as f64 / self.shares as f64)
        }
    }
}

/// Point-in-time view of the pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultSnapshot {
    /// The vault's account on the asset ledger.
    pub address: AccountId,
    /// Shares outstanding.
    pub total_shares: u64,
    /// Vault asset balance.
    pub total_assets: u64,
    /// Accounts holding shares.
    pub holders: usize,
    /// Active penalty policy.
    pub policy: PolicyConfig,
}

// ---------------------------------------------------------------------------
// Vault
// ---------------------------------------------------------------------------

/// A share-based staking vault over one underlying asset.
pub struct Vault {
    address: AccountId,
    shares: ShareLedger,
    policy: Box<dyn PenaltyPolicy>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("address", &self.address)
            .field("total_shares", &self.shares.total_shares())
            .field("holders", &self.shares.holder_count())
            .field("policy", &self.policy)
            .finish()
    }
}

impl Vault {
    /// Creates an empty vault that holds its assets under `address`.
    pub fn new(address: AccountId, policy: Box<dyn PenaltyPolicy>, clock: Arc<dyn Clock>) -> Self {
        Self {
            address,
            shares: ShareLedger::new(),
            policy,
            clock,
        }
    }

    /// Creates an empty vault with the policy described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidPolicy`] if the schedule fails validation.
    pub fn from_config(
        address: AccountId,
        config: &PolicyConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, VaultError> {
        Ok(Self::new(address, config.build()?, clock))
    }

    /// Restores a vault around existing share bookkeeping.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Invariant`] if `shares` does not balance.
    pub fn with_shares(
        address: AccountId,
        shares: ShareLedger,
        policy: Box<dyn PenaltyPolicy>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, VaultError> {
        shares.check_invariants()?;
        Ok(Self {
            address,
            shares,
            policy,
            clock,
        })
    }

    /// The vault's own account on the asset ledger.
    pub fn address(&self) -> &AccountId {
        &self.address
    }

    /// Read-only access to the share bookkeeping.
    pub fn share_ledger(&self) -> &ShareLedger {
        &self.shares
    }

    /// The active penalty policy's configuration.
    pub fn policy(&self) -> PolicyConfig {
        self.policy.config()
    }

    /// Shares held by `account`.
    pub fn balance_of(&self, account: &AccountId) -> u64 {
        self.shares.balance_of(account)
    }

    /// Shares outstanding.
    pub fn total_shares(&self) -> u64 {
        self.shares.total_shares()
    }

    /// Underlying asset held by the vault. Queried from the ledger, never cached.
    pub fn total_assets<L: AssetLedger + ?Sized>(&self, ledger: &L) -> u64 {
        ledger.balance_of(&self.address)
    }

    /// When `account` last entered, if it holds shares.
    pub fn last_deposit_at(&self, account: &AccountId) -> Option<DateTime<Utc>> {
        self.shares.last_deposit_at(account)
    }

    /// Current assets-per-share ratio.
    pub fn exchange_rate<L: AssetLedger + ?Sized>(&self, ledger: &L) -> ExchangeRate {
        ExchangeRate {
            assets: self.total_assets(ledger),
            shares: self.total_shares(),
        }
    }

    /// Point-in-time view of the pool.
    pub fn snapshot<L: AssetLedger + ?Sized>(&self, ledger: &L) -> VaultSnapshot {
        VaultSnapshot {
            address: self.address,
            total_shares: self.total_shares(),
            total_assets: self.total_assets(ledger),
            holders: self.shares.holder_count(),
            policy: self.policy(),
        }
    }

    /// Shares `enter(amount)` would mint right now.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::ArithmeticOverflow`] if the share count would
    /// not fit in `u64`.
    pub fn preview_enter<L: AssetLedger + ?Sized>(
        &self,
        ledger: &L,
        amount: u64,
    ) -> Result<u64, VaultError> {
        let shares = share_ledger::shares_for_deposit(
            amount,
            self.total_shares(),
            self.total_assets(ledger),
        )?;
        Ok(shares)
    }

    /// Prices and penalty-checks `leave(shares)` for `account` without
    /// executing it. Fails exactly when `leave` would, short of a ledger
    /// failure on payout.
    ///
    /// # Errors
    ///
    /// See [`leave`](Self::leave).
    pub fn preview_leave<L: AssetLedger + ?Sized>(
        &self,
        ledger: &L,
        account: &AccountId,
        shares: u64,
    ) -> Result<LeaveQuote, VaultError> {
        self.quote_leave(ledger, account, shares, self.clock.now())
    }

    fn quote_leave<L: AssetLedger + ?Sized>(
        &self,
        ledger: &L,
        account: &AccountId,
        shares: u64,
        now: DateTime<Utc>,
    ) -> Result<LeaveQuote, VaultError> {
        if *account == self.address {
            return Err(VaultError::SelfDealing);
        }

        let balance = self.shares.balance_of(account);
        self.shares.check_burn(account, shares)?;

        let gross_assets = share_ledger::assets_for_shares(
            shares,
            self.total_shares(),
            self.total_assets(ledger),
        )?;

        // Shares only ever arrive through `enter`, so a holder always has a
        // deposit time. Someone holding nothing can only be asking for zero.
        let elapsed = self
            .shares
            .last_deposit_at(account)
            .map(|deposited| now - deposited)
            .unwrap_or_else(Duration::zero);
        let decision = self.policy.assess(elapsed, shares, balance)?;

        let tax = decision.tax_on(gross_assets);
        Ok(LeaveQuote {
            shares,
            gross_assets,
            tax,
            net_assets: gross_assets - tax,
            tax_percent: decision.tax_percent,
            tier: decision.tier,
        })
    }

    /// Deposits `amount` of the underlying asset for `caller`.
    ///
    /// The caller must have approved the vault to pull at least `amount`.
    /// Shares are priced against the pool before the deposit lands, so a
    /// deposit never dilutes itself. A zero deposit mints nothing but still
    /// refreshes an existing holder's deposit time.
    ///
    /// # Errors
    ///
    /// - [`VaultError::InsufficientAllowance`]: approval below `amount`.
    /// - [`VaultError::InsufficientBalance`]: caller holds less than `amount`.
    /// - [`VaultError::ArithmeticOverflow`]: shares or balances would overflow.
    /// - [`VaultError::SelfDealing`]: `caller` is the vault.
    ///
    /// Nothing changes on any error.
    pub fn enter<L: AssetLedger + ?Sized>(
        &mut self,
        ledger: &mut L,
        caller: &AccountId,
        amount: u64,
    ) -> Result<EnterReceipt, VaultError> {
        let result = self.try_enter(ledger, caller, amount);
        if let Err(e) = &result {
            tracing::warn!(account = %caller, amount, error = %e, kind = e.kind(), "enter rejected");
        }
        result
    }

    fn try_enter<L: AssetLedger + ?Sized>(
        &mut self,
        ledger: &mut L,
        caller: &AccountId,
        amount: u64,
    ) -> Result<EnterReceipt, VaultError> {
        if *caller == self.address {
            return Err(VaultError::SelfDealing);
        }

        let now = self.clock.now();
        let assets_before = self.total_assets(ledger);
        let shares_before = self.total_shares();
        let minted = share_ledger::shares_for_deposit(amount, shares_before, assets_before)?;
        self.shares.check_mint(caller, minted)?;

        tracing::debug!(
            account = %caller,
            amount,
            minted,
            total_shares = shares_before,
            total_assets = assets_before,
            "enter priced"
        );

        ledger.transfer_from(&self.address, caller, &self.address, amount)?;

        // check_mint passed above, so this cannot fail.
        let share_balance = self.shares.mint_shares(caller, minted, now)?;

        let receipt = EnterReceipt {
            receipt_id: Uuid::new_v4(),
            account: *caller,
            assets_in: amount,
            shares_minted: minted,
            share_balance,
            total_shares: self.total_shares(),
            total_assets: self.total_assets(ledger),
            at: now,
        };
        tracing::info!(
            receipt = %receipt.receipt_id,
            account = %caller,
            assets_in = amount,
            shares_minted = minted,
            total_shares = receipt.total_shares,
            total_assets = receipt.total_assets,
            "enter committed"
        );
        Ok(receipt)
    }

    /// Redeems `shares` for `caller`.
    ///
    /// # Errors
    ///
    /// - [`VaultError::InsufficientBalance`]: `shares` exceeds the caller's balance.
    /// - [`VaultError::DivisionUndefined`]: no shares outstanding at all.
    /// - [`VaultError::PenaltyGateViolation`]: too much, too soon.
    /// - [`VaultError::SelfDealing`]: `caller` is the vault.
    /// - Ledger errors from the payout, converted.
    ///
    /// Nothing changes on any error.
    pub fn leave<L: AssetLedger + ?Sized>(
        &mut self,
        ledger: &mut L,
        caller: &AccountId,
        shares: u64,
    ) -> Result<LeaveReceipt, VaultError> {
        let result = self.try_leave(ledger, caller, shares);
        if let Err(e) = &result {
            tracing::warn!(account = %caller, shares, error = %e, kind = e.kind(), "leave rejected");
        }
        result
    }

    fn try_leave<L: AssetLedger + ?Sized>(
        &mut self,
        ledger: &mut L,
        caller: &AccountId,
        shares: u64,
    ) -> Result<LeaveReceipt, VaultError> {
        let now = self.clock.now();
        let quote = self.quote_leave(ledger, caller, shares, now)?;

        tracing::debug!(
            account = %caller,
            shares,
            gross = quote.gross_assets,
            tax = quote.tax,
            tier = quote.tier,
            "leave priced"
        );

        // Pay out before burning: the transfer is the only step that can
        // still fail, and it leaves both ledgers untouched when it does.
        ledger.transfer(&self.address, caller, quote.net_assets)?;

        // check_burn passed inside quote_leave, so this cannot fail.
        let share_balance = self.shares.burn_shares(caller, shares)?;

        let receipt = LeaveReceipt {
            receipt_id: Uuid::new_v4(),
            account: *caller,
            shares_burned: shares,
            gross_assets: quote.gross_assets,
            tax: quote.tax,
            net_assets: quote.net_assets,
            tax_percent: quote.tax_percent,
            share_balance,
            total_shares: self.total_shares(),
            total_assets: self.total_assets(ledger),
            at: now,
        };
        tracing::info!(
            receipt = %receipt.receipt_id,
            account = %caller,
            shares_burned = shares,
            net_assets = receipt.net_assets,
            tax = receipt.tax,
            total_shares = receipt.total_shares,
            total_assets = receipt.total_assets,
            "leave committed"
        );
        Ok(receipt)
    }

    /// Verifies the share bookkeeping invariants.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Invariant`] on the first violation found.
    pub fn check_invariants(&self) -> Result<(), VaultError> {
        self.shares.check_invariants()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
