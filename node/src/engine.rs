//! # Devnet Engine
//!
//! One in-memory token ledger plus one vault over it. The HTTP API and the
//! scenario simulator both drive this type; neither touches the ledger or
//! the vault directly.
//!
//! The engine adds one rule of its own on top of the vault: nobody outside
//! the vault may move funds *out of* the vault account. Tokens may be sent
//! *to* it (that is how yield arrives), but the only way out is `leave`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use stakebar_contracts::{
    assets_for_shares, EnterReceipt, LeaveReceipt, PolicyConfig, Vault, VaultError, VaultSnapshot,
};
use stakebar_protocol::clock::Clock;
use stakebar_protocol::identity::{AccountId, AccountIdError};
use stakebar_protocol::ledger::{AssetLedger, LedgerError, TokenLedger};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors surfaced to API clients and scenario output.
#[derive(Debug, Error)]
pub enum EngineError {
    /// An account string was neither a label nor a valid address.
    #[error("invalid account: {0}")]
    InvalidAccount(#[from] AccountIdError),

    /// Someone other than the vault tried to spend from the vault account.
    #[error("vault funds can only leave through a share redemption")]
    VaultAccount,

    /// The vault or the ledger refused the operation.
    #[error(transparent)]
    Vault(#[from] VaultError),
}

impl EngineError {
    /// Machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::InvalidAccount(_) => "invalid_account",
            EngineError::VaultAccount => "vault_account",
            EngineError::Vault(e) => e.kind(),
        }
    }
}

impl From<LedgerError> for EngineError {
    fn from(err: LedgerError) -> Self {
        EngineError::Vault(err.into())
    }
}

/// Parse a label or `bar1...` address.
pub fn resolve_account(input: &str) -> Result<AccountId, EngineError> {
    AccountId::resolve(input).map_err(EngineError::from)
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// Everything the engine knows about one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountView {
    pub address: AccountId,
    /// Underlying asset held on the ledger.
    pub asset_balance: u64,
    /// Vault shares held.
    pub shares: u64,
    /// Asset the vault may still pull from this account.
    pub vault_allowance: u64,
    /// Current asset value of `shares`, before any early-withdrawal tax.
    pub redeemable_assets: u64,
    pub last_deposit_at: Option<DateTime<Utc>>,
}

/// Pool summary with the ledger's token symbol and a display rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolView {
    pub symbol: String,
    #[serde(flatten)]
    pub snapshot: VaultSnapshot,
    /// Assets per share. `None` while the pool is empty.
    pub assets_per_share: Option<f64>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// A token ledger and the vault that stakes it.
#[derive(Debug)]
pub struct Engine {
    ledger: TokenLedger,
    vault: Vault,
}

impl Engine {
    /// Fresh ledger with no supply and an empty vault at `vault_address`.
    pub fn new(
        symbol: &str,
        vault_address: AccountId,
        policy: &PolicyConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, EngineError> {
        let vault = Vault::from_config(vault_address, policy, clock)?;
        tracing::info!(
            symbol,
            vault = %vault_address,
            policy = policy.name(),
            "engine initialized"
        );
        Ok(Self {
            ledger: TokenLedger::new(symbol),
            vault,
        })
    }

    pub fn vault(&self) -> &Vault {
        &self.vault
    }

    /// Faucet. Minting straight to the vault account is how a devnet
    /// simulates yield.
    pub fn mint(&mut self, account: &AccountId, amount: u64) -> Result<AccountView, EngineError> {
        self.ledger.mint(account, amount)?;
        Ok(self.account(account))
    }

    /// Sets `owner`'s allowance for `spender`. Returns the new allowance.
    pub fn approve(
        &mut self,
        owner: &AccountId,
        spender: &AccountId,
        amount: u64,
    ) -> Result<u64, EngineError> {
        self.guard_vault_funds(owner)?;
        self.ledger.approve(owner, spender, amount);
        Ok(self.ledger.allowance(owner, spender))
    }

    /// Plain transfer. Sending to the vault account donates to the pool.
    pub fn transfer(
        &mut self,
        from: &AccountId,
        to: &AccountId,
        amount: u64,
    ) -> Result<(AccountView, AccountView), EngineError> {
        self.guard_vault_funds(from)?;
        self.ledger.transfer(from, to, amount)?;
        Ok((self.account(from), self.account(to)))
    }

    pub fn enter(&mut self, account: &AccountId, amount: u64) -> Result<EnterReceipt, EngineError> {
        self.vault
            .enter(&mut self.ledger, account, amount)
            .map_err(EngineError::from)
    }

    pub fn leave(&mut self, account: &AccountId, shares: u64) -> Result<LeaveReceipt, EngineError> {
        self.vault
            .leave(&mut self.ledger, account, shares)
            .map_err(EngineError::from)
    }

    pub fn account(&self, account: &AccountId) -> AccountView {
        let shares = self.vault.balance_of(account);
        // Holding shares implies a non-empty pool, so this only falls back
        // to zero for accounts with no position.
        let redeemable_assets = assets_for_shares(
            shares,
            self.vault.total_shares(),
            self.vault.total_assets(&self.ledger),
        )
        .unwrap_or(0);

        AccountView {
            address: *account,
            asset_balance: self.ledger.balance_of(account),
            shares,
            vault_allowance: self.ledger.allowance(account, self.vault.address()),
            redeemable_assets,
            last_deposit_at: self.vault.last_deposit_at(account),
        }
    }

    pub fn pool(&self) -> PoolView {
        PoolView {
            symbol: self.ledger.symbol().to_string(),
            snapshot: self.vault.snapshot(&self.ledger),
            assets_per_share: self.vault.exchange_rate(&self.ledger).as_f64(),
        }
    }

    fn guard_vault_funds(&self, owner: &AccountId) -> Result<(), EngineError> {
        if owner == self.vault.address() {
            tracing::warn!(vault = %owner, "rejected direct spend from vault account");
            return Err(EngineError::VaultAccount);
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
    use stakebar_protocol::clock::ManualClock;

    fn engine(policy: PolicyConfig) -> Engine {
        Engine::new(
            "SUSHI",
            AccountId::from_label("bar"),
            &policy,
            Arc::new(ManualClock::at_epoch()),
        )
        .unwrap()
    }

    fn id(label: &str) -> AccountId {
        AccountId::from_label(label)
    }

    #[test]
    fn account_view_tracks_position() {
        let mut e = engine(PolicyConfig::None);
        let vault = *e.vault().address();
        e.mint(&id("alice"), 100).unwrap();
        e.approve(&id("alice"), &vault, 60).unwrap();
        e.enter(&id("alice"), 40).unwrap();
        e.mint(&vault, 20).unwrap();

        let view = e.account(&id("alice"));
        assert_eq!(view.asset_balance, 60);
        assert_eq!(view.shares, 40);
        assert_eq!(view.vault_allowance, 20);
        assert_eq!(view.redeemable_assets, 60);
        assert!(view.last_deposit_at.is_some());
    }

    #[test]
    fn unknown_account_is_all_zero() {
        let e = engine(PolicyConfig::None);
        let view = e.account(&id("nobody"));
        assert_eq!(view.asset_balance, 0);
        assert_eq!(view.shares, 0);
        assert_eq!(view.redeemable_assets, 0);
        assert_eq!(view.last_deposit_at, None);
    }

    #[test]
    fn vault_account_cannot_spend_directly() {
        let mut e = engine(PolicyConfig::None);
        let vault = *e.vault().address();
        e.mint(&vault, 50).unwrap();

        let err = e.transfer(&vault, &id("mallory"), 50).unwrap_err();
        assert_eq!(err.kind(), "vault_account");
        let err = e.approve(&vault, &id("mallory"), 50).unwrap_err();
        assert_eq!(err.kind(), "vault_account");
        assert_eq!(e.account(&vault).asset_balance, 50);
    }

    #[test]
    fn transfer_to_vault_is_a_donation() {
        let mut e = engine(PolicyConfig::None);
        let vault = *e.vault().address();
        e.mint(&id("alice"), 10).unwrap();
        e.approve(&id("alice"), &vault, 10).unwrap();
        e.enter(&id("alice"), 10).unwrap();
        e.mint(&id("carol"), 5).unwrap();

        e.transfer(&id("carol"), &vault, 5).unwrap();
        let pool = e.pool();
        assert_eq!(pool.snapshot.total_assets, 15);
        assert_eq!(pool.snapshot.total_shares, 10);
        assert_eq!(pool.assets_per_share, Some(1.5));
    }

    #[test]
    fn ledger_errors_keep_their_kind() {
        let mut e = engine(PolicyConfig::None);
        let err = e.transfer(&id("alice"), &id("bob"), 1).unwrap_err();
        assert_eq!(err.kind(), "insufficient_balance");
        let err = e.enter(&id("alice"), 1).unwrap_err();
        assert_eq!(err.kind(), "insufficient_allowance");
    }

    #[test]
    fn bad_address_is_rejected() {
        let err = resolve_account("bar1notanaddress").unwrap_err();
        assert_eq!(err.kind(), "invalid_account");
        assert_eq!(resolve_account("alice").unwrap(), id("alice"));
    }

    #[test]
    fn empty_pool_has_no_rate() {
        let e = engine(PolicyConfig::default());
        let pool = e.pool();
        assert_eq!(pool.symbol, "SUSHI");
        assert_eq!(pool.assets_per_share, None);
        assert_eq!(pool.snapshot.policy.name(), "tiered");
    }
}
