//! Integration tests for the time-gated early-withdrawal penalty.
//!
//! Every test deposits, moves a [`ManualClock`] forward, and checks what a
//! redemption is allowed to take and what it costs. Time is always advanced
//! one second past a tier boundary, the way a real chain would land just
//! after it.

use std::sync::Arc;

use chrono::Duration;
use stakebar_contracts::{PenaltyTier, PolicyConfig, TieredPenalty, Vault, VaultError};
use stakebar_protocol::clock::ManualClock;
use stakebar_protocol::identity::AccountId;
use stakebar_protocol::ledger::{AssetLedger, TokenLedger};

struct Harness {
    vault: Vault,
    ledger: TokenLedger,
    clock: ManualClock,
}

impl Harness {
    /// Tiered vault; `who` has deposited `amount` at t = 0.
    fn with_deposit(who: &str, amount: u64) -> Self {
        let clock = ManualClock::at_epoch();
        let vault = Vault::new(
            AccountId::from_label("bar"),
            Box::new(TieredPenalty::default_schedule()),
            Arc::new(clock.clone()),
        );
        let ledger = TokenLedger::new("SUSHI");
        let mut h = Harness {
            vault,
            ledger,
            clock,
        };
        h.fund(who, amount);
        h.enter(who, amount).unwrap();
        h
    }

    fn fund(&mut self, who: &str, amount: u64) {
        let account = acct(who);
        self.ledger.mint(&account, amount).unwrap();
        let current = self.ledger.allowance(&account, self.vault.address());
        self.ledger
            .approve(&account, self.vault.address(), current + amount);
    }

    fn enter(&mut self, who: &str, amount: u64) -> Result<u64, VaultError> {
        self.vault
            .enter(&mut self.ledger, &acct(who), amount)
            .map(|r| r.shares_minted)
    }

    fn leave(&mut self, who: &str, shares: u64) -> Result<u64, VaultError> {
        self.vault
            .leave(&mut self.ledger, &acct(who), shares)
            .map(|r| r.net_assets)
    }

    fn advance_days(&self, days: i64) {
        self.clock
            .advance(Duration::days(days) + Duration::seconds(1));
    }
}

fn acct(label: &str) -> AccountId {
    AccountId::from_label(label)
}

// ---------------------------------------------------------------------------
// Tier Table
// ---------------------------------------------------------------------------

#[test]
fn first_tier_allows_a_quarter_at_seventy_five_percent_tax() {
    let mut h = Harness::with_deposit("alice", 100);
    assert!(matches!(
        h.leave("alice", 26),
        Err(VaultError::PenaltyGateViolation { tier: 0, .. })
    ));
    assert_eq!(h.leave("alice", 25).unwrap(), 25 - 18);
}

#[test]
fn second_tier_allows_half_at_half_tax() {
    let mut h = Harness::with_deposit("alice", 100);
    h.advance_days(2);

    let err = h.leave("alice", 60).unwrap_err();
    assert!(matches!(
        err,
        VaultError::PenaltyGateViolation {
            tier: 1,
            max_withdraw_percent: 50,
            ..
        }
    ));
    assert!(err.to_string().contains("unable to unstake at this time"));
    assert_eq!(h.vault.balance_of(&acct("alice")), 100);

    assert_eq!(h.leave("alice", 50).unwrap(), 25);
    assert_eq!(h.ledger.balance_of(&acct("alice")), 25);
    assert_eq!(h.vault.balance_of(&acct("alice")), 50);
    // 25 of tax stayed behind: 75 assets back 50 shares.
    assert_eq!(h.vault.total_assets(&h.ledger), 75);
}

#[test]
fn third_tier_allows_three_quarters_at_quarter_tax() {
    let mut h = Harness::with_deposit("alice", 100);
    h.advance_days(4);
    assert!(h.leave("alice", 80).is_err());
    assert_eq!(h.leave("alice", 75).unwrap(), 75 - 18);
}

#[test]
fn full_maturity_is_untaxed() {
    let mut h = Harness::with_deposit("alice", 100);
    h.advance_days(8);
    assert_eq!(h.leave("alice", 100).unwrap(), 100);
    assert_eq!(h.vault.total_shares(), 0);
    assert_eq!(h.vault.total_assets(&h.ledger), 0);
}

#[test]
fn cap_applies_to_current_balance() {
    let mut h = Harness::with_deposit("alice", 100);
    h.advance_days(2);
    assert_eq!(h.leave("alice", 50).unwrap(), 25);
    // Half of the remaining 50 is allowed again.
    assert!(h.leave("alice", 25).is_ok());
    assert!(h.leave("alice", 25).is_err());
}

// ---------------------------------------------------------------------------
// Deposit Timer
// ---------------------------------------------------------------------------

#[test]
fn new_deposit_resets_the_timer() {
    let mut h = Harness::with_deposit("alice", 100);
    h.advance_days(8);

    h.fund("alice", 10);
    h.enter("alice", 10).unwrap();

    // Back in the first tier for the whole position.
    assert!(h.leave("alice", 100).is_err());
    assert!(h.leave("alice", 27).is_ok());
}

#[test]
fn timers_are_per_account() {
    let mut h = Harness::with_deposit("alice", 100);
    h.advance_days(6);
    h.fund("bob", 100);
    h.enter("bob", 100).unwrap();

    assert_eq!(h.leave("alice", 100).unwrap(), 100);
    assert!(h.leave("bob", 100).is_err());
}

// ---------------------------------------------------------------------------
// Redistribution
// ---------------------------------------------------------------------------

#[test]
fn tax_is_redistributed_to_remaining_holders() {
    let mut h = Harness::with_deposit("alice", 100);
    h.advance_days(8);
    h.fund("bob", 100);
    h.enter("bob", 100).unwrap();

    // Bob bails early: 25 shares worth 25, taxed 75%.
    assert_eq!(h.leave("bob", 25).unwrap(), 7);

    // 18 tokens of tax now back alice's 100 shares and bob's 75.
    assert_eq!(h.vault.total_assets(&h.ledger), 193);
    assert_eq!(h.vault.total_shares(), 175);
    let alice_value = h
        .vault
        .preview_leave(&h.ledger, &acct("alice"), 100)
        .unwrap()
        .gross_assets;
    assert_eq!(alice_value, 100 * 193 / 175);
    assert!(alice_value > 100);
}

// ---------------------------------------------------------------------------
// Custom Schedules
// ---------------------------------------------------------------------------

#[test]
fn custom_schedule_from_config() {
    let config = PolicyConfig::Tiered {
        tier_secs: 3_600,
        tiers: vec![
            PenaltyTier {
                max_withdraw_percent: 10,
                tax_percent: 90,
            },
            PenaltyTier {
                max_withdraw_percent: 100,
                tax_percent: 0,
            },
        ],
    };
    let clock = ManualClock::at_epoch();
    let mut vault =
        Vault::from_config(acct("bar"), &config, Arc::new(clock.clone())).unwrap();
    let mut ledger = TokenLedger::new("SUSHI");
    ledger.mint(&acct("alice"), 1_000).unwrap();
    ledger.approve(&acct("alice"), vault.address(), 1_000);
    vault.enter(&mut ledger, &acct("alice"), 1_000).unwrap();

    let receipt = vault.leave(&mut ledger, &acct("alice"), 100).unwrap();
    assert_eq!(receipt.tax, 90);
    assert_eq!(receipt.net_assets, 10);

    clock.advance(Duration::hours(1));
    let receipt = vault.leave(&mut ledger, &acct("alice"), 900).unwrap();
    assert_eq!(receipt.tax, 0);
    assert_eq!(vault.balance_of(&acct("alice")), 0);
}
