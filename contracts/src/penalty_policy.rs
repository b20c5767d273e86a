//! # Early-Withdrawal Penalty Policy
//!
//! Decides whether a redemption may go ahead and how much of it is taxed,
//! as a pure function of two inputs:
//!
//! - time elapsed since the account's last deposit, and
//! - the fraction of the account's shares being redeemed.
//!
//! ## Tiered Schedule
//!
//! The default schedule uses 2-day tiers:
//!
//! ```text
//! elapsed         max fraction   tax
//! [0d, 2d)        25%            75%
//! [2d, 4d)        50%            50%
//! [4d, 6d)        75%            25%
//! [6d, ...)       100%           0%
//! ```
//!
//! Lower bounds are inclusive. A redemption above the current cap is
//! refused outright; it is never trimmed down to the cap. The tax is
//! charged on the redemption's asset value and stays in the vault, which
//! raises the exchange rate for everyone still holding shares.

use std::fmt;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use stakebar_protocol::config::{
    DEFAULT_PENALTY_SCHEDULE, MAX_PENALTY_TIER_SECS, PENALTY_TIER_SECS, PERCENT_DENOMINATOR,
};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while assessing a redemption or building a policy.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PenaltyError {
    /// The requested fraction is above the cap for the current tier.
    #[error(
        "unable to unstake at this time: requested {requested} of {balance} shares, \
         tier {tier} allows at most {max_withdraw_percent}%"
    )]
    GateViolation {
        /// Index of the tier the account is currently in.
        tier: usize,
        /// Shares the caller asked to redeem.
        requested: u64,
        /// Shares the caller holds.
        balance: u64,
        /// Cap for this tier, in percent of `balance`.
        max_withdraw_percent: u8,
    },

    /// A tiered schedule failed validation.
    #[error("invalid penalty schedule: {0}")]
    InvalidSchedule(String),
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One row of a tiered schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PenaltyTier {
    /// Largest share of the account's balance that may be redeemed, in percent.
    pub max_withdraw_percent: u8,
    /// Portion of the redeemed asset value kept by the vault, in percent.
    pub tax_percent: u8,
}

/// The outcome of a permitted redemption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PenaltyDecision {
    /// Tier the account is in. Always 0 under [`NoPenalty`].
    pub tier: usize,
    /// Tax rate to apply, in percent.
    pub tax_percent: u8,
    /// Cap that was checked, in percent.
    pub max_withdraw_percent: u8,
    /// `true` once the account has reached the untaxed, uncapped tier.
    pub matured: bool,
}

impl PenaltyDecision {
    /// A decision that lets everything through untaxed.
    pub const fn free() -> Self {
        Self {
            tier: 0,
            tax_percent: 0,
            max_withdraw_percent: 100,
            matured: true,
        }
    }

    /// Tax owed on `assets`: `floor(assets * tax_percent / 100)`.
    pub fn tax_on(&self, assets: u64) -> u64 {
        tax_on(assets, self.tax_percent)
    }
}

/// `floor(assets * percent / 100)`. Never exceeds `assets` for
/// `percent <= 100`.
pub fn tax_on(assets: u64, percent: u8) -> u64 {
    let tax = (assets as u128) * (percent as u128) / (PERCENT_DENOMINATOR as u128);
    // percent <= 100 keeps this within u64; clamp rather than trust it.
    u64::try_from(tax).unwrap_or(assets).min(assets)
}

// ---------------------------------------------------------------------------
// PenaltyPolicy
// ---------------------------------------------------------------------------

/// Gatekeeper for redemptions.
pub trait PenaltyPolicy: fmt::Debug + Send + Sync {
    /// Assess a redemption of `requested` shares out of a balance of
    /// `balance`, `elapsed` after the account's last deposit.
    ///
    /// # Errors
    ///
    /// Returns [`PenaltyError::GateViolation`] when the redemption is not
    /// allowed right now.
    fn assess(
        &self,
        elapsed: Duration,
        requested: u64,
        balance: u64,
    ) -> Result<PenaltyDecision, PenaltyError>;

    /// The configuration that reproduces this policy.
    fn config(&self) -> PolicyConfig;
}

/// Always permits, never taxes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPenalty;

impl PenaltyPolicy for NoPenalty {
    fn assess(
        &self,
        _elapsed: Duration,
        _requested: u64,
        _balance: u64,
    ) -> Result<PenaltyDecision, PenaltyError> {
        Ok(PenaltyDecision::free())
    }

    fn config(&self) -> PolicyConfig {
        PolicyConfig::None
    }
}

/// Time-gated tiered schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TieredPenalty {
    tier_secs: u64,
    tiers: Vec<PenaltyTier>,
}

impl TieredPenalty {
    /// Builds a schedule from `tiers`, each `tier_secs` wide.
    ///
    /// # Errors
    ///
    /// Returns [`PenaltyError::InvalidSchedule`] unless all of these hold:
    /// `0 < tier_secs <= MAX_PENALTY_TIER_SECS`; at least one tier; every
    /// percent is `<= 100`; caps never shrink and taxes never grow from one
    /// tier to the next; the last tier allows 100%.
    pub fn new(tier_secs: u64, tiers: Vec<PenaltyTier>) -> Result<Self, PenaltyError> {
        if tier_secs == 0 {
            return Err(PenaltyError::InvalidSchedule(
                "tier width must be positive".into(),
            ));
        }
        if tier_secs > MAX_PENALTY_TIER_SECS {
            return Err(PenaltyError::InvalidSchedule(format!(
                "tier width {}s exceeds the {}s limit",
                tier_secs, MAX_PENALTY_TIER_SECS
            )));
        }
        let last = tiers
            .last()
            .ok_or_else(|| PenaltyError::InvalidSchedule("schedule has no tiers".into()))?;
        if last.max_withdraw_percent != 100 {
            return Err(PenaltyError::InvalidSchedule(format!(
                "final tier must allow 100%, allows {}%",
                last.max_withdraw_percent
            )));
        }
        for (i, tier) in tiers.iter().enumerate() {
            if tier.max_withdraw_percent > 100 || tier.tax_percent > 100 {
                return Err(PenaltyError::InvalidSchedule(format!(
                    "tier {} has a percentage above 100",
                    i
                )));
            }
        }
        for (i, pair) in tiers.windows(2).enumerate() {
            if pair[1].max_withdraw_percent < pair[0].max_withdraw_percent {
                return Err(PenaltyError::InvalidSchedule(format!(
                    "tier {} cap is lower than tier {}",
                    i + 1,
                    i
                )));
            }
            if pair[1].tax_percent > pair[0].tax_percent {
                return Err(PenaltyError::InvalidSchedule(format!(
                    "tier {} tax is higher than tier {}",
                    i + 1,
                    i
                )));
            }
        }
        Ok(Self { tier_secs, tiers })
    }

    /// The 2-day, four-tier schedule from the protocol config.
    pub fn default_schedule() -> Self {
        Self {
            tier_secs: PENALTY_TIER_SECS,
            tiers: DEFAULT_PENALTY_SCHEDULE
                .iter()
                .map(|&(max_withdraw_percent, tax_percent)| PenaltyTier {
                    max_withdraw_percent,
                    tax_percent,
                })
                .collect(),
        }
    }

    /// Width of one tier.
    pub fn tier_duration(&self) -> Duration {
        // Range-checked in `new`.
        Duration::seconds(self.tier_secs as i64)
    }

    /// Time from deposit until the final tier applies.
    pub fn maturity(&self) -> Duration {
        let tiers = self.tiers.len().saturating_sub(1) as u64;
        // chrono's own upper bound on a Duration built from seconds.
        let secs = self.tier_secs.saturating_mul(tiers).min(i64::MAX as u64 / 1_000);
        Duration::seconds(secs as i64)
    }

    /// The schedule rows.
    pub fn tiers(&self) -> &[PenaltyTier] {
        &self.tiers
    }

    /// Tier index for `elapsed`. Negative elapsed time (a clock that went
    /// backwards) counts as tier 0.
    pub fn tier_index(&self, elapsed: Duration) -> usize {
        let secs = elapsed.num_seconds();
        if secs <= 0 {
            return 0;
        }
        let idx = (secs as u64) / self.tier_secs;
        usize::try_from(idx)
            .unwrap_or(usize::MAX)
            .min(self.tiers.len() - 1)
    }
}

impl Default for TieredPenalty {
    fn default() -> Self {
        Self::default_schedule()
    }
}

impl PenaltyPolicy for TieredPenalty {
    fn assess(
        &self,
        elapsed: Duration,
        requested: u64,
        balance: u64,
    ) -> Result<PenaltyDecision, PenaltyError> {
        let tier = self.tier_index(elapsed);
        let row = self.tiers[tier];

        // requested / balance <= cap / 100, cross-multiplied.
        let lhs = (requested as u128) * (PERCENT_DENOMINATOR as u128);
        let rhs = (balance as u128) * (row.max_withdraw_percent as u128);
        if lhs > rhs {
            return Err(PenaltyError::GateViolation {
                tier,
                requested,
                balance,
                max_withdraw_percent: row.max_withdraw_percent,
            });
        }

        Ok(PenaltyDecision {
            tier,
            tax_percent: row.tax_percent,
            max_withdraw_percent: row.max_withdraw_percent,
            matured: tier == self.tiers.len() - 1,
        })
    }

    fn config(&self) -> PolicyConfig {
        PolicyConfig::Tiered {
            tier_secs: self.tier_secs,
            tiers: self.tiers.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// PolicyConfig
// ---------------------------------------------------------------------------

/// Serializable policy selection, as found in vault config files.
///
/// ```json
/// { "kind": "tiered", "tier_secs": 172800,
///   "tiers": [ { "max_withdraw_percent": 25, "tax_percent": 75 }, ... ] }
/// { "kind": "none" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicyConfig {
    /// [`NoPenalty`].
    None,
    /// [`TieredPenalty`].
    Tiered {
        /// Width of each tier in seconds.
        tier_secs: u64,
        /// Schedule rows, earliest first.
        tiers: Vec<PenaltyTier>,
    },
}

impl PolicyConfig {
    /// Validate and instantiate the policy.
    ///
    /// # Errors
    ///
    /// Returns [`PenaltyError::InvalidSchedule`] for a malformed tiered schedule.
    pub fn build(&self) -> Result<Box<dyn PenaltyPolicy>, PenaltyError> {
        match self {
            PolicyConfig::None => Ok(Box::new(NoPenalty)),
            PolicyConfig::Tiered { tier_secs, tiers } => {
                Ok(Box::new(TieredPenalty::new(*tier_secs, tiers.clone())?))
            }
        }
    }

    /// Short name for logs and API responses.
    pub fn name(&self) -> &'static str {
        match self {
            PolicyConfig::None => "none",
            PolicyConfig::Tiered { .. } => "tiered",
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        TieredPenalty::default_schedule().config()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
