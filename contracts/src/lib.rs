//! # Stakebar Contracts
//!
//! The vault itself. Deposit a token, get shares; redeem shares, get your
//! proportional cut of whatever the vault holds by then, which includes
//! any yield that was sent to it directly.
//!
//! - **Share Ledger**: share balances, pool total, and the asset ↔ share
//!   conversion math.
//! - **Penalty Policy**: the early-withdrawal gate: how much you may take
//!   out and what it costs, as a function of time since your last deposit.
//! - **Vault**: `enter` / `leave`, wiring the two above to an external
//!   asset ledger and an injected clock.
//!
//! ## Design Principles
//!
//! 1. All monetary operations check for overflow. Wrapping arithmetic and
//!    money do not mix.
//! 2. Division floors, always. Rounding dust belongs to the pool.
//! 3. Every check runs before the first write; failures leave no trace.
//! 4. Every public type is serializable (serde) for wire transport and
//!    snapshots.

pub mod penalty_policy;
pub mod share_ledger;
pub mod vault;

pub use penalty_policy::{
    NoPenalty, PenaltyDecision, PenaltyError, PenaltyPolicy, PenaltyTier, PolicyConfig,
    TieredPenalty,
};
pub use share_ledger::{assets_for_shares, shares_for_deposit, ShareAccount, ShareError, ShareLedger};
pub use vault::{
    BalanceUnit, EnterReceipt, ExchangeRate, LeaveQuote, LeaveReceipt, Vault, VaultError,
    VaultSnapshot,
};
