// Copyright (c) 2026 Stakebar Contributors. MIT License.
// See LICENSE for details.

//! # Stakebar Protocol: Core Primitives
//!
//! The pieces every other Stakebar crate stands on: who an account is, what
//! time it is, and where the underlying asset actually lives.
//!
//! ## Architecture
//!
//! - **identity**: Bech32 account addresses over opaque 32-byte keys.
//! - **clock**: Injected time sources. The penalty schedule is all about
//!   elapsed time, so nothing reads the wall clock behind your back.
//! - **ledger**: The fungible-token ledger the vault pulls from and pays
//!   out of, plus an in-memory implementation.
//! - **config**: Protocol constants and the default penalty schedule.
//!
//! ## Design Philosophy
//!
//! 1. Integers only. Amounts are `u64` smallest units, products go through
//!    `u128`, division floors.
//! 2. Failed calls leave state exactly as they found it.
//! 3. If it touches money, it has tests. Plural.

pub mod clock;
pub mod config;
pub mod identity;
pub mod ledger;

pub use clock::{Clock, ManualClock, SystemClock};
pub use identity::AccountId;
pub use ledger::{AssetLedger, LedgerError, TokenLedger};
