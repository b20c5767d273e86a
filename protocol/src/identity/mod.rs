//! # Identity Module
//!
//! Account addressing for Stakebar. The vault, its depositors and anyone
//! donating yield are all just [`AccountId`]s on the asset ledger.

pub mod account_id;

pub use account_id::{AccountId, AccountIdError};
