//! # Protocol Configuration & Constants
//!
//! Every magic number in Stakebar lives here. The penalty schedule, the
//! tier width, the address prefix, the default ports. If a number shows up
//! in two places, it belongs in this file.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// Major version. Bump on changes to share accounting or penalty math.
pub const PROTOCOL_VERSION_MAJOR: u16 = 0;

/// Minor version. Bump on backward-compatible additions.
pub const PROTOCOL_VERSION_MINOR: u16 = 1;

/// Patch version. Bump on bug fixes that do not move a single share.
pub const PROTOCOL_VERSION_PATCH: u16 = 0;

/// The full version string.
pub const PROTOCOL_VERSION: &str = "0.1.0";

// ---------------------------------------------------------------------------
// Addresses
// ---------------------------------------------------------------------------

/// Bech32 human-readable prefix for account addresses.
pub const ACCOUNT_HRP: &str = "bar";

/// Length in bytes of the opaque account key behind every address.
pub const ACCOUNT_KEY_LENGTH: usize = 32;

/// Label the vault's own ledger account is derived from when the caller
/// does not supply an explicit address.
pub const DEFAULT_VAULT_LABEL: &str = "stakebar:vault";

// ---------------------------------------------------------------------------
// Share Accounting
// ---------------------------------------------------------------------------

/// Denominator for every percentage in the protocol. Caps and tax rates are
/// whole percents; the protocol never deals in fractional percents.
pub const PERCENT_DENOMINATOR: u64 = 100;

// ---------------------------------------------------------------------------
// Early-Withdrawal Penalty Schedule
// ---------------------------------------------------------------------------

/// Width of one penalty tier, measured from the account's last deposit.
pub const PENALTY_TIER_DURATION: Duration = Duration::from_secs(2 * 24 * 60 * 60);

/// Tier width in seconds, for config files and CLI flags that want a plain
/// integer. Keep in sync with [`PENALTY_TIER_DURATION`].
pub const PENALTY_TIER_SECS: u64 = 172_800;

/// Widest tier a configured schedule may use: ten 365-day years.
pub const MAX_PENALTY_TIER_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Default schedule as `(max withdrawable percent, tax percent)` per tier.
///
/// Tier `i` covers `[i * width, (i + 1) * width)`; the last entry applies
/// from its lower bound onwards and is the maturity tier.
pub const DEFAULT_PENALTY_SCHEDULE: [(u8, u8); 4] = [(25, 75), (50, 50), (75, 25), (100, 0)];

// ---------------------------------------------------------------------------
// Node Defaults
// ---------------------------------------------------------------------------

/// Default port for the HTTP API.
pub const DEFAULT_API_PORT: u16 = 9841;

/// Default port for the Prometheus metrics endpoint.
pub const DEFAULT_METRICS_PORT: u16 = 9842;
