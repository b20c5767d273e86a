//! # Account IDs
//!
//! Every participant, the vault included, is addressed by an [`AccountId`]:
//! an opaque 32-byte key rendered as a Bech32 string with the `bar` prefix.
//!
//! ```text
//! label ("alice")
//!     -> BLAKE3(label) -> 32 bytes
//!     -> Bech32("bar", key) -> bar1...
//! ```
//!
//! Nothing in the vault ever looks inside the key. Label derivation exists
//! for devnets, scenario files and tests, where "alice" is a lot easier to
//! type than a checksummed address.

use bech32::{Bech32, Hrp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::config::{ACCOUNT_HRP, ACCOUNT_KEY_LENGTH};

/// Domain separator mixed into label derivation so a label hash can never
/// collide with a BLAKE3 digest computed for some other purpose.
const LABEL_DOMAIN: &[u8] = b"stakebar/account-label/v1";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur while parsing an account address.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccountIdError {
    /// The Bech32 string could not be decoded.
    #[error("bech32 decode error: {0}")]
    Bech32Decode(String),

    /// The decoded address has an unexpected human-readable prefix.
    #[error("invalid HRP: expected '{expected}', got '{got}'")]
    InvalidHrp {
        /// The expected HRP.
        expected: String,
        /// The HRP that was actually found.
        got: String,
    },

    /// The decoded data has an unexpected length.
    #[error("invalid address data length: expected {expected} bytes, got {got}")]
    InvalidDataLength {
        /// Expected number of bytes.
        expected: usize,
        /// Actual number of bytes.
        got: usize,
    },
}

// ---------------------------------------------------------------------------
// AccountId
// ---------------------------------------------------------------------------

/// An opaque account key.
///
/// # Examples
///
/// ```
/// use stakebar_protocol::identity::AccountId;
///
/// let alice = AccountId::from_label("alice");
/// let address = alice.to_address();
/// assert!(address.starts_with("bar1"));
/// assert_eq!(address.parse::<AccountId>().unwrap(), alice);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccountId([u8; ACCOUNT_KEY_LENGTH]);

impl AccountId {
    /// Wrap raw key bytes.
    pub const fn from_bytes(bytes: [u8; ACCOUNT_KEY_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Derive a deterministic account key from a human label.
    pub fn from_label(label: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(LABEL_DOMAIN);
        hasher.update(label.as_bytes());
        Self(*hasher.finalize().as_bytes())
    }

    /// Encode as a Bech32 address string.
    pub fn to_address(&self) -> String {
        let hrp = Hrp::parse(ACCOUNT_HRP).expect("static HRP is valid");
        bech32::encode::<Bech32>(hrp, &self.0)
            .expect("encoding a 32-byte payload should never fail")
    }

    /// Parse a Bech32 address. Validates HRP, checksum and length.
    pub fn from_address(addr: &str) -> Result<Self, AccountIdError> {
        let (hrp, data) =
            bech32::decode(addr).map_err(|e| AccountIdError::Bech32Decode(e.to_string()))?;

        if hrp.as_str() != ACCOUNT_HRP {
            return Err(AccountIdError::InvalidHrp {
                expected: ACCOUNT_HRP.to_string(),
                got: hrp.to_string(),
            });
        }

        if data.len() != ACCOUNT_KEY_LENGTH {
            return Err(AccountIdError::InvalidDataLength {
                expected: ACCOUNT_KEY_LENGTH,
                got: data.len(),
            });
        }

        let mut key = [0u8; ACCOUNT_KEY_LENGTH];
        key.copy_from_slice(&data);
        Ok(Self(key))
    }

    /// Resolve either a Bech32 address or, failing that, a label.
    ///
    /// Used by the node's scenario files and API, where operators mix
    /// `"alice"` and `"bar1..."` freely. Anything that starts with the
    /// address prefix must parse as an address; it is never re-read as a label.
    pub fn resolve(input: &str) -> Result<Self, AccountIdError> {
        let prefix = format!("{}1", ACCOUNT_HRP);
        if input.starts_with(&prefix) {
            Self::from_address(input)
        } else {
            Ok(Self::from_label(input))
        }
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; ACCOUNT_KEY_LENGTH] {
        &self.0
    }

    /// Hex encoding of the raw key. Handy in log lines.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_address())
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({})", self.to_address())
    }
}

impl FromStr for AccountId {
    type Err = AccountIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_address(s)
    }
}

impl Serialize for AccountId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_address())
        } else {
            serializer.serialize_bytes(&self.0)
        }
    }
}

impl<'de> Deserialize<'de> for AccountId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            AccountId::from_address(&s).map_err(serde::de::Error::custom)
        } else {
            let bytes = <Vec<u8>>::deserialize(deserializer)?;
            if bytes.len() != ACCOUNT_KEY_LENGTH {
                return Err(serde::de::Error::custom(format!(
                    "expected {}-byte account key, got {}",
                    ACCOUNT_KEY_LENGTH,
                    bytes.len()
                )));
            }
            let mut key = [0u8; ACCOUNT_KEY_LENGTH];
            key.copy_from_slice(&bytes);
            Ok(AccountId(key))
        }
    }
}
