//! # Vault Configuration File
//!
//! Optional JSON file passed with `--config`. Every field has a default, so
//! an empty object (or no file at all) yields the standard tiered vault.
//!
//! ```json
//! {
//!   "vault_label": "stakebar:vault",
//!   "policy": { "kind": "none" }
//! }
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use stakebar_contracts::PolicyConfig;
use stakebar_protocol::config::DEFAULT_VAULT_LABEL;
use stakebar_protocol::identity::AccountId;

/// Node-side vault settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VaultConfig {
    /// Label or `bar1...` address the vault holds its assets under.
    pub vault_label: String,
    /// Early-withdrawal penalty.
    pub policy: PolicyConfig,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            vault_label: DEFAULT_VAULT_LABEL.to_string(),
            policy: PolicyConfig::default(),
        }
    }
}

impl VaultConfig {
    /// Reads and validates `path`, or returns the defaults when `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read vault config {}", path.display()))?;
        let config: VaultConfig = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse vault config {}", path.display()))?;
        config.validate()?;
        tracing::info!(path = %path.display(), policy = config.policy.name(), "vault config loaded");
        Ok(config)
    }

    /// Checks the policy builds and the vault account resolves.
    pub fn validate(&self) -> Result<()> {
        self.policy.build().context("invalid penalty policy")?;
        self.vault_address()?;
        Ok(())
    }

    pub fn vault_address(&self) -> Result<AccountId> {
        AccountId::resolve(&self.vault_label)
            .with_context(|| format!("invalid vault account '{}'", self.vault_label))
    }
}
