//! # Scenario Simulator
//!
//! Replays a scripted list of ledger and vault operations against a
//! [`ManualClock`], so penalty tiers can be walked through in milliseconds.
//!
//! ```json
//! {
//!   "symbol": "SUSHI",
//!   "policy": { "kind": "none" },
//!   "steps": [
//!     { "op": "mint",     "account": "alice", "amount": 100 },
//!     { "op": "approve",  "owner": "alice", "amount": 100 },
//!     { "op": "enter",    "account": "alice", "amount": 100 },
//!     { "op": "advance",  "days": 3 },
//!     { "op": "leave",    "account": "alice", "shares": 50 }
//!   ]
//! }
//! ```
//!
//! A failing step does not stop the run. Its outcome records the error
//! kind, and when the step carries `"expect_error"` the outcome also says
//! whether the failure was the expected one.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use stakebar_contracts::PolicyConfig;
use stakebar_protocol::clock::{Clock, ManualClock};

use crate::config::VaultConfig;
use crate::engine::{resolve_account, Engine, EngineError, PoolView};

// ---------------------------------------------------------------------------
// Scenario File
// ---------------------------------------------------------------------------

/// A scenario file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Token symbol for the ledger.
    #[serde(default = "default_symbol")]
    pub symbol: String,
    /// Overrides the vault config's policy when present.
    #[serde(default)]
    pub policy: Option<PolicyConfig>,
    /// Simulated start time. Defaults to the Unix epoch.
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    pub steps: Vec<Step>,
}

fn default_symbol() -> String {
    "SUSHI".to_string()
}

/// One scripted step, plus an optional expected error kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    #[serde(flatten)]
    pub action: Action,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect_error: Option<String>,
}

/// What a step does. Accounts are labels or `bar1...` addresses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Action {
    Mint {
        account: String,
        amount: u64,
    },
    /// `spender` defaults to the vault.
    Approve {
        owner: String,
        #[serde(default)]
        spender: Option<String>,
        amount: u64,
    },
    Transfer {
        from: String,
        to: String,
        amount: u64,
    },
    Enter {
        account: String,
        amount: u64,
    },
    Leave {
        account: String,
        shares: u64,
    },
    /// Moves the simulated clock forward.
    Advance {
        #[serde(default)]
        days: i64,
        #[serde(default)]
        hours: i64,
        #[serde(default)]
        seconds: i64,
    },
}

impl Action {
    fn name(&self) -> &'static str {
        match self {
            Action::Mint { .. } => "mint",
            Action::Approve { .. } => "approve",
            Action::Transfer { .. } => "transfer",
            Action::Enter { .. } => "enter",
            Action::Leave { .. } => "leave",
            Action::Advance { .. } => "advance",
        }
    }
}

impl Scenario {
    /// Reads a scenario file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse scenario {}", path.display()))
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Result of one step, printed as a JSON line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    /// Zero-based step index.
    pub step: usize,
    pub op: String,
    /// Simulated time the step ran at.
    pub at: DateTime<Utc>,
    pub ok: bool,
    /// Receipt or account view on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Set when the step declared `expect_error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub as_expected: Option<bool>,
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationReport {
    pub outcomes: Vec<StepOutcome>,
    /// Pool state after the last step.
    pub pool: PoolView,
}

impl SimulationReport {
    /// Steps whose outcome contradicted their `expect_error`, or that failed
    /// without declaring one.
    pub fn surprises(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| match o.as_expected {
                Some(expected) => !expected,
                None => !o.ok,
            })
            .count()
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Runs `scenario` against a fresh engine built from `config`.
pub fn run(scenario: &Scenario, config: &VaultConfig) -> Result<SimulationReport> {
    let clock = match scenario.start {
        Some(start) => ManualClock::new(start),
        None => ManualClock::at_epoch(),
    };
    let policy = scenario.policy.as_ref().unwrap_or(&config.policy);
    let mut engine = Engine::new(
        &scenario.symbol,
        config.vault_address()?,
        policy,
        Arc::new(clock.clone()),
    )
    .context("failed to build vault for scenario")?;

    check_timeline(clock.now(), &scenario.steps)?;

    let mut outcomes = Vec::with_capacity(scenario.steps.len());
    for (index, step) in scenario.steps.iter().enumerate() {
        let at = clock.now();
        let result = apply(&mut engine, &clock, &step.action);
        let mut outcome = StepOutcome {
            step: index,
            op: step.action.name().to_string(),
            at,
            ok: result.is_ok(),
            result: None,
            error: None,
            message: None,
            as_expected: None,
        };
        match result {
            Ok(value) => outcome.result = Some(value),
            Err(e) => {
                outcome.error = Some(e.kind().to_string());
                outcome.message = Some(e.to_string());
            }
        }
        if let Some(expected) = &step.expect_error {
            outcome.as_expected = Some(outcome.error.as_deref() == Some(expected.as_str()));
        }
        tracing::debug!(step = index, op = %outcome.op, ok = outcome.ok, "scenario step");
        outcomes.push(outcome);
    }

    engine
        .vault()
        .check_invariants()
        .context("share ledger out of balance after scenario")?;

    Ok(SimulationReport {
        outcomes,
        pool: engine.pool(),
    })
}

fn apply(
    engine: &mut Engine,
    clock: &ManualClock,
    action: &Action,
) -> Result<serde_json::Value, EngineError> {
    let value = match action {
        Action::Mint { account, amount } => {
            let account = resolve_account(account)?;
            to_value(&engine.mint(&account, *amount)?)
        }
        Action::Approve {
            owner,
            spender,
            amount,
        } => {
            let owner = resolve_account(owner)?;
            let spender = match spender {
                Some(s) => resolve_account(s)?,
                None => *engine.vault().address(),
            };
            let allowance = engine.approve(&owner, &spender, *amount)?;
            serde_json::json!({ "owner": owner, "spender": spender, "allowance": allowance })
        }
        Action::Transfer { from, to, amount } => {
            let from = resolve_account(from)?;
            let to = resolve_account(to)?;
            let (from, to) = engine.transfer(&from, &to, *amount)?;
            serde_json::json!({ "from": from, "to": to })
        }
        Action::Enter { account, amount } => {
            let account = resolve_account(account)?;
            to_value(&engine.enter(&account, *amount)?)
        }
        Action::Leave { account, shares } => {
            let account = resolve_account(account)?;
            to_value(&engine.leave(&account, *shares)?)
        }
        Action::Advance {
            days,
            hours,
            seconds,
        } => {
            // `check_timeline` already walked every step, so both succeed.
            if let Some(by) = advance_duration(*days, *hours, *seconds) {
                clock.try_advance(by);
            }
            serde_json::json!({ "now": clock.now() })
        }
    };
    Ok(value)
}

/// Largest single clock step a scenario may take, in either direction.
const MAX_ADVANCE_SECS: i64 = 100 * 365 * 86_400;

/// Walks the simulated clock through every `advance` step, rejecting the
/// scenario if any single step is too large or the running time leaves
/// chrono's range.
fn check_timeline(start: DateTime<Utc>, steps: &[Step]) -> Result<()> {
    let mut now = start;
    for (index, step) in steps.iter().enumerate() {
        if let Action::Advance {
            days,
            hours,
            seconds,
        } = step.action
        {
            let by = advance_duration(days, hours, seconds).with_context(|| {
                format!(
                    "step {}: advance must stay within {} days",
                    index,
                    MAX_ADVANCE_SECS / 86_400
                )
            })?;
            now = now
                .checked_add_signed(by)
                .with_context(|| format!("step {}: simulated clock out of range", index))?;
        }
    }
    Ok(())
}

fn advance_duration(days: i64, hours: i64, seconds: i64) -> Option<Duration> {
    let secs = days
        .checked_mul(86_400)?
        .checked_add(hours.checked_mul(3_600)?)?
        .checked_add(seconds)?;
    (secs.abs() <= MAX_ADVANCE_SECS).then(|| Duration::seconds(secs))
}

/// Receipts and views are plain data; serializing them cannot fail.
fn to_value<T: Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}
