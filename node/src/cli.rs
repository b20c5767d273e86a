//! # CLI Interface
//!
//! Defines the command-line argument structure for `stakebar-node` using
//! `clap` derive. Three subcommands: `run`, `simulate`, and `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use stakebar_protocol::config::{DEFAULT_API_PORT, DEFAULT_METRICS_PORT};

/// Stakebar devnet node.
///
/// Hosts an in-memory token ledger and a staking vault over it, serves the
/// JSON API and Prometheus metrics, and replays scripted scenarios.
#[derive(Parser, Debug)]
#[command(
    name = "stakebar-node",
    about = "Stakebar staking vault devnet node",
    version,
    propagate_version = true
)]
pub struct StakebarNodeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the HTTP API and metrics over a fresh devnet ledger.
    Run(RunArgs),
    /// Replay a scenario file against a simulated clock and print each
    /// step's outcome as a JSON line.
    Simulate(SimulateArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the vault configuration file (JSON).
    ///
    /// When omitted, the vault uses the default tiered penalty.
    #[arg(long, short = 'c', env = "STAKEBAR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Port for the JSON API.
    #[arg(long, env = "STAKEBAR_API_PORT", default_value_t = DEFAULT_API_PORT)]
    pub api_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "STAKEBAR_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Symbol of the underlying token.
    #[arg(long, env = "STAKEBAR_TOKEN", default_value = "SUSHI")]
    pub token: String,

    /// Log output format: `pretty` or `json`.
    #[arg(long, env = "STAKEBAR_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,
}

/// Arguments for the `simulate` subcommand.
#[derive(Parser, Debug)]
pub struct SimulateArgs {
    /// Scenario file (JSON) to replay.
    #[arg(long, short = 's')]
    pub scenario: PathBuf,

    /// Vault configuration file. A policy in the scenario itself wins.
    #[arg(long, short = 'c', env = "STAKEBAR_CONFIG")]
    pub config: Option<PathBuf>,
}
