// Copyright (c) 2026 Stakebar Contributors. MIT License.
// See LICENSE for details.

//! # Stakebar Node
//!
//! Entry point for the `stakebar-node` binary. Parses CLI arguments,
//! initializes logging and metrics, and either serves the devnet vault over
//! HTTP or replays a scenario file.
//!
//! The binary supports three subcommands:
//!
//! - `run`      serve the HTTP API and `/metrics`
//! - `simulate` replay a scenario against a simulated clock
//! - `version`  print build version information

mod api;
mod cli;
mod config;
mod engine;
mod logging;
mod metrics;
mod scenario;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;

use stakebar_protocol::clock::SystemClock;

use cli::{Commands, StakebarNodeCli};
use config::VaultConfig;
use engine::Engine;
use logging::LogFormat;
use metrics::VaultMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = StakebarNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Simulate(args) => simulate(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Serves the API and the metrics endpoint until SIGINT or SIGTERM.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(
        "stakebar_node=info,stakebar_contracts=info,stakebar_protocol=info,tower_http=debug",
        LogFormat::from_str_lossy(&args.log_format),
    );

    tracing::info!(
        api_port = args.api_port,
        metrics_port = args.metrics_port,
        token = %args.token,
        "starting stakebar-node"
    );

    // --- Vault ---
    let vault_config = VaultConfig::load(args.config.as_deref())?;
    let engine = Engine::new(
        &args.token,
        vault_config.vault_address()?,
        &vault_config.policy,
        Arc::new(SystemClock),
    )
    .context("failed to initialize vault")?;

    // --- Metrics ---
    let vault_metrics = Arc::new(VaultMetrics::new());

    // --- Application state ---
    let app_state = api::AppState::new(
        format!(
            "{} (protocol {})",
            env!("CARGO_PKG_VERSION"),
            stakebar_protocol::config::PROTOCOL_VERSION,
        ),
        engine,
        Arc::clone(&vault_metrics),
    );

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.api_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&vault_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    tracing::info!("stakebar-node stopped");
    Ok(())
}

/// Replays a scenario and prints one JSON line per step, then the final pool.
///
/// Exits non-zero if any step failed unexpectedly.
fn simulate(args: cli::SimulateArgs) -> Result<()> {
    // stdout carries the results; keep logs quiet unless RUST_LOG says otherwise.
    logging::init_logging("warn", LogFormat::Pretty);

    let vault_config = VaultConfig::load(args.config.as_deref())?;
    let scenario = scenario::Scenario::load(&args.scenario)?;
    let report = scenario::run(&scenario, &vault_config)?;

    for outcome in &report.outcomes {
        println!("{}", serde_json::to_string(outcome)?);
    }
    println!("{}", serde_json::to_string(&serde_json::json!({ "pool": report.pool }))?);

    let surprises = report.surprises();
    if surprises > 0 {
        anyhow::bail!("{} step(s) failed unexpectedly", surprises);
    }
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("stakebar-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol      {}", stakebar_protocol::config::PROTOCOL_VERSION);
    println!("rustc         {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
