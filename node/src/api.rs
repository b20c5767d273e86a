//! # REST API
//!
//! Builds the axum router that exposes the devnet vault over HTTP. All
//! handlers share one [`Engine`] behind a mutex: operations are applied one
//! at a time, in the order the lock is acquired.
//!
//! ## Endpoints
//!
//! | Method | Path                  | Description                          |
//! |--------|-----------------------|--------------------------------------|
//! | GET    | `/health`             | Liveness probe                       |
//! | GET    | `/v1/pool`            | Pool totals, rate and penalty policy |
//! | GET    | `/v1/accounts/:id`    | Balances and position of an account  |
//! | POST   | `/v1/mint`            | Devnet faucet                        |
//! | POST   | `/v1/approve`         | Set an allowance (vault by default)  |
//! | POST   | `/v1/transfer`        | Plain token transfer                 |
//! | POST   | `/v1/enter`           | Deposit into the vault               |
//! | POST   | `/v1/leave`           | Redeem shares                        |
//!
//! Failures come back as `{ "error": <kind>, "message": <text> }`.

use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use stakebar_contracts::{EnterReceipt, LeaveReceipt, VaultError};
use stakebar_protocol::identity::AccountId;

use crate::engine::{resolve_account, AccountView, Engine, EngineError, PoolView};
use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone; everything is behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// Ledger and vault. A single lock serializes every operation.
    pub engine: Arc<Mutex<Engine>>,
    /// Prometheus metrics for in-handler recording.
    pub metrics: SharedMetrics,
}

impl AppState {
    pub fn new(version: impl Into<String>, engine: Engine, metrics: SharedMetrics) -> Self {
        Self {
            version: version.into(),
            engine: Arc::new(Mutex::new(engine)),
            metrics,
        }
    }

    /// Runs `op` under the engine lock, recording latency and, on failure,
    /// the rejection.
    fn apply<T>(
        &self,
        op: &'static str,
        f: impl FnOnce(&mut Engine) -> Result<T, EngineError>,
    ) -> Result<T, ApiError> {
        let started = Instant::now();
        let result = {
            let mut engine = self.engine.lock();
            let result = f(&mut engine);
            if result.is_ok() {
                let pool = engine.pool();
                self.metrics
                    .set_pool(pool.snapshot.total_shares, pool.snapshot.total_assets);
            }
            result
        };
        self.metrics
            .operation_latency_seconds
            .with_label_values(&[op])
            .observe(started.elapsed().as_secs_f64());

        result.map_err(|e| {
            self.metrics.record_rejection(op, e.kind());
            ApiError::from(e)
        })
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error body returned by every failing endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable machine-readable kind.
    pub error: String,
    /// Human-readable description.
    pub message: String,
}

/// Engine error carried to the HTTP layer.
#[derive(Debug)]
pub struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            EngineError::InvalidAccount(_) => StatusCode::BAD_REQUEST,
            EngineError::VaultAccount => StatusCode::FORBIDDEN,
            EngineError::Vault(e) => match e {
                VaultError::SelfDealing => StatusCode::FORBIDDEN,
                VaultError::InvalidPolicy(_) => StatusCode::BAD_REQUEST,
                VaultError::Invariant(_) => StatusCode::INTERNAL_SERVER_ERROR,
                VaultError::InsufficientAllowance { .. }
                | VaultError::InsufficientBalance { .. }
                | VaultError::DivisionUndefined
                | VaultError::PenaltyGateViolation { .. }
                | VaultError::ArithmeticOverflow => StatusCode::UNPROCESSABLE_ENTITY,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "operation failed");
        }
        let body = ErrorBody {
            error: self.0.kind().to_string(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

/// Body for `POST /v1/mint`.
#[derive(Debug, Serialize, Deserialize)]
pub struct MintRequest {
    pub account: String,
    pub amount: u64,
}

/// Body for `POST /v1/approve`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApproveRequest {
    pub owner: String,
    /// Defaults to the vault.
    #[serde(default)]
    pub spender: Option<String>,
    pub amount: u64,
}

/// Response for `POST /v1/approve`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApproveResponse {
    pub owner: AccountId,
    pub spender: AccountId,
    pub allowance: u64,
}

/// Body for `POST /v1/transfer`.
#[derive(Debug, Serialize, Deserialize)]
pub struct TransferRequest {
    pub from: String,
    pub to: String,
    pub amount: u64,
}

/// Response for `POST /v1/transfer`.
#[derive(Debug, Serialize, Deserialize)]
pub struct TransferResponse {
    pub from: AccountView,
    pub to: AccountView,
}

/// Body for `POST /v1/enter`.
#[derive(Debug, Serialize, Deserialize)]
pub struct EnterRequest {
    pub account: String,
    pub amount: u64,
}

/// Body for `POST /v1/leave`.
#[derive(Debug, Serialize, Deserialize)]
pub struct LeaveRequest {
    pub account: String,
    pub shares: u64,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/v1/pool", get(pool_handler))
        .route("/v1/accounts/:id", get(account_handler))
        .route("/v1/mint", post(mint_handler))
        .route("/v1/approve", post(approve_handler))
        .route("/v1/transfer", post(transfer_handler))
        .route("/v1/enter", post(enter_handler))
        .route("/v1/leave", post(leave_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health` returns 200 while the process is up.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({ "status": "ok", "version": state.version })),
    )
}

async fn pool_handler(State(state): State<AppState>) -> Json<PoolView> {
    Json(state.engine.lock().pool())
}

/// `GET /v1/accounts/:id`. Accepts a label or a `bar1...` address. Accounts
/// that never appeared come back zeroed.
async fn account_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<AccountView>, ApiError> {
    let account = resolve_account(&id)?;
    Ok(Json(state.engine.lock().account(&account)))
}

async fn mint_handler(
    State(state): State<AppState>,
    Json(req): Json<MintRequest>,
) -> Result<Json<AccountView>, ApiError> {
    let account = resolve_account(&req.account)?;
    let view = state.apply("mint", |e| e.mint(&account, req.amount))?;
    Ok(Json(view))
}

async fn approve_handler(
    State(state): State<AppState>,
    Json(req): Json<ApproveRequest>,
) -> Result<Json<ApproveResponse>, ApiError> {
    let owner = resolve_account(&req.owner)?;
    let spender = req.spender.as_deref().map(resolve_account).transpose()?;
    let resp = state.apply("approve", |e| {
        let spender = spender.unwrap_or(*e.vault().address());
        let allowance = e.approve(&owner, &spender, req.amount)?;
        Ok(ApproveResponse {
            owner,
            spender,
            allowance,
        })
    })?;
    Ok(Json(resp))
}

async fn transfer_handler(
    State(state): State<AppState>,
    Json(req): Json<TransferRequest>,
) -> Result<Json<TransferResponse>, ApiError> {
    let from = resolve_account(&req.from)?;
    let to = resolve_account(&req.to)?;
    let (from, to) = state.apply("transfer", |e| e.transfer(&from, &to, req.amount))?;
    Ok(Json(TransferResponse { from, to }))
}

async fn enter_handler(
    State(state): State<AppState>,
    Json(req): Json<EnterRequest>,
) -> Result<Json<EnterReceipt>, ApiError> {
    let account = resolve_account(&req.account)?;
    let receipt = state.apply("enter", |e| e.enter(&account, req.amount))?;
    state.metrics.record_enter(&receipt);
    Ok(Json(receipt))
}

async fn leave_handler(
    State(state): State<AppState>,
    Json(req): Json<LeaveRequest>,
) -> Result<Json<LeaveReceipt>, ApiError> {
    let account = resolve_account(&req.account)?;
    let receipt = state.apply("leave", |e| e.leave(&account, req.shares))?;
    state.metrics.record_leave(&receipt);
    Ok(Json(receipt))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
