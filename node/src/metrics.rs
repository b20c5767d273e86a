//! # Prometheus Metrics
//!
//! Vault activity counters and pool gauges, scraped at `/metrics` on the
//! metrics port.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] with
//! the `stakebar` prefix, so they do not collide with any default global
//! registry consumers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

use stakebar_contracts::{EnterReceipt, LeaveReceipt};

/// Holds all Prometheus metric handles for the node.
///
/// Clone-friendly (prometheus handles are `Arc`s internally) so it can be
/// shared across request handlers.
#[derive(Clone)]
pub struct VaultMetrics {
    /// Prometheus registry that owns all metrics below.
    registry: Registry,
    /// Committed deposits.
    pub enter_total: IntCounter,
    /// Committed redemptions.
    pub leave_total: IntCounter,
    /// Rejected operations, by operation and error kind.
    pub rejected_total: IntCounterVec,
    /// Asset units retained by the vault as early-withdrawal tax.
    pub penalty_tax_collected_total: IntCounter,
    /// Shares outstanding.
    pub total_shares: IntGauge,
    /// Vault asset balance.
    pub total_assets: IntGauge,
    /// Handler latency, by operation.
    pub operation_latency_seconds: HistogramVec,
}

impl VaultMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("stakebar".into()), None)
            .expect("failed to create prometheus registry");

        let enter_total = IntCounter::new("enter_total", "Total number of committed deposits")
            .expect("metric creation");
        registry
            .register(Box::new(enter_total.clone()))
            .expect("metric registration");

        let leave_total = IntCounter::new("leave_total", "Total number of committed redemptions")
            .expect("metric creation");
        registry
            .register(Box::new(leave_total.clone()))
            .expect("metric registration");

        let rejected_total = IntCounterVec::new(
            Opts::new("rejected_total", "Operations rejected, by operation and error kind"),
            &["op", "kind"],
        )
        .expect("metric creation");
        registry
            .register(Box::new(rejected_total.clone()))
            .expect("metric registration");

        let penalty_tax_collected_total = IntCounter::new(
            "penalty_tax_collected_total",
            "Asset units kept by the vault as early-withdrawal tax",
        )
        .expect("metric creation");
        registry
            .register(Box::new(penalty_tax_collected_total.clone()))
            .expect("metric registration");

        let total_shares =
            IntGauge::new("total_shares", "Vault shares outstanding").expect("metric creation");
        registry
            .register(Box::new(total_shares.clone()))
            .expect("metric registration");

        let total_assets = IntGauge::new("total_assets", "Underlying asset held by the vault")
            .expect("metric creation");
        registry
            .register(Box::new(total_assets.clone()))
            .expect("metric registration");

        let operation_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "operation_latency_seconds",
                "API operation latency in seconds, including lock wait",
            )
            .buckets(vec![
                0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
            ]),
            &["op"],
        )
        .expect("metric creation");
        registry
            .register(Box::new(operation_latency_seconds.clone()))
            .expect("metric registration");

        Self {
            registry,
            enter_total,
            leave_total,
            rejected_total,
            penalty_tax_collected_total,
            total_shares,
            total_assets,
            operation_latency_seconds,
        }
    }

    pub fn record_enter(&self, receipt: &EnterReceipt) {
        tracing::trace!(receipt = %receipt.receipt_id, "enter recorded");
        self.enter_total.inc();
    }

    pub fn record_leave(&self, receipt: &LeaveReceipt) {
        self.leave_total.inc();
        self.penalty_tax_collected_total.inc_by(receipt.tax);
    }

    pub fn record_rejection(&self, op: &str, kind: &str) {
        self.rejected_total.with_label_values(&[op, kind]).inc();
    }

    /// Gauges are `i64`; amounts past `i64::MAX` pin at the maximum.
    pub fn set_pool(&self, total_shares: u64, total_assets: u64) {
        self.total_shares
            .set(i64::try_from(total_shares).unwrap_or(i64::MAX));
        self.total_assets
            .set(i64::try_from(total_assets).unwrap_or(i64::MAX));
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl Default for VaultMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<VaultMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
///
/// Returns HTTP 500 if encoding fails.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejections_are_labelled() {
        let metrics = VaultMetrics::new();
        metrics.record_rejection("leave", "penalty_gate_violation");
        metrics.record_rejection("leave", "penalty_gate_violation");
        metrics.record_rejection("enter", "insufficient_allowance");

        let text = metrics.encode().unwrap();
        assert!(text.contains(
            r#"stakebar_rejected_total{kind="penalty_gate_violation",op="leave"} 2"#
        ));
        assert!(text.contains(
            r#"stakebar_rejected_total{kind="insufficient_allowance",op="enter"} 1"#
        ));
    }

    #[test]
    fn receipts_leave_pool_gauges_alone() {
        use stakebar_contracts::{PolicyConfig, Vault};
        use stakebar_protocol::clock::ManualClock;
        use stakebar_protocol::identity::AccountId;
        use stakebar_protocol::ledger::{AssetLedger, TokenLedger};

        let alice = AccountId::from_label("alice");
        let mut ledger = TokenLedger::new("SUSHI");
        let mut vault = Vault::from_config(
            AccountId::from_label("bar"),
            &PolicyConfig::None,
            Arc::new(ManualClock::at_epoch()),
        )
        .unwrap();
        ledger.mint(&alice, 100).unwrap();
        ledger.approve(&alice, vault.address(), 100);
        let entered = vault.enter(&mut ledger, &alice, 100).unwrap();
        let left = vault.leave(&mut ledger, &alice, 40).unwrap();

        // Gauges come from the pool snapshot taken under the engine lock.
        let metrics = VaultMetrics::new();
        metrics.set_pool(7, 9);
        metrics.record_enter(&entered);
        metrics.record_leave(&left);

        assert_eq!(metrics.enter_total.get(), 1);
        assert_eq!(metrics.leave_total.get(), 1);
        assert_eq!(metrics.total_shares.get(), 7);
        assert_eq!(metrics.total_assets.get(), 9);
    }

    #[test]
    fn pool_gauges_saturate() {
        let metrics = VaultMetrics::new();
        metrics.set_pool(u64::MAX, 42);
        assert_eq!(metrics.total_shares.get(), i64::MAX);
        assert_eq!(metrics.total_assets.get(), 42);
    }
}
