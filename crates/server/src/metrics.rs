//! Prometheus metrics

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

use crate::state::AppState;

static HANDLE: OnceCell<Option<PrometheusHandle>> = OnceCell::new();

/// Install the global Prometheus recorder. Later calls return the same handle.
pub fn init_metrics() -> Option<PrometheusHandle> {
    HANDLE
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::error!(error = %e, "Failed to install Prometheus recorder");
                None
            },
        })
        .clone()
}

/// Count a served request
pub fn record_request(route: &'static str) {
    metrics::counter!("dialog_switch_requests_total", "route" => route).increment(1);
}

/// Count a refresh cycle outcome (`changed`, `unchanged` or `failed`)
pub fn record_refresh(role: &'static str, outcome: &'static str) {
    metrics::counter!("dialog_switch_refresh_total", "role" => role, "outcome" => outcome)
        .increment(1);
}

/// Count a request served by the default group
pub fn record_default_group(role: &'static str) {
    metrics::counter!("dialog_switch_default_group_total", "role" => role).increment(1);
}

/// Prometheus text exposition
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics disabled").into_response(),
    }
}
