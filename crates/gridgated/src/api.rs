//! Host-facing HTTP handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio_util::sync::CancellationToken;

use gridgate_core::WorkloadInputs;
use gridgate_engine::{GateEngine, GateError};
use gridgate_metrics::GateMetrics;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<GateEngine>,
    pub metrics: Arc<GateMetrics>,
}

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

/// Build the daemon's router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/evaluate", post(evaluate))
        .route("/v1/release", post(release))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// POST /v1/evaluate — the host's pre-filter callback.
async fn evaluate(
    State(state): State<AppState>,
    Json(workload): Json<WorkloadInputs>,
) -> impl IntoResponse {
    match state
        .engine
        .evaluate(&workload, &CancellationToken::new())
        .await
    {
        Ok(decision) => ApiResponse::ok(decision).into_response(),
        Err(e) => {
            let status = match &e {
                GateError::InvalidAnnotation { .. } => StatusCode::BAD_REQUEST,
                GateError::CarbonUnavailable(_) | GateError::PricingUnavailable(_) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                GateError::MissingPricingConfig => StatusCode::SERVICE_UNAVAILABLE,
                GateError::Canceled => StatusCode::SERVICE_UNAVAILABLE,
                GateError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            error_response(&e.to_string(), status).into_response()
        }
    }
}

/// POST /v1/release — the host's post-bind callback; frees a slot.
async fn release(State(state): State<AppState>) -> impl IntoResponse {
    state.engine.release_binding();
    ApiResponse::ok(serde_json::json!({
        "in_flight": state.engine.in_flight(),
    }))
    .into_response()
}

/// GET /healthz — verifies the carbon feed end to end.
async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    match state.engine.health_check().await {
        Ok(()) => ApiResponse::ok("ok").into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::SERVICE_UNAVAILABLE).into_response(),
    }
}

/// GET /metrics — Prometheus text exposition.
async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match state.metrics.encode_text() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}
