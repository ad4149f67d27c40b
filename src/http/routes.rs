//! HTTP routes.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{middleware, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::middleware::{enforce_quota, QuotaGuard};
use crate::config::GateConfig;
use crate::flip::FlipQuota;
use crate::ratelimit::{QuotaEngine, Sweeper, FLIP_PATH};

/// Shared state for the API handlers.
#[derive(Clone)]
pub struct AppState {
    /// Daily flip quota shared by both flip handlers
    pub flips: Arc<FlipQuota>,
}

/// Build the application router from configuration.
pub fn app(config: &GateConfig) -> Router {
    router(guard(config), Arc::new(FlipQuota::new(config.flips)))
}

/// Build the quota guard described by the configuration.
pub fn guard(config: &GateConfig) -> QuotaGuard {
    let engine = QuotaEngine::new()
        .with_sweeper(Sweeper::new(config.rate_limiting.sweep_probability));
    QuotaGuard::new(Arc::new(engine), config.rate_limiting.rules.clone())
}

/// Build the router around an existing guard and flip quota.
///
/// Everything except `/health` sits behind the quota middleware.
pub fn router(guard: QuotaGuard, flips: Arc<FlipQuota>) -> Router {
    let api = Router::new()
        .route(FLIP_PATH, get(flip_status).post(perform_flip))
        .route_layer(middleware::from_fn_with_state(guard, enforce_quota))
        .with_state(AppState { flips });

    Router::new().route("/health", get(health)).merge(api)
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// `GET /api/flip`: can a flip happen today?
#[instrument(skip(state))]
async fn flip_status(State(state): State<AppState>) -> Response {
    Json(state.flips.status()).into_response()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FlipRequest {
    current_total: f64,
}

/// `POST /api/flip` with `{"currentTotal": <number>}`.
#[instrument(skip(state, body))]
async fn perform_flip(State(state): State<AppState>, body: Bytes) -> Response {
    let request: FlipRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "Rejected malformed flip request");
            return bad_request("Missing or invalid currentTotal");
        }
    };

    let previous_total = request.current_total;
    let outcome = state.flips.perform_flip(previous_total);

    match (outcome.success, outcome.new_total) {
        (true, Some(new_total)) => {
            info!(previous_total, new_total, "Flip request succeeded");
            let (previous_total, new_total) = (total_json(previous_total), total_json(new_total));
            Json(json!({
                "success": true,
                "previousTotal": previous_total,
                "newTotal": new_total,
                "message": format!("Flip successful! {} → {}", previous_total, new_total),
            }))
            .into_response()
        }
        _ => bad_request(outcome.error.as_deref().unwrap_or("Flip failed")),
    }
}

/// Whole totals go out as JSON integers, everything else as floats.
fn total_json(total: f64) -> Value {
    const MAX_EXACT: f64 = 9_007_199_254_740_992.0;
    if total.fract() == 0.0 && total.abs() <= MAX_EXACT {
        json!(total as i64)
    } else {
        json!(total)
    }
}

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}
