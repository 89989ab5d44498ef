//! HTTP route handlers

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::state::AppState;
use super::websocket::ws_handler;
use crate::orchestrator::DispatchError;
use crate::protocol::{ConfigError, StartTestResponse, TestConfig, TestSummary};
use crate::store::StoreError;
use crate::summary;

/// Body returned by the summary endpoint when a test has no results
pub const SUMMARY_NOT_FOUND: &str = "Test not found or no results generated.";

/// Error response for the HTTP API
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    pub error: String,
    pub code: String,
}

impl ApiErrorResponse {
    fn new(error: impl Into<String>, code: &str) -> Self {
        Self {
            error: error.into(),
            code: code.to_string(),
        }
    }
}

impl From<ConfigError> for ApiErrorResponse {
    fn from(e: ConfigError) -> Self {
        Self::new(e.to_string(), "invalid_config")
    }
}

impl From<JsonRejection> for ApiErrorResponse {
    fn from(e: JsonRejection) -> Self {
        Self::new(e.body_text(), "invalid_config")
    }
}

impl From<DispatchError> for ApiErrorResponse {
    fn from(e: DispatchError) -> Self {
        Self::new(e.to_string(), "dispatch_unavailable")
    }
}

impl From<StoreError> for ApiErrorResponse {
    fn from(e: StoreError) -> Self {
        Self::new(e.to_string(), "store_error")
    }
}

impl IntoResponse for ApiErrorResponse {
    fn into_response(self) -> Response {
        let status = match self.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "invalid_config" => StatusCode::UNPROCESSABLE_ENTITY,
            "dispatch_unavailable" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

/// POST /api/run-test - Validate a configuration and queue the test
pub async fn run_test(
    State(state): State<AppState>,
    body: Result<Json<TestConfig>, JsonRejection>,
) -> Result<Json<StartTestResponse>, ApiErrorResponse> {
    let Json(config) = body.map_err(|e| {
        tracing::debug!("Rejected run-test body: {}", e);
        ApiErrorResponse::from(e)
    })?;

    config.validate(&state.limits).map_err(|e| {
        tracing::debug!("Rejected test config for {}: {}", config.url, e);
        ApiErrorResponse::from(e)
    })?;

    let response = state.orchestrator.start_test(config).await?;
    Ok(Json(response))
}

/// GET /api/test/:test_id/summary - Aggregate statistics for a test
pub async fn get_summary(
    State(state): State<AppState>,
    Path(test_id): Path<String>,
) -> Result<Json<TestSummary>, ApiErrorResponse> {
    let summary = summary::summarize(state.store.as_ref(), &test_id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to read results for test {}: {}", test_id, e);
            ApiErrorResponse::from(e)
        })?;

    summary
        .map(Json)
        .ok_or_else(|| ApiErrorResponse::new(SUMMARY_NOT_FOUND, "not_found"))
}

/// Response for GET /health
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub store: &'static str,
    pub uptime_seconds: u64,
}

/// GET /health - Liveness, including a store round trip
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let store_ready = match state.store.ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("Result store ({}) unavailable: {}", state.store.backend_name(), e);
            false
        }
    };

    let (http_status, status) = if store_ready {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        http_status,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION"),
            store: state.store.backend_name(),
            uptime_seconds: state.uptime_seconds(),
        }),
    )
}

/// CORS layer allowing any origin when `origins` contains `*`
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.iter().any(|o| o == "*") {
        return cors.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();
    cors.allow_origin(allowed)
}

/// Build the load test API routes
pub fn api_routes(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/run-test", post(run_test))
        .route("/api/test/:test_id/summary", get(get_summary))
        .route("/ws/:test_id", get(ws_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors_origins))
}
