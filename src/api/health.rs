use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::time::Instant;

use crate::controller::AppState;
use crate::domain::DataSetId;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    timestamp: chrono::DateTime<chrono::Utc>,
    store: ComponentHealth,
}

/// Health status of a component
#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// GET /health
///
/// Checks the store with a cheap read; a failing store reports 503.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let start = Instant::now();
    let sentinel = DataSetId::from("__health__");

    let (code, store) = match state.store.list_flows(&sentinel).await {
        Ok(_) => (
            StatusCode::OK,
            ComponentHealth {
                status: "healthy",
                latency_ms: Some(start.elapsed().as_millis() as u64),
                error: None,
            },
        ),
        Err(e) => {
            tracing::warn!(error = %format!("{e:#}"), "store health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                ComponentHealth {
                    status: "unhealthy",
                    latency_ms: None,
                    error: Some(e.to_string()),
                },
            )
        }
    };

    let response = HealthResponse {
        status: if code.is_success() { "healthy" } else { "degraded" },
        timestamp: chrono::Utc::now(),
        store,
    };

    (code, Json(response))
}
