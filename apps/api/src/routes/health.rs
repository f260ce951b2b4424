//! Health check HTTP route handlers
//!
//! Provides endpoints for checking the health of the API and its
//! dependencies:
//! - `GET /health` - Simple liveness check (returns 200 OK)
//! - `GET /health/live` - Kubernetes-style liveness probe
//! - `GET /health/ready` - Readiness check (verifies the database)

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use sqlx::PgPool;
use std::time::Instant;

/// Shared application state for health check handlers
#[derive(Clone)]
pub struct HealthState {
    pool: PgPool,
}

impl HealthState {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Create health check router
pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/", get(simple_health))
        .route("/live", get(liveness_probe))
        .route("/ready", get(readiness_probe))
        .with_state(state)
}

/// Simple health check - always returns OK if the server is running
async fn simple_health() -> &'static str {
    "OK"
}

/// Liveness probe for Kubernetes
///
/// Returns 200 if the server process is running and can handle requests.
/// Does NOT check external dependencies - that is what readiness is for.
async fn liveness_probe() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "alive",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Status of an individual dependency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum ServiceStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Serialize)]
struct ReadinessResponse {
    status: ServiceStatus,
    database: ServiceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Readiness probe - verifies connectivity to the record store
async fn readiness_probe(State(state): State<HealthState>) -> impl IntoResponse {
    let start = Instant::now();
    let result: Result<i32, sqlx::Error> = sqlx::query_scalar("SELECT 1")
        .fetch_one(&state.pool)
        .await;

    let response = match result {
        Ok(_) => ReadinessResponse {
            status: ServiceStatus::Healthy,
            database: ServiceStatus::Healthy,
            response_time_ms: Some(start.elapsed().as_millis() as u64),
            error: None,
        },
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            ReadinessResponse {
                status: ServiceStatus::Unhealthy,
                database: ServiceStatus::Unhealthy,
                response_time_ms: None,
                error: Some(e.to_string()),
            }
        }
    };

    let status_code = if response.status == ServiceStatus::Healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(response))
}
