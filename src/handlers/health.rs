//! Liveness and health endpoints

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::loan::LoanService;

pub async fn root() -> &'static str {
    "LoanDesk API Server"
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    database: String,
    version: &'static str,
}

/// GET /health - report store connectivity
pub async fn health_check(
    State(service): State<Arc<LoanService>>,
) -> (StatusCode, Json<HealthResponse>) {
    let (status, code, database) = match service.store_health().await {
        Ok(()) => ("healthy", StatusCode::OK, "connected".to_string()),
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed");
            (
                "unhealthy",
                StatusCode::SERVICE_UNAVAILABLE,
                format!("error: {}", e),
            )
        }
    };

    (
        code,
        Json(HealthResponse {
            status,
            database,
            version: env!("CARGO_PKG_VERSION"),
        }),
    )
}
