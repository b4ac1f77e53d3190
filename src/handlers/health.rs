use crate::utils::time::current_timestamp;
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: i64,
    pub version: String,
}

impl HealthResponse {
    fn ok(now: i64) -> Self {
        Self {
            status: "ok".to_string(),
            timestamp: now,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Liveness check
///
/// GET /health
pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse::ok(current_timestamp())))
}
