// HTTP routes configuration

use crate::core::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Viewer-facing endpoints
        .route("/login", post(crate::handlers::login::login_handler))
        .route("/simulator/login", post(crate::handlers::login::login_handler))
        .route("/get_grid_info", get(crate::handlers::grid_info::grid_info_handler))
        .route("/health", get(crate::handlers::health::health_handler))

        // Admin endpoints (require API key)
        .route("/metrics", get(crate::handlers::metrics::metrics_handler))

        // 404 fallback for all unmatched routes
        .fallback(crate::handlers::fallback::fallback_handler)

        .with_state(state)
}
