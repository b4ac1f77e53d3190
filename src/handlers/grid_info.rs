use crate::core::state::AppState;
use crate::models::grid_info::GridInfo;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
};
use std::sync::Arc;

/// Grid description for viewers adding this grid
///
/// GET /get_grid_info
pub async fn grid_info_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let info = GridInfo::from_config(&state.config.grid);

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/xml")],
        info.to_xml(),
    )
}
