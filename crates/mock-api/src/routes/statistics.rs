//! Statistics endpoint

use axum::{extract::State, routing::get, Json, Router};
use td_core::envelope::ApiEnvelope;
use td_core::statistics::TaskStatistics;

use crate::state::AppState;

/// GET /statistics - Aggregate task counters
async fn get_statistics(State(state): State<AppState>) -> Json<ApiEnvelope<TaskStatistics>> {
    Json(ApiEnvelope::ok(state.statistics().await))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/statistics", get(get_statistics))
}
