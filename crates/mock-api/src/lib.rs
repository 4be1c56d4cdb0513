//! In-memory implementation of the task dashboard REST API.
//!
//! Serves the task, bulk and statistics endpoints under `/api/v1` plus a
//! `/health` liveness check. State lives in memory and is lost on restart.

pub mod error;
pub mod routes;
pub mod state;

use axum::Router;

pub use error::ApiError;
pub use state::AppState;

/// Prefix every API route is mounted under
pub const API_PREFIX: &str = "/api/v1";

/// Build the full application router over `state`
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::health::router())
        .nest(API_PREFIX, routes::api_router())
        .with_state(state)
}
