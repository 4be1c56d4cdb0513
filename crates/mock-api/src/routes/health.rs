//! Health check endpoint

use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use crate::routes::test_util::send;
    use crate::state::AppState;

    #[tokio::test]
    async fn test_health_is_served_outside_the_api_prefix() {
        let (status, payload) = send(&AppState::new(), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload["status"], "ok");
    }
}
