//! API error responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use td_core::envelope::{ApiEnvelope, ErrorCode};
use td_core::task::TaskId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Task {0} not found")]
    NotFound(TaskId),

    #[error("{0}")]
    Validation(String),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, ErrorCode) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, ErrorCode::NotFound),
            Self::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, ErrorCode::ValidationError),
        }
    }
}

impl From<td_core::Error> for ApiError {
    fn from(err: td_core::Error) -> Self {
        match err {
            td_core::Error::TaskNotFound(id) => Self::NotFound(id),
            td_core::Error::InvalidInput(message) => Self::Validation(message),
            td_core::Error::Serialization(e) => Self::Validation(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        tracing::debug!("Request failed with {}: {}", status, self);
        (status, Json(ApiEnvelope::<()>::failure(code, self.to_string()))).into_response()
    }
}
