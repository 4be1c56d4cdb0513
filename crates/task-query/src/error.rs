//! Error types for the query cache

use thiserror::Error;

use td_core::envelope::{ApiEnvelope, ErrorCode};

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, QueryError>;

/// Failure of a single outbound request, before any interpretation
#[derive(Debug, Error)]
pub enum FetchError {
    /// The server answered with a non-success status
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// No response was received
    #[error("Network failure: {0}")]
    Network(String),

    /// The request could not be built
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl FetchError {
    pub fn http(status: u16, body: impl Into<String>) -> Self {
        Self::Http {
            status,
            body: body.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }
}

/// Errors surfaced to callers of the cache
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Validation error: {message}")]
    Validation {
        status: Option<u16>,
        message: String,
    },

    #[error("Server error: {message}")]
    Server {
        status: Option<u16>,
        message: String,
        body: Option<String>,
    },

    #[error("Network failure: {message}")]
    Network { message: String },

    /// A superseded response was dropped
    #[error("Request superseded")]
    Cancelled,
}

impl QueryError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            status: None,
            message: message.into(),
        }
    }

    /// A success response without the payload it promised
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Server {
            status: None,
            message: message.into(),
            body: None,
        }
    }

    /// Whether the error should reach the user at all
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }

    /// HTTP status of the failed response, if one was received
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::NotFound { .. } => Some(404),
            Self::Validation { status, .. } | Self::Server { status, .. } => *status,
            Self::Network { .. } | Self::Cancelled => None,
        }
    }

    /// Classify an error block found in a response envelope
    pub(crate) fn from_code(code: ErrorCode, status: Option<u16>, message: String) -> Self {
        match code {
            ErrorCode::NotFound => Self::NotFound { message },
            ErrorCode::ValidationError => Self::Validation { status, message },
            ErrorCode::InternalServerError => Self::Server {
                status,
                message,
                body: None,
            },
        }
    }
}

impl From<FetchError> for QueryError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Http { status, body } => {
                // A structured error block wins over the bare status
                if let Ok(envelope) = serde_json::from_str::<ApiEnvelope<serde_json::Value>>(&body) {
                    if let Some(error) = envelope.error {
                        return Self::from_code(error.code, Some(status), error.message);
                    }
                }
                match status {
                    404 => Self::NotFound { message: body },
                    400 | 422 => Self::Validation {
                        status: Some(status),
                        message: body,
                    },
                    _ => Self::Server {
                        status: Some(status),
                        message: format!("Request failed with status {}", status),
                        body: Some(body),
                    },
                }
            }
            FetchError::Network(message) => Self::Network { message },
            FetchError::InvalidRequest(message) => Self::Validation {
                status: None,
                message,
            },
        }
    }
}

impl From<td_core::Error> for QueryError {
    fn from(err: td_core::Error) -> Self {
        match err {
            td_core::Error::TaskNotFound(id) => Self::NotFound {
                message: format!("Task {} not found", id),
            },
            td_core::Error::InvalidInput(message) => Self::validation(message),
            td_core::Error::Serialization(e) => Self::malformed(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping_without_error_block() {
        assert!(matches!(
            QueryError::from(FetchError::http(404, "missing")),
            QueryError::NotFound { .. }
        ));
        assert!(matches!(
            QueryError::from(FetchError::http(422, "bad")),
            QueryError::Validation { status: Some(422), .. }
        ));
        let err = QueryError::from(FetchError::http(503, "down"));
        assert_eq!(err.status(), Some(503));
        assert!(matches!(err, QueryError::Server { body: Some(ref b), .. } if b == "down"));
    }

    #[test]
    fn test_error_code_overrides_status() {
        let body = r#"{"success":false,"error":{"code":"validation_error","message":"Title cannot be empty"}}"#;
        let err = QueryError::from(FetchError::http(500, body));
        assert_eq!(
            err,
            QueryError::Validation {
                status: Some(500),
                message: "Title cannot be empty".to_string()
            }
        );
    }

    #[test]
    fn test_network_and_cancelled_visibility() {
        let err = QueryError::from(FetchError::network("connection refused"));
        assert!(matches!(err, QueryError::Network { .. }));
        assert!(err.is_user_visible());
        assert!(!QueryError::Cancelled.is_user_visible());
    }
}
