// HTTP error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type for HTTP handlers
pub type AppResult<T> = Result<T, AppError>;

/// Application error with HTTP status code
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.message)
    }
}

impl std::error::Error for AppError {}

/// Error response JSON structure
#[derive(Debug, Serialize, Deserialize)]
struct ErrorResponse {
    error: String,
    status: u16,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status;
        let body = Json(ErrorResponse {
            error: self.message,
            status: status.as_u16(),
        });

        (status, body).into_response()
    }
}

/// Convert registry errors to HTTP errors
impl From<topichub_core::Error> for AppError {
    fn from(err: topichub_core::Error) -> Self {
        use topichub_core::Error;

        match err {
            Error::UnknownIdentity(_) | Error::NotSubscribed { .. } => {
                Self::not_found(err.to_string())
            }
            Error::AlreadySubscribed { .. } => Self::conflict(err.to_string()),
            // Retryable: the caller may try again once the provider recovers.
            Error::ProviderUnavailable(_) | Error::ChannelCreateFailed { .. } => {
                tracing::warn!("provider error: {err}");
                Self::service_unavailable(err.to_string())
            }
            other => {
                tracing::error!("internal error: {other}");
                Self::internal_server_error("internal error")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use topichub_core::Error;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                Error::UnknownIdentity("u1".to_string()),
                StatusCode::NOT_FOUND,
            ),
            (
                Error::NotSubscribed {
                    identity: "u1".to_string(),
                    topic: "weather".to_string(),
                },
                StatusCode::NOT_FOUND,
            ),
            (
                Error::AlreadySubscribed {
                    identity: "u1".to_string(),
                    topic: "weather".to_string(),
                },
                StatusCode::CONFLICT,
            ),
            (
                Error::ProviderUnavailable("redis down".to_string()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                Error::IdentityGenerationExhausted { attempts: 10 },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(AppError::from(err).status, expected);
        }
    }
}
