//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Application-wide error type.
///
/// Every service returns `Result<T, AppError>`; handlers let axum turn the
/// error into a response, so no failure escapes as a panic or a bare 500.
///
/// # Error Categories
///
/// - **Database Errors**: Any sqlx::Error from database operations
/// - **Authentication Errors**: Invalid or missing center API keys and portal tokens
/// - **Resource Errors**: Requested students or audit records not found
/// - **Validation Errors**: Invalid request data or an unusable CSV upload
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed (e.g., connection error, query error).
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Center API key is missing, invalid, or inactive.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("Invalid API key")]
    InvalidApiKey,

    /// Portal token is missing, expired, revoked, or not allowed to see this view.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("Invalid portal token")]
    InvalidPortalToken,

    /// Student does not exist or belongs to another center.
    ///
    /// Returns HTTP 404 Not Found.
    #[error("Student not found")]
    StudentNotFound,

    /// Audit record does not exist or belongs to another center.
    ///
    /// Returns HTTP 404 Not Found.
    #[error("Audit log not found")]
    AuditLogNotFound,

    /// Portal token record does not exist or belongs to another center.
    ///
    /// Returns HTTP 404 Not Found.
    #[error("Portal token not found")]
    PortalTokenNotFound,

    /// Request body or parameters are invalid.
    ///
    /// Returns HTTP 400 Bad Request.
    #[error("Invalid request")]
    InvalidRequest(String),

    /// The uploaded CSV cannot be imported at all (empty, or required columns missing).
    ///
    /// Returns HTTP 422 Unprocessable Entity.
    #[error("Import rejected: {0}")]
    Import(String),

    /// Signing a portal token failed.
    ///
    /// Returns HTTP 500, details are only logged.
    #[error("Token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

impl AppError {
    /// Message safe to show to API clients.
    ///
    /// Database and signing failures are reduced to a generic message; their
    /// details only go to the log.
    pub fn client_message(&self) -> String {
        match self {
            AppError::Database(_) | AppError::Token(_) => "An internal error occurred".to_string(),
            AppError::InvalidRequest(msg) | AppError::Import(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

/// Convert AppError into an HTTP response.
///
/// # Response Format
///
/// ```json
/// {
///   "success": false,
///   "error": {
///     "code": "error_type",
///     "message": "Human-readable error message"
///   }
/// }
/// ```
///
/// # Status Code Mapping
///
/// - `InvalidApiKey`, `InvalidPortalToken` → 401 Unauthorized
/// - `StudentNotFound`, `AuditLogNotFound`, `PortalTokenNotFound` → 404 Not Found
/// - `InvalidRequest` → 400 Bad Request
/// - `Import` → 422 Unprocessable Entity
/// - `Database`, `Token` → 500 Internal Server Error (hides details from client)
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::InvalidApiKey => (
                StatusCode::UNAUTHORIZED,
                "invalid_api_key",
                self.to_string(),
            ),
            AppError::InvalidPortalToken => (
                StatusCode::UNAUTHORIZED,
                "invalid_portal_token",
                self.to_string(),
            ),
            AppError::StudentNotFound => {
                (StatusCode::NOT_FOUND, "student_not_found", self.to_string())
            }
            AppError::AuditLogNotFound => (
                StatusCode::NOT_FOUND,
                "audit_log_not_found",
                self.to_string(),
            ),
            AppError::PortalTokenNotFound => (
                StatusCode::NOT_FOUND,
                "portal_token_not_found",
                self.to_string(),
            ),
            AppError::InvalidRequest(ref msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", msg.clone())
            }
            AppError::Import(ref msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "import_rejected",
                msg.clone(),
            ),
            AppError::Database(ref e) => {
                tracing::error!(error = %e, "database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
            AppError::Token(ref e) => {
                tracing::error!(error = %e, "portal token signing failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "success": false,
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn invalid_request_keeps_its_message() {
        let response =
            AppError::InvalidRequest("Amount must be positive".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "invalid_request");
        assert_eq!(body["error"]["message"], "Amount must be positive");
    }

    #[tokio::test]
    async fn database_errors_are_hidden() {
        let response = AppError::Database(sqlx::Error::RowNotFound).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "internal_error");
        assert_eq!(body["error"]["message"], "An internal error occurred");
    }

    #[test]
    fn client_message_hides_internals() {
        assert_eq!(
            AppError::Database(sqlx::Error::PoolTimedOut).client_message(),
            "An internal error occurred"
        );
        assert_eq!(AppError::StudentNotFound.client_message(), "Student not found");
    }

    #[test]
    fn status_mapping() {
        assert_eq!(
            AppError::StudentNotFound.into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::InvalidPortalToken.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::Import("missing columns".into())
                .into_response()
                .status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }
}
