use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;
use tracing::error;
use validator::ValidationErrors;

use crate::store::StoreError;

/// Every failure a handler can surface. Rendered as `{success: false, message}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("Validation failed")]
    InvalidFields(#[from] ValidationErrors),

    #[error("Cart is empty")]
    EmptyCart,

    #[error("{0}")]
    InvalidReference(String),

    #[error("{0}")]
    InsufficientStock(String),

    #[error("{0}")]
    InvalidTransition(String),

    /// Duplicate unique value the client can fix (e.g. an email already registered).
    #[error("{0}")]
    Duplicate(String),

    #[error("{0}")]
    Auth(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Internal server error")]
    Internal(String),

    #[error("Internal server error")]
    Store(#[from] StoreError),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<&'a ValidationErrors>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ApiError {
    fn detail(&self) -> Option<String> {
        match self {
            ApiError::Internal(detail) => Some(detail.clone()),
            ApiError::Store(err) => Some(err.to_string()),
            _ => None,
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_)
            | ApiError::InvalidFields(_)
            | ApiError::EmptyCart
            | ApiError::InvalidReference(_)
            | ApiError::InsufficientStock(_)
            | ApiError::InvalidTransition(_)
            | ApiError::Duplicate(_) => StatusCode::BAD_REQUEST,
            ApiError::Auth(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) | ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let detail = self.detail();
        if status.is_server_error() {
            error!(detail = ?detail, "Request failed");
        }

        let body = ErrorBody {
            success: false,
            message: self.to_string(),
            errors: match self {
                ApiError::InvalidFields(errors) => Some(errors),
                _ => None,
            },
            // details stay out of release builds
            error: if cfg!(debug_assertions) { detail } else { None },
        };

        HttpResponse::build(status).json(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[test]
    fn status_codes_follow_taxonomy() {
        let cases = [
            (ApiError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (ApiError::EmptyCart, StatusCode::BAD_REQUEST),
            (ApiError::InsufficientStock("x".into()), StatusCode::BAD_REQUEST),
            (ApiError::InvalidTransition("x".into()), StatusCode::BAD_REQUEST),
            (ApiError::Duplicate("x".into()), StatusCode::BAD_REQUEST),
            (ApiError::Auth("x".into()), StatusCode::UNAUTHORIZED),
            (ApiError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (ApiError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (ApiError::Conflict("x".into()), StatusCode::CONFLICT),
            (ApiError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(err.status_code(), status, "{err:?}");
        }
    }

    #[actix_web::test]
    async fn renders_failure_envelope() {
        let response = ApiError::NotFound("Order not found".into()).error_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let bytes = to_bytes(response.into_body()).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Order not found");
        assert!(body.get("errors").is_none());
    }

    #[actix_web::test]
    async fn internal_errors_hide_cause_in_message() {
        let response = ApiError::Internal("connection reset".into()).error_response();
        let bytes = to_bytes(response.into_body()).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["message"], "Internal server error");
    }
}
