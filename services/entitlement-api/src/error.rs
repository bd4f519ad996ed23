//! Error types for the Entitlement API service.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use slate_core::EngineError;
use slate_types::PromoRejection;

/// API error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// API error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(&'static str),

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("{0}")]
    Promo(PromoRejection),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Promo(reason) => match reason {
                PromoRejection::CodeNotFound => StatusCode::NOT_FOUND,
                PromoRejection::CodeExpired | PromoRejection::CodeExhausted => StatusCode::GONE,
                PromoRejection::AlreadyRedeemed => StatusCode::CONFLICT,
                PromoRejection::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            },
            Self::Engine(e) => StatusCode::from_u16(e.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::Promo(reason) => reason.code(),
            Self::Engine(e) => e.error_code(),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::Engine(EngineError::QuotaExceeded { requested, used, total }) => Some(
                serde_json::json!({ "requested": requested, "used": used, "total": total }),
            ),
            _ => None,
        }
    }

    fn message(&self) -> String {
        match self {
            // Internals stay in the logs.
            Self::Engine(e) if e.status_code() >= 500 => "internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(error = ?self, "Internal API error");
        }

        let body = ErrorResponse {
            error: ErrorDetail {
                code: self.error_code().to_string(),
                message: self.message(),
                details: self.details(),
            },
        };

        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
