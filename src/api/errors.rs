use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::services::closed_correction::ClosedCorrectionError;
use crate::tasks::correction::{CorrectionError, ErrorKind};

#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: u16,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

#[derive(Debug)]
pub(crate) enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal { error: String, details: Option<String> },
}

impl ApiError {
    /// Log the underlying error with context and return an `Internal` variant.
    pub(crate) fn internal(err: impl std::fmt::Display, context: &str) -> Self {
        tracing::error!(error = %err, "{context}");
        Self::Internal { error: context.to_string(), details: Some(err.to_string()) }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, details) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message, None),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message, None),
            ApiError::Internal { error, details } => {
                tracing::error!(error = %error, details = ?details, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, error, details)
            }
        };

        (status, Json(ErrorResponse { status: status.as_u16(), error, details })).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<CorrectionError> for ApiError {
    fn from(err: CorrectionError) -> Self {
        match err.kind() {
            ErrorKind::Validation => ApiError::BadRequest(err.to_string()),
            ErrorKind::NotFound => ApiError::NotFound(err.to_string()),
            ErrorKind::Configuration => ApiError::Internal {
                error: "Correction pipeline is not configured".to_string(),
                details: Some(err.to_string()),
            },
            ErrorKind::Dependency => match err {
                CorrectionError::Publish(inner) => ApiError::Internal {
                    error: "Failed to publish correction jobs".to_string(),
                    details: Some(inner.to_string()),
                },
                other => ApiError::internal(other, "Correction failed"),
            },
        }
    }
}

impl From<ClosedCorrectionError> for ApiError {
    fn from(err: ClosedCorrectionError) -> Self {
        match err {
            ClosedCorrectionError::ExamNotFound(_) | ClosedCorrectionError::NoSubmissions(_) => {
                ApiError::NotFound(err.to_string())
            }
            ClosedCorrectionError::Store(inner) => {
                ApiError::internal(inner, "Failed to store closed-question grades")
            }
        }
    }
}
