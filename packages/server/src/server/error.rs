//! Maps submission errors to HTTP responses with a `{"detail": ...}` body.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::domains::submissions::SubmissionError;

const INTERNAL_DETAIL: &str = "internal server error";

/// Error returned by every route handler.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Submission(#[from] SubmissionError),

    /// Body or query string could not be decoded.
    #[error("malformed request: {0}")]
    Malformed(String),
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Malformed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Submission(err) => match err {
                SubmissionError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                SubmissionError::NotFound(_) => StatusCode::NOT_FOUND,
                SubmissionError::Unauthorized => StatusCode::UNAUTHORIZED,
                SubmissionError::IllegalTransition { .. } => StatusCode::CONFLICT,
                SubmissionError::StoreUnavailable(_)
                | SubmissionError::Staging { .. }
                | SubmissionError::DeliveryFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Client-facing message. Infrastructure causes stay in the logs.
    fn detail(&self) -> String {
        match self {
            ApiError::Malformed(message) => message.clone(),
            ApiError::Submission(err) => match err {
                SubmissionError::Validation(message) => message.clone(),
                SubmissionError::NotFound(_) => "submission not found".to_string(),
                SubmissionError::Unauthorized => "unauthorized".to_string(),
                SubmissionError::IllegalTransition { .. } => err.to_string(),
                SubmissionError::StoreUnavailable(_)
                | SubmissionError::Staging { .. }
                | SubmissionError::DeliveryFailed { .. } => INTERNAL_DETAIL.to_string(),
            },
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Malformed(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Malformed(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = ?self, "Request failed");
        }
        (
            status,
            Json(ErrorBody {
                detail: self.detail(),
            }),
        )
            .into_response()
    }
}
