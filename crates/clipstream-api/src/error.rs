//! The single error type every handler returns.

use axum::{
    Json,
    extract::multipart::MultipartError,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use clipstream_media::MediaError;

/// An HTTP status plus a message, serialized as
/// `{status, data: null, message, errors, success: false}`.
#[derive(Debug, Error)]
#[error("{status}: {message}")]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub errors: Vec<String>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    status: u16,
    data: Option<()>,
    message: &'a str,
    errors: &'a [String],
    success: bool,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            errors: Vec::new(),
        }
    }

    pub fn with_errors(mut self, errors: Vec<String>) -> Self {
        self.errors = errors;
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            status: self.status.as_u16(),
            data: None,
            message: &self.message,
            errors: &self.errors,
            success: false,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        // A UNIQUE constraint firing means another request claimed the
        // username/email between our existence check and the write.
        if clipstream_db::is_unique_violation(&err) {
            return ApiError::conflict("User with email or username already exists");
        }
        error!("Internal error: {:#}", err);
        ApiError::internal("Something went wrong")
    }
}

impl From<MediaError> for ApiError {
    fn from(err: MediaError) -> Self {
        error!("Media upload failed: {}", err);
        ApiError::new(StatusCode::BAD_GATEWAY, "Error while uploading file")
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::new(err.status(), format!("Invalid multipart body: {}", err.body_text()))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::new(rejection.status(), rejection.body_text())
    }
}
