use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;

use crate::blob::BlobError;
use crate::error::Error;

/// Standard API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    #[must_use]
    pub fn success(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> ApiResponse<()> {
        ApiResponse {
            data: None,
            error: Some(message.into()),
        }
    }
}

/// API error that converts to a proper HTTP response
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({ "data": null, "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

/// Missing and forbidden are reported identically, so a caller cannot probe
/// for projects or entities it has no access to.
impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::DuplicateNameInFolder => Self::conflict(err.to_string()),
            Error::NotFoundOrNotAuthorized | Error::Blob(BlobError::NotFound) => {
                Self::not_found("Not found")
            }
            Error::CannotMoveIntoSelfOrDescendant
            | Error::CannotMutateRootFolder
            | Error::Validation(_) => Self::bad_request(err.to_string()),
            Error::Database { .. }
            | Error::BadRandomSource
            | Error::TokenCollision
            | Error::Blob(_)
            | Error::Io(_)
            | Error::Config(_) => {
                tracing::error!("request failed: {err}");
                Self::internal("Internal server error")
            }
        }
    }
}
