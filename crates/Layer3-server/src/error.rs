//! HTTP mapping for [`desk_foundation::Error`]
//!
//! Validation failures become 4xx with a stable message. Anything
//! unexpected is logged in full and answered with a generic 500.

use axum::extract::multipart::MultipartError;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use desk_foundation::Error;
use serde_json::json;
use tracing::error;

pub const INVALID_PATH: &str = "Invalid path";
pub const INTERNAL_ERROR: &str = "Internal server error";

/// Handler result type
pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug)]
pub struct ApiError(pub Error);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            Error::PathEscape(_) | Error::Rejected(_) | Error::InvalidInput(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::AlreadyExists(_) => StatusCode::CONFLICT,
            Error::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Error::Upstream(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// What the client gets to see
    pub fn message(&self) -> String {
        match &self.0 {
            Error::PathEscape(_) => INVALID_PATH.to_string(),
            Error::Rejected(reason) => reason.message().to_string(),
            Error::NotFound(msg)
            | Error::AlreadyExists(msg)
            | Error::InvalidInput(msg)
            | Error::PayloadTooLarge(msg)
            | Error::Upstream(msg) => msg.clone(),
            _ => INTERNAL_ERROR.to_string(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        Self(Error::Io(err))
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self(Error::PayloadTooLarge("File too large".to_string()))
        } else {
            Self(Error::InvalidInput(format!("Malformed upload: {}", err.body_text())))
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(err: JsonRejection) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self(Error::PayloadTooLarge("Request body too large".to_string()))
        } else {
            Self(Error::InvalidInput(format!("Invalid request body: {}", err.body_text())))
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        }
        (status, Json(json!({ "ok": false, "error": self.message() }))).into_response()
    }
}
