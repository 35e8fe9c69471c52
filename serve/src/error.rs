//! Error-to-response mapping: caller errors become 400 (409 for a double
//! execute), everything unexpected becomes 500 with a logged cause.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use gauntlet::{EngineError, StoreError};
use serde_json::json;

pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, message = %self.message, "request failed");
        }
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let status = match &err {
            EngineError::AlreadyRunning(_) => StatusCode::CONFLICT,
            EngineError::Store(e) => return store_error(e, err.to_string()),
            _ => StatusCode::BAD_REQUEST,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        let message = err.to_string();
        store_error(&err, message)
    }
}

fn store_error(err: &StoreError, message: String) -> ApiError {
    let status = match err {
        StoreError::NotFound(_)
        | StoreError::InvalidTransition { .. }
        | StoreError::DeleteProtected(_) => StatusCode::BAD_REQUEST,
        StoreError::Corrupt(_) | StoreError::Sqlite(_) | StoreError::Serde(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    ApiError { status, message }
}
