use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ingest_domain::FieldError;
use serde_json::json;

pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError { status: StatusCode::BAD_REQUEST, message: msg.into() }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ApiError { status: StatusCode::NOT_FOUND, message: msg.into() }
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        ApiError { status: StatusCode::CONFLICT, message: msg.into() }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        ApiError { status: StatusCode::INTERNAL_SERVER_ERROR, message: msg.into() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

impl From<ingest_store::StoreError> for ApiError {
    fn from(e: ingest_store::StoreError) -> Self {
        use ingest_store::StoreError::*;
        let message = e.to_string();
        match e {
            ScheduleNotFound(_) | JobRunNotFound(_) | RunNotFound(_) => ApiError::not_found(message),
            ScheduleNameExists(_) | Conflict(_) => ApiError::conflict(message),
            InvalidCronExpression(_) => ApiError::bad_request(message),
            JobRunNotClaimable(_) => ApiError::conflict(message),
            Serialization(_) | Internal(_) => ApiError::internal(message),
        }
    }
}

impl From<ingest_plugin::PluginError> for ApiError {
    fn from(e: ingest_plugin::PluginError) -> Self {
        use ingest_plugin::PluginError::*;
        let message = e.to_string();
        match e {
            NotFound(_) => ApiError::not_found(message),
            AlreadyRegistered(_) => ApiError::conflict(message),
            ConfigInvalid(_) => ApiError::bad_request(message),
            DiscoveryFailed(_) | Cancelled => ApiError::internal(message),
        }
    }
}

impl From<ingest_scheduler::SchedulerError> for ApiError {
    fn from(e: ingest_scheduler::SchedulerError) -> Self {
        match e {
            ingest_scheduler::SchedulerError::Store(inner) => inner.into(),
            ingest_scheduler::SchedulerError::Plugin(inner) => inner.into(),
            other => ApiError::internal(other.to_string()),
        }
    }
}

/// Shape returned by `POST /ingestion/validate`.
pub fn validation_errors_response(errors: Vec<FieldError>) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "valid": false, "errors": errors }))).into_response()
}
