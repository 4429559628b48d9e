//! Error bodies shared by the REST handlers: `{ "error": message }`.

use axum::{http::StatusCode, Json};
use serde_json::{json, Value};

use crate::dispatch::DispatchError;
use crate::store::StoreError;

pub type ApiError = (StatusCode, Json<Value>);

pub fn error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": message.into() })))
}

pub fn bad_request(message: impl Into<String>) -> ApiError {
    error(StatusCode::BAD_REQUEST, message)
}

pub fn not_found(kind: &str) -> ApiError {
    error(StatusCode::NOT_FOUND, format!("{} not found", kind))
}

pub fn store_error(e: StoreError) -> ApiError {
    match e {
        StoreError::Validation(message) => bad_request(message),
        StoreError::NotFound { .. } => error(StatusCode::NOT_FOUND, e.to_string()),
    }
}

pub fn dispatch_error(e: DispatchError) -> ApiError {
    match e {
        DispatchError::Store(e) => store_error(e),
        DispatchError::Upstream(_) | DispatchError::Timeout(_) => {
            error(StatusCode::BAD_GATEWAY, e.to_string())
        }
    }
}
