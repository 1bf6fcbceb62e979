use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

/// Failures reported by a `DataStore` or `IncidentFeed`.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: Uuid },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("operation not supported by this store: {0}")]
    Unsupported(&'static str),

    #[error("rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("dispatch data unavailable: {0}")]
    DataUnavailable(String),

    /// Status write landed but the driver link did not. The delivery stays
    /// in progress with no driver until an operator resets it.
    #[error("partial commit for delivery {delivery_id} (driver {driver_id}): {source}")]
    PartialCommit {
        delivery_id: Uuid,
        driver_id: Uuid,
        #[source]
        source: StoreError,
    },

    /// The driver could not be re-read; nothing was written.
    #[error("driver {driver_id} could not be re-read: {source}")]
    DriverUnavailable {
        driver_id: Uuid,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("dispatch cycle aborted: {0}")]
    CycleAborted(String),

    #[error("dispatch interval must be at least one second, got {0}")]
    InvalidInterval(u64),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => AppError::NotFound(err.to_string()),
            StoreError::Unavailable(_) => AppError::Unavailable(err.to_string()),
            StoreError::Unsupported(_) => AppError::Internal(err.to_string()),
            StoreError::Rejected(_) => AppError::Conflict(err.to_string()),
        }
    }
}

impl From<DispatchError> for AppError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::DataUnavailable(_) => AppError::Unavailable(err.to_string()),
            DispatchError::PartialCommit { .. } => AppError::Conflict(err.to_string()),
            DispatchError::DriverUnavailable { .. } => AppError::Unavailable(err.to_string()),
            DispatchError::Store(inner) => inner.into(),
            DispatchError::CycleAborted(_) => AppError::Internal(err.to_string()),
            DispatchError::InvalidInterval(_) => AppError::BadRequest(err.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
