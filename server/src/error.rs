//! Unified error handling for the server.

use crate::sync::{StoreError, SyncError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use canopy_engine::Error as EngineError;
use serde::Serialize;

/// Application error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("Invalid request: {0}")]
    BadRequest(String),
}

impl From<EngineError> for AppError {
    fn from(e: EngineError) -> Self {
        AppError::Sync(SyncError::Engine(e))
    }
}

/// Error response body.
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

fn engine_status(e: &EngineError) -> StatusCode {
    match e {
        EngineError::EntityNotFound(_) | EngineError::SiteNotFound(_) => StatusCode::NOT_FOUND,
        EngineError::AlreadyLinked { .. }
        | EngineError::MappingConflict { .. }
        | EngineError::InvariantViolation { .. }
        | EngineError::EntityAlreadyExists(_) => StatusCode::CONFLICT,
        EngineError::NotEligible(_) => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::UnknownSyncType(_)
        | EngineError::InvalidPayload(_)
        | EngineError::MissingRequiredField(_)
        | EngineError::TypeMismatch { .. } => StatusCode::BAD_REQUEST,
    }
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Sync(SyncError::RegistryUnavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Sync(SyncError::SiteNotFound(_)) => StatusCode::NOT_FOUND,
            AppError::Sync(SyncError::RunInProgress { .. }) => StatusCode::CONFLICT,
            AppError::Sync(SyncError::Engine(e))
            | AppError::Sync(SyncError::Store(StoreError::Engine(e))) => engine_status(e),
            AppError::Sync(SyncError::Store(_)) | AppError::Sync(SyncError::Aborted(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (error_message, details) = match &self {
            AppError::Sync(SyncError::Store(e)) if status.is_server_error() => {
                tracing::error!("Store error: {:?}", e);
                ("Database error".to_string(), None)
            }
            AppError::Sync(SyncError::RegistryUnavailable(reason)) => {
                tracing::warn!("Registry unavailable: {}", reason);
                ("Registry unavailable".to_string(), Some(reason.clone()))
            }
            AppError::Sync(e) => {
                tracing::warn!("Sync error: {}", e);
                (e.to_string(), None)
            }
            AppError::BadRequest(msg) => (msg.clone(), None),
        };

        let body = Json(ErrorResponse {
            error: error_message,
            details,
        });

        (status, body).into_response()
    }
}

/// Result type alias for handlers.
pub type Result<T> = std::result::Result<T, AppError>;
