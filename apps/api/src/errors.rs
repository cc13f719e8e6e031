use std::collections::BTreeMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::profile::inline_edit::EditError;
use crate::profile::merge::ReconcileError;
use crate::profile::session::SessionError;
use crate::profile::store::StoreError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Validation failed for {} field(s)", .0.len())]
    InvalidFields(BTreeMap<String, String>),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Not initialized: {0}")]
    NotInitialized(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Commit failed: {0}")]
    CommitFailed(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Database(e) => AppError::Database(e),
            other => AppError::Internal(other.into()),
        }
    }
}

impl From<ReconcileError> for AppError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::IndexOutOfRange { .. } => AppError::NotFound(err.to_string()),
            other => AppError::Validation(other.to_string()),
        }
    }
}

impl From<EditError> for AppError {
    fn from(err: EditError) -> Self {
        match err {
            EditError::NotEditing | EditError::Busy => AppError::Conflict(err.to_string()),
            EditError::Invalid(msg) => AppError::Validation(msg),
            EditError::SaveFailed(msg) => AppError::CommitFailed(msg),
        }
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotInitialized(_) => AppError::NotInitialized(err.to_string()),
            SessionError::Closed => AppError::Conflict(err.to_string()),
            SessionError::NotFound(_) => AppError::NotFound(err.to_string()),
            SessionError::Invalid(fields) => AppError::InvalidFields(fields),
            SessionError::NotEditable(_) => AppError::Validation(err.to_string()),
            SessionError::Reconcile(e) => e.into(),
            SessionError::Commit(e) => AppError::CommitFailed(e.to_string()),
            SessionError::Edit(e) => e.into(),
            SessionError::Store(e) => e.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::InvalidFields(_) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                self.to_string(),
            ),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Authentication required".to_string(),
            ),
            AppError::NotInitialized(msg) => {
                (StatusCode::CONFLICT, "NOT_INITIALIZED", msg.clone())
            }
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            AppError::CommitFailed(msg) => {
                tracing::warn!("Commit failed: {msg}");
                (StatusCode::BAD_GATEWAY, "COMMIT_FAILED", msg.clone())
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let mut error = json!({
            "code": code,
            "message": message
        });
        if let AppError::InvalidFields(fields) = &self {
            error["fields"] = json!(fields);
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}
