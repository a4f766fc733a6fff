// ============================================================================
// Error Handling Middleware - Production-Ready Error Responses
// ============================================================================
//
// Internal errors (database, encryption, connector internals) are logged
// server-side with full detail and returned to clients as generic messages.
// NotFound/BadRequest/Conflict carry developer-controlled messages only.
//
// ============================================================================

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::repositories::StoreError;
use crate::services::erp::connector::ConnectorError;
use crate::services::sync_orchestrator::OrchestratorError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("JSON parsing error: {0}")]
    JsonParsing(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("ERP unavailable: {0}")]
    ErpUnavailable(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("Encryption error: {0}")]
    Encryption(String),
}

impl From<crate::services::encryption_service::EncryptionError> for AppError {
    fn from(err: crate::services::encryption_service::EncryptionError) -> Self {
        // 🔒 SECURITY: Log detailed error server-side, but don't expose details to client
        tracing::error!("Encryption error: {:?}", err);
        AppError::Encryption("Encryption operation failed".to_string())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Database(e) => AppError::Database(e),
            other => AppError::Store(other),
        }
    }
}

impl From<ConnectorError> for AppError {
    fn from(err: ConnectorError) -> Self {
        match err {
            ConnectorError::Config(msg) => AppError::BadRequest(msg),
            other => AppError::ErpUnavailable(other.to_string()),
        }
    }
}

impl From<OrchestratorError> for AppError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::NotFound => {
                AppError::NotFound("Integration not found".to_string())
            }
            OrchestratorError::Inactive => {
                AppError::BadRequest("Integration is not active".to_string())
            }
            OrchestratorError::AlreadyRunning => {
                AppError::Conflict("A sync is already running for this integration".to_string())
            }
            OrchestratorError::Connection(e) => e.into(),
            OrchestratorError::Store(e) => e.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Database(err) => {
                // 🔒 SECURITY: Log detailed database error server-side only
                tracing::error!("Database error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Store(ref err) => {
                tracing::error!("Store error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::JsonParsing(ref e) => {
                tracing::error!("JSON parsing error: {:?}", e);
                (StatusCode::BAD_REQUEST, "Invalid JSON format".to_string())
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::ErpUnavailable(ref e) => {
                tracing::error!("ERP connector error: {}", e);
                (
                    StatusCode::BAD_GATEWAY,
                    "ERP system is unavailable".to_string(),
                )
            }
            AppError::Internal(err) => {
                // 🔒 SECURITY: Log detailed internal error server-side only
                tracing::error!("Internal error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Encryption(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Encryption error".to_string(),
            ),
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
