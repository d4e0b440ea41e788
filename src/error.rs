use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::storage::StorageError;

pub const INVALID_TOKEN_MESSAGE: &str = "Token inválido";
pub const INTERNAL_ERROR_MESSAGE: &str = "Error interno del servidor";

/// Request-level failures. Every variant aborts the current request.
#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("submission {0} was already reviewed")]
    AlreadyReviewed(i64),

    #[error("storage upload failed: {0}")]
    Storage(#[from] StorageError),

    #[error("persistence failure: {0:#}")]
    Persistence(#[source] anyhow::Error),

    #[error("internal error: {0:#}")]
    Internal(#[source] anyhow::Error),
}

pub type IntakeResult<T> = Result<T, IntakeError>;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl IntakeError {
    pub fn unauthorized() -> Self {
        IntakeError::Unauthorized(INVALID_TOKEN_MESSAGE.to_string())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            IntakeError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            IntakeError::BadRequest(_) => StatusCode::BAD_REQUEST,
            IntakeError::NotFound(_) => StatusCode::NOT_FOUND,
            IntakeError::AlreadyReviewed(_) => StatusCode::CONFLICT,
            IntakeError::Storage(_) | IntakeError::Persistence(_) | IntakeError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to show to the caller. Server-side faults never leak details.
    pub fn client_message(&self) -> String {
        match self {
            IntakeError::Unauthorized(message)
            | IntakeError::BadRequest(message)
            | IntakeError::NotFound(message) => message.clone(),
            IntakeError::AlreadyReviewed(_) => "La solicitud ya fue revisada".to_string(),
            IntakeError::Storage(_) | IntakeError::Persistence(_) | IntakeError::Internal(_) => {
                INTERNAL_ERROR_MESSAGE.to_string()
            }
        }
    }
}

impl IntoResponse for IntakeError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(err = %self, "request failed");
        }
        (
            status,
            Json(ErrorBody {
                error: self.client_message(),
            }),
        )
            .into_response()
    }
}
