use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::services::identity::IdentityError;
use crate::store::StoreError;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Unauthorized(&'static str),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Conflict(String),
    #[error("invalid request body: {0}")]
    Validation(#[from] validator::ValidationErrors),
    #[error("identity provider unavailable: {0}")]
    IdentityUnavailable(#[source] IdentityError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AppError {
    pub fn forbidden(message: impl Into<String>) -> Self {
        AppError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        AppError::NotFound(message.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        AppError::BadRequest(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) | AppError::Store(StoreError::Duplicate(_)) => StatusCode::CONFLICT,
            AppError::IdentityUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Store(StoreError::Database(
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_),
            )) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    // Store and provider details stay in the logs
    fn public_message(&self) -> String {
        match self {
            AppError::Store(StoreError::Duplicate(_)) => "Document already exists".to_string(),
            AppError::Store(_) if self.status() == StatusCode::SERVICE_UNAVAILABLE => {
                "Database temporarily unavailable".to_string()
            }
            AppError::Store(_) => "Internal server error".to_string(),
            AppError::IdentityUnavailable(_) => "Identity provider temporarily unavailable".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<IdentityError> for AppError {
    fn from(err: IdentityError) -> Self {
        if err.is_unavailable() {
            AppError::IdentityUnavailable(err)
        } else {
            tracing::debug!("Rejected bearer token: {}", err);
            AppError::Unauthorized("Unauthorized access")
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed with {}: {:?}", status, self);
        }
        let body = Json(json!({
            "success": false,
            "error": self.public_message(),
        }));
        (status, body).into_response()
    }
}
