use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Client-actionable code sent with a stale-session rejection. Clients that
/// see it can refresh silently instead of showing a hard error.
pub const REAUTH_REQUIRED: &str = "REAUTH_REQUIRED";
pub const ACCOUNT_DEACTIVATED: &str = "ACCOUNT_DEACTIVATED";
pub const ROLE_CHANGED: &str = "ROLE_CHANGED";

pub type Result<T> = core::result::Result<T, AppError>;

/// AppError
///
/// Every rejection a handler or extractor can produce. Authorization failures
/// deliberately carry no detail about which rule failed.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("missing or invalid credentials")]
    Unauthorized,

    #[error("account changed since the token was issued")]
    SessionStale,

    #[error("account is deactivated")]
    AccountDeactivated,

    #[error("role changed since the token was issued")]
    RoleChanged,

    #[error("access denied")]
    Forbidden,

    #[error("not found")]
    NotFound,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("internal error: {0}")]
    Internal(String),
}

/// RepositoryError
///
/// Raised by repository calls whose callers need to tell "no row" apart from
/// "the data store is down".
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("data store unavailable: {0}")]
    Unavailable(String),

    #[error("conflict: {0}")]
    Conflict(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized
            | AppError::SessionStale
            | AppError::AccountDeactivated
            | AppError::RoleChanged => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Repository(RepositoryError::Conflict(_)) => StatusCode::CONFLICT,
            AppError::Repository(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (error, code, message) = match &self {
            AppError::Unauthorized => ("unauthorized", None, "Authentication required".to_string()),
            AppError::SessionStale => (
                "session_stale",
                Some(REAUTH_REQUIRED),
                "Your account was updated. Please sign in again.".to_string(),
            ),
            AppError::AccountDeactivated => (
                "session_invalid",
                Some(ACCOUNT_DEACTIVATED),
                "This account has been deactivated.".to_string(),
            ),
            AppError::RoleChanged => (
                "session_invalid",
                Some(ROLE_CHANGED),
                "Your role has changed. Please sign in again.".to_string(),
            ),
            AppError::Forbidden => ("forbidden", None, "Access denied".to_string()),
            AppError::NotFound => ("not_found", None, "Not found".to_string()),
            AppError::BadRequest(msg) => ("bad_request", None, msg.clone()),
            AppError::Unavailable(msg) => {
                tracing::warn!("service unavailable: {}", msg);
                ("unavailable", None, "Service temporarily unavailable".to_string())
            }
            AppError::Repository(RepositoryError::Conflict(msg)) => ("conflict", None, msg.clone()),
            AppError::Repository(e) => {
                tracing::error!("repository error: {:?}", e);
                ("internal_error", None, "Internal error".to_string())
            }
            AppError::Internal(msg) => {
                tracing::error!("internal error: {}", msg);
                ("internal_error", None, "Internal error".to_string())
            }
        };

        let body = match code {
            Some(code) => json!({ "error": error, "code": code, "message": message }),
            None => json!({ "error": error, "message": message }),
        };

        (status, Json(body)).into_response()
    }
}
