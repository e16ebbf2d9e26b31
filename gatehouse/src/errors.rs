use crate::db::errors::DbError;
use axum::{
    Json,
    body::Body,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Empty bearer token; never reaches the cache or the database
    #[error("token may not be blank")]
    BlankToken,

    /// Token does not resolve to a user, or resolving it failed
    #[error("invalid token: {reason}")]
    InvalidToken { reason: String },

    /// Non-superuser account that has been deactivated
    #[error("user is not active")]
    InactiveUser,

    /// Token is older than the validity window of the user's role
    #[error("token outdated (superuser: {superuser})")]
    TokenExpired { superuser: bool },

    /// User has neither the required group nor the required permission
    #[error("permission check failed: {requirement}")]
    Unauthorized { requirement: String },

    /// Client address is inside its login cooldown
    #[error("too many requests")]
    ThrottledTooManyAttempts,

    /// Loading the user's organization failed (distinct from the user having none)
    #[error("failed to resolve organization: {0}")]
    TenantResolution(#[source] DbError),

    /// Non-superuser without an organization on a deployment that requires one
    #[error("user is not linked to an organization")]
    NoOrganization,

    /// Unknown email or wrong password
    #[error("invalid email or password")]
    InvalidCredentials,

    /// Superuser two-factor code missing or wrong
    #[error("2fa not valid")]
    InvalidSecondFactor,

    /// Invalid request data
    #[error("{message}")]
    BadRequest { message: String },

    /// Database operation error
    #[error(transparent)]
    Repository(#[from] DbError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::BlankToken | Error::InvalidToken { .. } | Error::TokenExpired { .. } | Error::InvalidCredentials | Error::InvalidSecondFactor => {
                StatusCode::UNAUTHORIZED
            }
            Error::InactiveUser | Error::Unauthorized { .. } | Error::NoOrganization => StatusCode::FORBIDDEN,
            Error::ThrottledTooManyAttempts => StatusCode::TOO_MANY_REQUESTS,
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::Repository(db_err) => match db_err {
                DbError::NotFound => StatusCode::NOT_FOUND,
                DbError::UnknownReference { .. } => StatusCode::BAD_REQUEST,
                DbError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::TenantResolution(_) | Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a stable, user-safe summary, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::BlankToken | Error::InvalidToken { .. } => "Error getting user by token".to_string(),
            Error::InactiveUser => "User inactive.".to_string(),
            Error::TokenExpired { .. } => "Login again.".to_string(),
            Error::Unauthorized { .. } => "You do not have the permission or are not in the correct group to do this".to_string(),
            Error::ThrottledTooManyAttempts => "Too many login attempts, try again later".to_string(),
            Error::TenantResolution(_) => "Error getting organization for user".to_string(),
            Error::NoOrganization => "User is not linked to an organization".to_string(),
            Error::InvalidCredentials => "Invalid email or password".to_string(),
            Error::InvalidSecondFactor => "2fa not valid".to_string(),
            Error::BadRequest { message } => message.clone(),
            Error::Repository(db_err) => match db_err {
                DbError::NotFound => "Resource not found".to_string(),
                DbError::UnknownReference { entity_type, names } => format!("Unknown {entity_type}: {}", names.join(", ")),
                DbError::Other(_) => "Database error occurred".to_string(),
            },
            Error::Other(_) => "Internal server error".to_string(),
        }
    }
}

/// JSON body of every error response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Full error description attached to error responses as an extension. Only
/// [`expose_error_details`] ever copies it into a body.
#[derive(Debug, Clone)]
pub struct ErrorDetail(pub String);

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::Repository(DbError::Other(_)) | Error::TenantResolution(_) | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Repository(_) => {
                tracing::warn!("Database error: {}", self);
            }
            Error::ThrottledTooManyAttempts => {
                tracing::warn!("Login throttled: {}", self);
            }
            Error::BlankToken
            | Error::InvalidToken { .. }
            | Error::InactiveUser
            | Error::TokenExpired { .. }
            | Error::Unauthorized { .. }
            | Error::NoOrganization
            | Error::InvalidCredentials
            | Error::InvalidSecondFactor => {
                tracing::info!("Authorization error: {}", self);
            }
            Error::BadRequest { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let body = ErrorResponse {
            detail: self.user_message(),
            error: None,
        };
        let mut response = (self.status_code(), Json(body)).into_response();
        response.extensions_mut().insert(ErrorDetail(format!("{self:#}")));
        response
    }
}

/// Debug-mode response layer: copies the full error into the `error` field of error bodies.
///
/// Installed by the router only when `debug` is enabled, so production responses carry the
/// stable summary and nothing else regardless of which error occurred.
pub async fn expose_error_details(request: Request<Body>, next: Next) -> Response {
    let mut response = next.run(request).await;
    let Some(ErrorDetail(detail)) = response.extensions_mut().remove::<ErrorDetail>() else {
        return response;
    };

    let status = response.status();
    let bytes = match axum::body::to_bytes(std::mem::take(response.body_mut()), usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!("Failed to read error body: {}", e);
            return status.into_response();
        }
    };
    let mut body: ErrorResponse = match serde_json::from_slice(&bytes) {
        Ok(body) => body,
        Err(_) => {
            *response.body_mut() = Body::from(bytes);
            return response;
        }
    };
    body.error = Some(detail);
    (status, Json(body)).into_response()
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
