//! Authentication errors and their HTTP mapping.

use actix_web::{
    http::{header, StatusCode},
    HttpResponse, ResponseError,
};
use serde::Serialize;
use thiserror::Error;

use crate::db::StoreError;
use crate::password::PasswordError;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Stored password hash could not be parsed.
    #[error("stored credential is corrupt")]
    CorruptCredential,

    #[error("malformed token")]
    MalformedToken,

    #[error("invalid token signature")]
    InvalidSignature,

    #[error("token expired")]
    TokenExpired,

    #[error("identity already registered")]
    DuplicateIdentity,

    #[error("identity not found")]
    IdentityNotFound,

    /// Wrong password or unknown identity; the two are never told apart.
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("account is inactive")]
    InactiveAccount,

    /// Authenticated, but the role does not allow the operation.
    #[error("insufficient permissions")]
    Forbidden,

    /// Target of an administrative operation does not exist.
    #[error("user not found")]
    UserNotFound,

    #[error("invalid reset code")]
    InvalidResetCode,

    #[error("reset code expired")]
    ResetCodeExpired,

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error(transparent)]
    InvalidPassword(#[from] PasswordError),

    #[error("store error: {0}")]
    Store(StoreError),

    #[error("internal auth error: {0}")]
    Internal(String),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict => AuthError::DuplicateIdentity,
            StoreError::NotFound => AuthError::IdentityNotFound,
            other => AuthError::Store(other),
        }
    }
}

impl AuthError {
    fn error_code(&self) -> &'static str {
        match self {
            AuthError::CorruptCredential => "internal_error",
            AuthError::MalformedToken => "malformed_token",
            AuthError::InvalidSignature => "invalid_token",
            AuthError::TokenExpired => "token_expired",
            AuthError::DuplicateIdentity => "duplicate_identity",
            AuthError::IdentityNotFound => "invalid_token",
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::InactiveAccount => "inactive_account",
            AuthError::Forbidden => "insufficient_permissions",
            AuthError::UserNotFound => "user_not_found",
            AuthError::InvalidResetCode => "invalid_reset_code",
            AuthError::ResetCodeExpired => "reset_code_expired",
            AuthError::InvalidParameter(_) => "invalid_parameter",
            AuthError::InvalidIdentity(_) => "invalid_identity",
            AuthError::InvalidName(_) => "invalid_name",
            AuthError::InvalidPassword(_) => "invalid_password",
            AuthError::Store(_) | AuthError::Internal(_) => "internal_error",
        }
    }

    /// Message safe to send to the client.
    fn public_message(&self) -> String {
        match self {
            AuthError::InvalidCredentials => "Invalid email or password".to_string(),
            AuthError::MalformedToken
            | AuthError::InvalidSignature
            | AuthError::IdentityNotFound => "Could not validate credentials".to_string(),
            AuthError::TokenExpired => "Token expired".to_string(),
            AuthError::InactiveAccount => {
                "Inactive user. Contact the administrator.".to_string()
            }
            AuthError::Forbidden => "Administrator privileges required".to_string(),
            AuthError::UserNotFound => "User not found".to_string(),
            AuthError::InvalidResetCode => "Invalid reset code".to_string(),
            AuthError::ResetCodeExpired => {
                "Reset code expired. Request a new one.".to_string()
            }
            AuthError::DuplicateIdentity => "Identity is already registered".to_string(),
            AuthError::InvalidIdentity(_)
            | AuthError::InvalidName(_)
            | AuthError::InvalidPassword(_)
            | AuthError::InvalidParameter(_) => self.to_string(),
            AuthError::CorruptCredential | AuthError::Store(_) | AuthError::Internal(_) => {
                "Internal server error".to_string()
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    detail: String,
    error_code: &'static str,
}

impl ResponseError for AuthError {
    fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MalformedToken
            | AuthError::InvalidSignature
            | AuthError::TokenExpired
            | AuthError::IdentityNotFound
            | AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AuthError::InactiveAccount | AuthError::Forbidden => StatusCode::FORBIDDEN,
            AuthError::UserNotFound => StatusCode::NOT_FOUND,
            AuthError::InvalidResetCode | AuthError::ResetCodeExpired => StatusCode::BAD_REQUEST,
            AuthError::DuplicateIdentity => StatusCode::CONFLICT,
            AuthError::InvalidIdentity(_)
            | AuthError::InvalidName(_)
            | AuthError::InvalidPassword(_)
            | AuthError::InvalidParameter(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AuthError::CorruptCredential | AuthError::Store(_) | AuthError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(
                event = "request.failed",
                error = %self,
                "internal error while handling request"
            );
        }

        let mut builder = HttpResponse::build(status);
        if status == StatusCode::UNAUTHORIZED {
            builder.insert_header((header::WWW_AUTHENTICATE, "Bearer"));
        }
        builder.json(ErrorBody {
            detail: self.public_message(),
            error_code: self.error_code(),
        })
    }
}
