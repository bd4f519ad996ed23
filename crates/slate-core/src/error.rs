//! Engine errors

use thiserror::Error;

use crate::identity::IdentityError;

/// Entitlement engine errors
#[derive(Error, Debug)]
pub enum EngineError {
    /// No entitlement exists for the user
    #[error("user not found")]
    UserNotFound,

    /// The page allowance would be exceeded
    #[error("quota exceeded: {used} of {total} pages used, {requested} requested")]
    QuotaExceeded { requested: i32, used: i32, total: i32 },

    /// Request failed boundary validation
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Callback origin could not be verified
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// Credential is malformed or badly signed
    #[error("invalid token")]
    InvalidToken,

    /// Credential has expired
    #[error("token expired")]
    TokenExpired,

    /// Identity token rejected at login
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The identity was deleted and banned
    #[error("account permanently deleted")]
    AccountPermanentlyDeleted,

    /// Grace period elapsed; the account is being removed
    #[error("account deletion in progress")]
    AccountDeleting,

    /// Identity provider error
    #[error("identity provider error: {0}")]
    Identity(#[from] IdentityError),

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidInput(_) => 400,
            Self::InvalidSignature(_)
            | Self::InvalidToken
            | Self::TokenExpired
            | Self::InvalidCredentials => 401,
            Self::QuotaExceeded { .. } => 402,
            Self::AccountPermanentlyDeleted => 403,
            Self::UserNotFound => 404,
            Self::AccountDeleting => 409,
            Self::Identity(_) => 502,
            Self::Database(_) | Self::Configuration(_) | Self::Internal(_) => 500,
        }
    }

    /// Get error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::UserNotFound => "USER_NOT_FOUND",
            Self::QuotaExceeded { .. } => "QUOTA_EXCEEDED",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::InvalidSignature(_) => "INVALID_SIGNATURE",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::AccountPermanentlyDeleted => "ACCOUNT_PERMANENTLY_DELETED",
            Self::AccountDeleting => "ACCOUNT_DELETION_IN_PROGRESS",
            Self::Identity(_) => "IDENTITY_PROVIDER_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the caller may retry the same request later
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Identity(_) | Self::Database(_))
    }
}

impl From<slate_db::DbError> for EngineError {
    fn from(err: slate_db::DbError) -> Self {
        tracing::error!("Database error: {}", err);
        Self::Database(err.to_string())
    }
}

/// Result alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
