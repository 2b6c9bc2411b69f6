//! # Error Types
//!
//! Error types for the school management backend using `thiserror`.

use std::fmt;

/// Custom result type for schoolhub operations
pub type Result<T> = std::result::Result<T, SchoolError>;

/// Main error type for the school management backend
#[derive(thiserror::Error, Debug)]
pub enum SchoolError {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Database and storage errors
    #[error("Database error: {context}")]
    Database {
        #[source]
        source: sqlx::Error,
        context: String,
    },

    /// I/O errors with additional context
    #[error("I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    /// Validation errors
    #[error("Validation error: {message}")]
    Validation { message: String, field: Option<String> },

    /// Authentication and authorization errors
    #[error("Authentication error: {message}")]
    Auth { message: String, error_type: AuthErrorType },

    /// Password setup token rejected
    #[error("{0}")]
    SetupToken(SetupTokenError),

    /// Resource not found errors. Also used for rows owned by another school.
    #[error("{resource_type} not found")]
    NotFound { resource_type: String, id: String },

    /// Resource conflict errors (e.g. duplicate email)
    #[error("{message}")]
    Conflict { message: String, resource_type: String },

    /// Outbound mail errors. Never fatal to the operation that triggered them.
    #[error("Mail delivery error: {message}")]
    Mail { message: String },

    /// Internal server errors
    #[error("Internal server error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Authentication error subtypes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorType {
    InvalidToken,
    ExpiredToken,
    RevokedToken,
    MissingToken,
    InsufficientPermissions,
    InvalidCredentials,
}

impl fmt::Display for AuthErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthErrorType::InvalidToken => write!(f, "invalid_token"),
            AuthErrorType::ExpiredToken => write!(f, "expired_token"),
            AuthErrorType::RevokedToken => write!(f, "revoked_token"),
            AuthErrorType::MissingToken => write!(f, "missing_token"),
            AuthErrorType::InsufficientPermissions => write!(f, "insufficient_permissions"),
            AuthErrorType::InvalidCredentials => write!(f, "invalid_credentials"),
        }
    }
}

/// Reasons a password setup token cannot authorize a password change.
///
/// Checked in declaration order: a missing row wins over a used one, and a
/// used one wins over an expired one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SetupTokenError {
    #[error("Invalid token")]
    Invalid,
    #[error("Token has already been used")]
    AlreadyUsed,
    #[error("Token has expired")]
    Expired,
}

impl SchoolError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), source: None }
    }

    /// Create a configuration error with source
    pub fn config_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Config { message: message.into(), source: Some(source) }
    }

    /// Create a database error with context
    pub fn database<S: Into<String>>(source: sqlx::Error, context: S) -> Self {
        Self::Database { source, context: context.into() }
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation { message: message.into(), field: None }
    }

    /// Create a validation error with field information
    pub fn validation_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Validation { message: message.into(), field: Some(field.into()) }
    }

    /// Create an authentication error
    pub fn auth<S: Into<String>>(message: S, error_type: AuthErrorType) -> Self {
        Self::Auth { message: message.into(), error_type }
    }

    /// Create a not found error
    pub fn not_found<R: Into<String>, I: Into<String>>(resource_type: R, id: I) -> Self {
        Self::NotFound { resource_type: resource_type.into(), id: id.into() }
    }

    /// Create a conflict error
    pub fn conflict<M: Into<String>, R: Into<String>>(message: M, resource_type: R) -> Self {
        Self::Conflict { message: message.into(), resource_type: resource_type.into() }
    }

    /// Create a mail delivery error
    pub fn mail<S: Into<String>>(message: S) -> Self {
        Self::Mail { message: message.into() }
    }

    /// Create an internal server error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    /// Get the HTTP status code that should be returned for this error
    pub fn status_code(&self) -> u16 {
        match self {
            SchoolError::Config { .. } => 500,
            SchoolError::Database { .. } => 500,
            SchoolError::Io { .. } => 500,
            SchoolError::Validation { .. } => 400,
            SchoolError::Auth { error_type: AuthErrorType::InsufficientPermissions, .. } => 403,
            SchoolError::Auth { .. } => 401,
            SchoolError::SetupToken(_) => 400,
            SchoolError::NotFound { .. } => 404,
            SchoolError::Conflict { .. } => 400,
            SchoolError::Mail { .. } => 502,
            SchoolError::Internal { .. } => 500,
        }
    }

    /// True when the error is a unique-constraint violation reported by the store.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            SchoolError::Database { source, .. } => is_unique_violation(source),
            _ => false,
        }
    }
}

/// Detect unique-constraint failures on a raw `sqlx` error.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error().is_some_and(|db_err| db_err.is_unique_violation())
}

impl From<SetupTokenError> for SchoolError {
    fn from(error: SetupTokenError) -> Self {
        Self::SetupToken(error)
    }
}

impl From<sqlx::Error> for SchoolError {
    fn from(error: sqlx::Error) -> Self {
        Self::Database { source: error, context: "Database operation failed".to_string() }
    }
}

impl From<std::io::Error> for SchoolError {
    fn from(error: std::io::Error) -> Self {
        Self::Io { source: error, context: "I/O operation failed".to_string() }
    }
}

impl From<validator::ValidationErrors> for SchoolError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
        fields.sort_by(|a, b| a.0.cmp(&b.0));

        let message = fields
            .iter()
            .map(|(field, field_errors)| {
                let error_messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| {
                        e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string())
                    })
                    .collect();
                format!("{}: {}", field, error_messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");

        Self::validation(message)
    }
}
