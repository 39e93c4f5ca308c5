//! # Error Types
//!
//! Error taxonomy for the hackathon backend using `thiserror`.

use std::fmt;

/// Custom result type for hackathon operations
pub type Result<T> = std::result::Result<T, HackathonError>;

/// Main error type for the hackathon backend
#[derive(thiserror::Error, Debug)]
pub enum HackathonError {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

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
    Validation {
        message: String,
        field: Option<String>,
    },

    /// Authentication errors (missing, invalid or expired credentials)
    #[error("Authentication error: {message}")]
    Auth {
        message: String,
        error_type: AuthErrorType,
    },

    /// The caller is authenticated but not allowed to perform the action
    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    /// Account lifecycle gate rejections
    #[error("Account not permitted: {message}")]
    AccountState {
        message: String,
        state: AccountStateRejection,
    },

    /// Resource not found errors
    #[error("Resource not found: {resource_type} with ID '{id}'")]
    NotFound {
        resource_type: String,
        id: String,
    },

    /// Resource conflict errors (e.g., already exists, team full)
    #[error("Resource conflict: {message}")]
    Conflict {
        message: String,
        resource_type: String,
    },

    /// Outbound mail failures
    #[error("Mail delivery error: {message}")]
    Mail {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Internal server errors
    #[error("Internal server error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Timeout errors
    #[error("Operation timed out: {operation} after {duration_ms}ms")]
    Timeout {
        operation: String,
        duration_ms: u64,
    },
}

/// Authentication error subtypes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorType {
    InvalidToken,
    MissingToken,
    InvalidCredentials,
    InvalidPasscode,
}

impl fmt::Display for AuthErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthErrorType::InvalidToken => write!(f, "invalid_token"),
            AuthErrorType::MissingToken => write!(f, "missing_token"),
            AuthErrorType::InvalidCredentials => write!(f, "invalid_credentials"),
            AuthErrorType::InvalidPasscode => write!(f, "invalid_passcode"),
        }
    }
}

/// Why the account state gate refused a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountStateRejection {
    Banned,
    Unverified,
    ProfileIncomplete,
}

impl AccountStateRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStateRejection::Banned => "banned",
            AccountStateRejection::Unverified => "unverified",
            AccountStateRejection::ProfileIncomplete => "profile_incomplete",
        }
    }
}

impl fmt::Display for AccountStateRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl HackathonError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into() }
    }

    /// Create a database error with context
    pub fn database<S: Into<String>>(source: sqlx::Error, context: S) -> Self {
        Self::Database {
            source,
            context: context.into(),
        }
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
            field: None,
        }
    }

    /// Create a validation error with field information
    pub fn validation_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create an authentication error
    pub fn auth<S: Into<String>>(message: S, error_type: AuthErrorType) -> Self {
        Self::Auth {
            message: message.into(),
            error_type,
        }
    }

    pub fn forbidden<S: Into<String>>(message: S) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    pub fn account_state<S: Into<String>>(state: AccountStateRejection, message: S) -> Self {
        Self::AccountState {
            message: message.into(),
            state,
        }
    }

    /// Create a not found error
    pub fn not_found<R: Into<String>, I: Into<String>>(resource_type: R, id: I) -> Self {
        Self::NotFound {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }

    /// Create a conflict error
    pub fn conflict<M: Into<String>, R: Into<String>>(message: M, resource_type: R) -> Self {
        Self::Conflict {
            message: message.into(),
            resource_type: resource_type.into(),
        }
    }

    pub fn mail<S: Into<String>>(message: S) -> Self {
        Self::Mail {
            message: message.into(),
            source: None,
        }
    }

    pub fn mail_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Mail {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create an internal server error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(operation: S, duration_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration_ms,
        }
    }

    /// Get the HTTP status code that should be returned for this error
    pub fn status_code(&self) -> u16 {
        match self {
            HackathonError::Config { .. } => 500,
            HackathonError::Database { .. } => 500,
            HackathonError::Io { .. } => 500,
            HackathonError::Validation { .. } => 400,
            HackathonError::Auth { .. } => 401,
            HackathonError::Forbidden { .. } => 403,
            HackathonError::AccountState { state, .. } => match state {
                AccountStateRejection::Banned => 403,
                AccountStateRejection::Unverified | AccountStateRejection::ProfileIncomplete => {
                    417
                }
            },
            HackathonError::NotFound { .. } => 404,
            HackathonError::Conflict { .. } => 409,
            HackathonError::Mail { .. } => 500,
            HackathonError::Internal { .. } => 500,
            HackathonError::Timeout { .. } => 503,
        }
    }
}

/// Returns the constraint name when `err` is a Postgres unique violation (SQLSTATE 23505)
pub fn unique_violation(err: &sqlx::Error) -> Option<&str> {
    let db_err = err.as_database_error()?;
    if db_err.code().as_deref() != Some("23505") {
        return None;
    }
    Some(db_err.constraint().unwrap_or(""))
}

// Error conversions for common external error types
impl From<sqlx::Error> for HackathonError {
    fn from(error: sqlx::Error) -> Self {
        Self::Database {
            source: error,
            context: "Database operation failed".to_string(),
        }
    }
}

impl From<std::io::Error> for HackathonError {
    fn from(error: std::io::Error) -> Self {
        Self::Io {
            source: error,
            context: "I/O operation failed".to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for HackathonError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
        fields.sort_by(|a, b| a.0.cmp(&b.0));

        let message = fields
            .iter()
            .map(|(field, field_errors)| {
                let error_messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string()))
                    .collect();
                format!("{}: {}", field, error_messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");

        Self::validation(format!("Validation failed: {}", message))
    }
}

impl From<jsonwebtoken::errors::Error> for HackathonError {
    fn from(_: jsonwebtoken::errors::Error) -> Self {
        // Signature and expiry failures are reported identically.
        Self::auth("Invalid or expired token", AuthErrorType::InvalidToken)
    }
}

impl From<lettre::error::Error> for HackathonError {
    fn from(error: lettre::error::Error) -> Self {
        Self::mail_with_source("Failed to build message", Box::new(error))
    }
}

impl From<lettre::transport::smtp::Error> for HackathonError {
    fn from(error: lettre::transport::smtp::Error) -> Self {
        Self::mail_with_source("SMTP transport failure", Box::new(error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = HackathonError::config("Test configuration error");
        assert!(matches!(error, HackathonError::Config { .. }));
        assert_eq!(error.to_string(), "Configuration error: Test configuration error");
    }

    #[test]
    fn test_validation_error() {
        let error = HackathonError::validation_field("Invalid email format", "email");
        if let HackathonError::Validation { field, .. } = error {
            assert_eq!(field, Some("email".to_string()));
        } else {
            panic!("expected validation error");
        }
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(HackathonError::validation("test").status_code(), 400);
        assert_eq!(
            HackathonError::auth("test", AuthErrorType::InvalidToken).status_code(),
            401
        );
        assert_eq!(HackathonError::forbidden("not leader").status_code(), 403);
        assert_eq!(
            HackathonError::account_state(AccountStateRejection::Banned, "banned").status_code(),
            403
        );
        assert_eq!(
            HackathonError::account_state(AccountStateRejection::Unverified, "verify")
                .status_code(),
            417
        );
        assert_eq!(HackathonError::not_found("team", "x").status_code(), 404);
        assert_eq!(HackathonError::conflict("test", "team").status_code(), 409);
        assert_eq!(HackathonError::mail("down").status_code(), 500);
        assert_eq!(HackathonError::internal("test").status_code(), 500);
    }

    #[test]
    fn test_jwt_errors_are_indistinguishable() {
        let expired: HackathonError =
            jsonwebtoken::errors::Error::from(jsonwebtoken::errors::ErrorKind::ExpiredSignature)
                .into();
        let bad_sig: HackathonError =
            jsonwebtoken::errors::Error::from(jsonwebtoken::errors::ErrorKind::InvalidSignature)
                .into();
        assert_eq!(expired.to_string(), bad_sig.to_string());
    }

    #[test]
    fn test_non_unique_database_error_is_not_a_conflict() {
        assert!(unique_violation(&sqlx::Error::RowNotFound).is_none());
        let row_not_found: HackathonError = sqlx::Error::RowNotFound.into();
        assert_eq!(row_not_found.status_code(), 500);
    }
}
