//! Error types for the sanction ledger.

use thiserror::Error;

/// Application result type.
pub type AppResult<T> = Result<T, AppError>;

/// Application error type.
#[derive(Debug, Error)]
pub enum AppError {
    // === Caller Errors ===
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// The escalation policy has no entry for the computed warning level.
    #[error("No warn level configured for level {0}")]
    WarnLevelNotConfigured(u32),

    // === Server Errors ===
    #[error("Database error: {0}")]
    Database(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns the error code for caller-facing messages.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Conflict(_) => "CONFLICT",
            Self::WarnLevelNotConfigured(_) => "WARN_LEVEL_NOT_CONFIGURED",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Queue(_) => "QUEUE_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns whether this error is an infrastructure failure that should be
    /// logged at error level.
    #[must_use]
    pub const fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Database(_) | Self::Queue(_) | Self::Config(_) | Self::Internal(_)
        )
    }
}

// === From implementations ===

impl From<sea_orm::DbErr> for AppError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<sea_orm::TransactionError<Self>> for AppError {
    fn from(err: sea_orm::TransactionError<Self>) -> Self {
        match err {
            sea_orm::TransactionError::Connection(e) => Self::Database(e.to_string()),
            sea_orm::TransactionError::Transaction(e) => e,
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(AppError::NotFound("x".into()).error_code(), "NOT_FOUND");
        assert_eq!(
            AppError::WarnLevelNotConfigured(4).error_code(),
            "WARN_LEVEL_NOT_CONFIGURED"
        );
    }

    #[test]
    fn test_server_error_classification() {
        assert!(AppError::Database("down".into()).is_server_error());
        assert!(!AppError::WarnLevelNotConfigured(2).is_server_error());
        assert!(!AppError::Conflict("dup".into()).is_server_error());
    }

    #[test]
    fn test_db_error_conversion() {
        let err: AppError = sea_orm::DbErr::Custom("boom".to_string()).into();
        assert!(matches!(err, AppError::Database(msg) if msg.contains("boom")));
    }

    #[test]
    fn test_missing_level_message() {
        let err = AppError::WarnLevelNotConfigured(3);
        assert_eq!(err.to_string(), "No warn level configured for level 3");
    }
}
