use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Database errors
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Connection pool error: {0}")]
    ConnectionPool(String),

    #[error("Migration error: {0}")]
    Migration(String),
}

/// Manual Clone implementation for DbError
impl Clone for DbError {
    fn clone(&self) -> Self {
        match self {
            DbError::Sqlx(err) => DbError::Sqlx(sqlx::Error::Protocol(err.to_string())),
            DbError::ConnectionPool(s) => DbError::ConnectionPool(s.clone()),
            DbError::Migration(s) => DbError::Migration(s.clone()),
        }
    }
}

/// Domain-level errors
#[derive(Debug, Error, Clone)]
pub enum DomainError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Rule '{rule}' is not supported for field '{field}'")]
    UnsupportedRule {
        field: String,
        rule: String,
    },

    #[error("Export job not found: {0}")]
    JobNotFound(Uuid),

    #[error("Export job {id} is not ready for download (status: {status})")]
    JobNotReady {
        id: Uuid,
        status: String,
    },

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for DomainError {
    fn from(error: sqlx::Error) -> Self {
        DomainError::Database(DbError::Sqlx(error))
    }
}

impl From<std::io::Error> for DomainError {
    fn from(error: std::io::Error) -> Self {
        DomainError::Io(error.to_string())
    }
}

/// Service-level errors (application specific)
#[derive(Debug, Error, Clone)]
pub enum ServiceError {
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Not initialized: {0}")]
    NotInitialized(String),
}

impl From<DbError> for ServiceError {
    fn from(error: DbError) -> Self {
        ServiceError::Domain(DomainError::Database(error))
    }
}

/// Validation errors raised at the request boundary, before any SQL is built.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Field '{field}' is required")]
    Required {
        field: String,
    },

    #[error("Field '{field}' cannot exceed {max} characters")]
    MaxLength {
        field: String,
        max: usize,
    },

    #[error("Field '{field}' contains invalid format: {reason}")]
    Format {
        field: String,
        reason: String,
    },

    #[error("Unexpected field name: {0}")]
    MalformedField(String),

    #[error("Invalid rule value: {0}")]
    InvalidRule(String),

    #[error("Invalid cast value: {0}")]
    InvalidCast(String),

    #[error("Request body not formatted properly: {0}")]
    MalformedRequest(String),
}

impl ValidationError {
    pub fn required(field: &str) -> Self {
        Self::Required {
            field: field.to_string(),
        }
    }

    pub fn max_length(field: &str, max: usize) -> Self {
        Self::MaxLength {
            field: field.to_string(),
            max,
        }
    }

    pub fn format(field: &str, reason: &str) -> Self {
        Self::Format {
            field: field.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn malformed_field(raw: &str) -> Self {
        Self::MalformedField(raw.to_string())
    }

    pub fn invalid_rule(raw: &str) -> Self {
        Self::InvalidRule(raw.to_string())
    }

    pub fn invalid_cast(raw: &str) -> Self {
        Self::InvalidCast(raw.to_string())
    }

    pub fn malformed_request<E: fmt::Display>(cause: E) -> Self {
        Self::MalformedRequest(cause.to_string())
    }
}
