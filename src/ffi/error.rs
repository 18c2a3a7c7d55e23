use std::fmt;
use serde::{Deserialize, Serialize};
use crate::errors::{DbError, DomainError, ServiceError, ValidationError};

/// Error codes for FFI boundary
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // Success (no error)
    Success = 0,

    // General errors (1-99)
    InvalidArgument = 2,
    NullPointer = 3,
    InvalidUtf8 = 4,
    InvalidUuid = 5,
    InternalError = 6,

    // Database errors (100-199)
    DatabaseGeneral = 100,
    DatabaseConnection = 104,
    DatabaseMigration = 106,

    // Domain errors (200-299)
    JobNotFound = 201,
    ValidationFailed = 204,
    FileError = 207,
    UnsupportedRule = 209,
    JobNotReady = 210,

    // Service errors (300-399)
    ConfigurationError = 310,
    NotInitialized = 312,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self, *self as i32)
    }
}

/// Error type for FFI boundary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FFIError {
    /// Error code for programmatic handling
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Optional additional details (JSON string)
    pub details: Option<String>,
}

impl fmt::Display for FFIError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(details) = &self.details {
            write!(f, "{}: {} ({})", self.code, self.message, details)
        } else {
            write!(f, "{}: {}", self.code, self.message)
        }
    }
}

impl std::error::Error for FFIError {}

impl FFIError {
    pub fn new(code: ErrorCode, message: &str) -> Self {
        Self {
            code,
            message: message.to_string(),
            details: None,
        }
    }

    pub fn with_details(code: ErrorCode, message: &str, details: serde_json::Value) -> Self {
        Self {
            code,
            message: message.to_string(),
            details: Some(details.to_string()),
        }
    }

    pub fn invalid_argument(message: &str) -> Self {
        Self::new(ErrorCode::InvalidArgument, message)
    }

    pub fn internal(message: String) -> Self {
        Self::new(ErrorCode::InternalError, &message)
    }
}

pub type FFIResult<T> = Result<T, FFIError>;

impl From<DbError> for FFIError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::ConnectionPool(msg) => Self::new(ErrorCode::DatabaseConnection, &msg),
            DbError::Migration(msg) => Self::new(ErrorCode::DatabaseMigration, &msg),
            DbError::Sqlx(e) => Self::new(ErrorCode::DatabaseGeneral, &format!("SQLx error: {}", e)),
        }
    }
}

impl From<DomainError> for FFIError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Database(db_err) => db_err.into(),
            DomainError::Validation(val_err) => val_err.into(),
            DomainError::UnsupportedRule { ref field, ref rule } => Self::with_details(
                ErrorCode::UnsupportedRule,
                &err.to_string(),
                serde_json::json!({ "field": field, "rule": rule }),
            ),
            DomainError::JobNotFound(id) => Self::with_details(
                ErrorCode::JobNotFound,
                &err.to_string(),
                serde_json::json!({ "id": id.to_string() }),
            ),
            DomainError::JobNotReady { id, ref status } => Self::with_details(
                ErrorCode::JobNotReady,
                &err.to_string(),
                serde_json::json!({ "id": id.to_string(), "status": status }),
            ),
            DomainError::Io(msg) => Self::new(ErrorCode::FileError, &msg),
            DomainError::Internal(msg) => Self::new(ErrorCode::InternalError, &msg),
        }
    }
}

impl From<ServiceError> for FFIError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Domain(domain_err) => domain_err.into(),
            ServiceError::Configuration(msg) => Self::new(ErrorCode::ConfigurationError, &msg),
            ServiceError::NotInitialized(msg) => Self::new(ErrorCode::NotInitialized, &msg),
        }
    }
}

impl From<ValidationError> for FFIError {
    fn from(err: ValidationError) -> Self {
        let kind = match &err {
            ValidationError::Required { .. } => "required",
            ValidationError::MaxLength { .. } => "max_length",
            ValidationError::Format { .. } => "format",
            ValidationError::MalformedField(_) => "malformed_field",
            ValidationError::InvalidRule(_) => "invalid_rule",
            ValidationError::InvalidCast(_) => "invalid_cast",
            ValidationError::MalformedRequest(_) => "malformed_request",
        };
        Self::with_details(
            ErrorCode::ValidationFailed,
            &err.to_string(),
            serde_json::json!({ "type": kind }),
        )
    }
}

impl From<std::ffi::NulError> for FFIError {
    fn from(_: std::ffi::NulError) -> Self {
        Self::new(ErrorCode::InvalidArgument, "String contains interior NUL byte")
    }
}

impl From<std::str::Utf8Error> for FFIError {
    fn from(_: std::str::Utf8Error) -> Self {
        Self::new(ErrorCode::InvalidUtf8, "String is not valid UTF-8")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_domain_errors_map_to_codes() {
        let id = Uuid::new_v4();
        let err: FFIError = ServiceError::Domain(DomainError::JobNotFound(id)).into();
        assert_eq!(err.code, ErrorCode::JobNotFound);
        assert!(err.details.unwrap().contains(&id.to_string()));

        let err: FFIError = DomainError::JobNotReady { id, status: "filtering_entities".to_string() }.into();
        assert_eq!(err.code, ErrorCode::JobNotReady);

        let err: FFIError = DomainError::UnsupportedRule {
            field: "tag.category".to_string(),
            rule: "gt".to_string(),
        }
        .into();
        assert_eq!(err.code, ErrorCode::UnsupportedRule);
    }

    #[test]
    fn test_validation_errors_carry_their_kind() {
        let err: FFIError = DomainError::Validation(ValidationError::InvalidRule("between".to_string())).into();
        assert_eq!(err.code, ErrorCode::ValidationFailed);
        assert_eq!(err.details.as_deref(), Some(r#"{"type":"invalid_rule"}"#));
    }

    #[test]
    fn test_database_errors_map_to_codes() {
        let err: FFIError = DbError::ConnectionPool("refused".to_string()).into();
        assert_eq!(err.code, ErrorCode::DatabaseConnection);

        let cloned = DomainError::Database(DbError::Sqlx(sqlx::Error::RowNotFound)).clone();
        let err: FFIError = cloned.into();
        assert_eq!(err.code, ErrorCode::DatabaseGeneral);
        assert!(err.message.contains("no rows returned"));
    }

    #[test]
    fn test_service_errors() {
        let err: FFIError = ServiceError::NotInitialized("x".to_string()).into();
        assert_eq!(err.code, ErrorCode::NotInitialized);
        assert_eq!(err.code as i32, 312);
    }
}
