//! Error types for inspecta.

use thiserror::Error;

/// Result type alias using inspecta's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for inspecta operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Archive not found
    #[error("Archive not found: {0}")]
    ArchiveNotFound(uuid::Uuid),

    /// Inspection not found
    #[error("Inspection not found: {0}")]
    InspectionNotFound(uuid::Uuid),

    /// Invalid input (malformed URL, missing required field)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// MIME type outside the allow-list
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// Upload exceeds the configured size limit
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// Mutation rejected by entity state (already deleted, finalized, ...)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("test resource".to_string());
        assert_eq!(err.to_string(), "Not found: test resource");
    }

    #[test]
    fn test_error_display_archive_not_found() {
        let id = Uuid::nil();
        let err = Error::ArchiveNotFound(id);
        assert_eq!(err.to_string(), format!("Archive not found: {}", id));
    }

    #[test]
    fn test_error_display_inspection_not_found() {
        let id = Uuid::new_v4();
        let err = Error::InspectionNotFound(id);
        assert!(err.to_string().contains(&id.to_string()));
    }

    #[test]
    fn test_error_display_invalid_input() {
        let err = Error::InvalidInput("not a URL".to_string());
        assert_eq!(err.to_string(), "Invalid input: not a URL");
    }

    #[test]
    fn test_error_display_unsupported_media_type() {
        let err = Error::UnsupportedMediaType("application/x-msdownload".to_string());
        assert_eq!(
            err.to_string(),
            "Unsupported media type: application/x-msdownload"
        );
    }

    #[test]
    fn test_error_display_payload_too_large() {
        let err = Error::PayloadTooLarge("limit is 50 MiB".to_string());
        assert_eq!(err.to_string(), "Payload too large: limit is 50 MiB");
    }

    #[test]
    fn test_error_display_conflict() {
        let err = Error::Conflict("inspection already deleted".to_string());
        assert_eq!(err.to_string(), "Conflict: inspection already deleted");
    }

    #[test]
    fn test_error_display_config() {
        let err = Error::Config("DATABASE_URL missing".to_string());
        assert_eq!(err.to_string(), "Configuration error: DATABASE_URL missing");
    }

    #[test]
    fn test_error_display_internal() {
        let err = Error::Internal("unexpected state".to_string());
        assert_eq!(err.to_string(), "Internal error: unexpected state");
    }

    #[test]
    fn test_error_display_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = Error::Io(io_err);
        assert!(err.to_string().contains("I/O error:"));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number");
        assert!(json_err.is_err());

        let err: Error = json_err.unwrap_err().into();
        match err {
            Error::Serialization(msg) => assert!(!msg.is_empty()),
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: Error = io_err.into();
        match err {
            Error::Io(_) => {}
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }

    #[test]
    fn test_result_type_ok() {
        fn get_result() -> Result<i32> {
            Ok(42)
        }
        assert_eq!(get_result().unwrap(), 42);
    }
}
