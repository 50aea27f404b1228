//! Connector error types
//!
//! Error definitions with a transient/permanent split, plus an object-level
//! class for records the sync core can skip without aborting the run.

use thiserror::Error;

/// Error that can occur while a connector produces import objects.
#[derive(Debug, Error)]
pub enum ConnectorError {
    // Connection errors (usually transient)
    /// Failed to establish connection to the connected system.
    #[error("connection failed: {message}")]
    ConnectionFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Connection timed out.
    #[error("connection timeout after {timeout_secs} seconds")]
    ConnectionTimeout { timeout_secs: u64 },

    /// Connected system is temporarily unavailable.
    #[error("connected system unavailable: {message}")]
    TargetUnavailable { message: String },

    // Authentication errors (permanent)
    /// Invalid credentials provided.
    #[error("authentication failed: invalid credentials")]
    AuthenticationFailed,

    // Configuration and schema errors (permanent)
    /// Connector configuration is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// Schema definition is inconsistent.
    #[error("invalid schema for object type '{object_type}': {message}")]
    InvalidSchema { object_type: String, message: String },

    /// Object type not declared by the connected system's schema.
    #[error("object type '{object_type}' not found in schema")]
    ObjectTypeNotFound { object_type: String },

    // Record errors (object-level)
    /// One record emitted by the source could not be read.
    #[error("invalid data: {message}")]
    InvalidData { message: String },

    // Internal errors
    /// Internal error.
    #[error("internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl ConnectorError {
    /// Check if this error is transient and the run could be retried later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ConnectorError::ConnectionFailed { .. }
                | ConnectorError::ConnectionTimeout { .. }
                | ConnectorError::TargetUnavailable { .. }
        )
    }

    /// Check if this error is permanent and retry won't help.
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }

    /// Check if this error concerns a single record only.
    ///
    /// The import stream stays usable after an object-level error; every
    /// other error ends the stream.
    pub fn is_object_level(&self) -> bool {
        matches!(self, ConnectorError::InvalidData { .. })
    }

    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            ConnectorError::ConnectionFailed { .. } => "CONNECTION_FAILED",
            ConnectorError::ConnectionTimeout { .. } => "CONNECTION_TIMEOUT",
            ConnectorError::TargetUnavailable { .. } => "TARGET_UNAVAILABLE",
            ConnectorError::AuthenticationFailed => "AUTH_FAILED",
            ConnectorError::InvalidConfiguration { .. } => "INVALID_CONFIG",
            ConnectorError::InvalidSchema { .. } => "INVALID_SCHEMA",
            ConnectorError::ObjectTypeNotFound { .. } => "OBJECT_TYPE_NOT_FOUND",
            ConnectorError::InvalidData { .. } => "INVALID_DATA",
            ConnectorError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    // Convenience constructors

    /// Create a connection failed error.
    pub fn connection_failed(message: impl Into<String>) -> Self {
        ConnectorError::ConnectionFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection failed error with source.
    pub fn connection_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ConnectorError::ConnectionFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an invalid schema error.
    pub fn invalid_schema(object_type: impl Into<String>, message: impl Into<String>) -> Self {
        ConnectorError::InvalidSchema {
            object_type: object_type.into(),
            message: message.into(),
        }
    }

    /// Create an invalid data error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        ConnectorError::InvalidData {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        ConnectorError::Internal {
            message: message.into(),
            source: None,
        }
    }
}

/// Result type for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        let transient_errors = vec![
            ConnectorError::connection_failed("test"),
            ConnectorError::ConnectionTimeout { timeout_secs: 30 },
            ConnectorError::TargetUnavailable {
                message: "maintenance".to_string(),
            },
        ];

        for err in transient_errors {
            assert!(
                err.is_transient(),
                "Expected {} to be transient",
                err.error_code()
            );
            assert!(!err.is_object_level());
        }
    }

    #[test]
    fn test_permanent_errors() {
        let permanent_errors = vec![
            ConnectorError::AuthenticationFailed,
            ConnectorError::invalid_schema("user", "two primary identifiers"),
            ConnectorError::ObjectTypeNotFound {
                object_type: "printer".to_string(),
            },
            ConnectorError::internal("boom"),
        ];

        for err in permanent_errors {
            assert!(
                err.is_permanent(),
                "Expected {} to be permanent",
                err.error_code()
            );
        }
    }

    #[test]
    fn test_invalid_data_is_object_level() {
        let err = ConnectorError::invalid_data("row 17 has no columns");
        assert!(err.is_object_level());
        assert!(err.is_permanent());
        assert_eq!(err.error_code(), "INVALID_DATA");
    }

    #[test]
    fn test_error_display() {
        let err = ConnectorError::ConnectionTimeout { timeout_secs: 30 };
        assert_eq!(err.to_string(), "connection timeout after 30 seconds");

        let err = ConnectorError::invalid_schema("group", "no primary external identifier");
        assert_eq!(
            err.to_string(),
            "invalid schema for object type 'group': no primary external identifier"
        );
    }

    #[test]
    fn test_error_with_source() {
        let source_err = std::io::Error::new(std::io::ErrorKind::Other, "reset by peer");
        let err = ConnectorError::connection_failed_with_source("failed", source_err);

        assert!(err.is_transient());
        if let ConnectorError::ConnectionFailed { source, .. } = &err {
            assert!(source.is_some());
        } else {
            panic!("Expected ConnectionFailed variant");
        }
    }
}
