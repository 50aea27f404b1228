//! Sync error types.

use meridian_connector::error::ConnectorError;
use meridian_core::{ConnectedSystemId, RunProfileId};
use thiserror::Error;

/// Errors that can occur during import reconciliation and synchronisation.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Connected system does not exist.
    #[error("Connected system not found: {id}")]
    ConnectedSystemNotFound { id: ConnectedSystemId },

    /// Run profile does not exist on the connected system.
    #[error("Run profile {run_profile_id} not found on connected system {connected_system_id}")]
    RunProfileNotFound {
        connected_system_id: ConnectedSystemId,
        run_profile_id: RunProfileId,
    },

    /// Run profile cannot drive the requested operation.
    #[error("Invalid run profile {run_profile_id}: {message}")]
    InvalidRunProfile {
        run_profile_id: RunProfileId,
        message: String,
    },

    /// Connector error that ended the object stream.
    #[error("Connector error: {0}")]
    Connector(#[from] ConnectorError),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Import object names an object type the connected system does not declare.
    #[error("Object type '{object_type}' not found")]
    ObjectTypeNotFound { object_type: String },

    /// Import object carries no usable external identifier.
    #[error("Object of type '{object_type}' has no external identifier value")]
    MissingExternalId { object_type: String },

    /// Value does not agree with the attribute's declared schema.
    #[error("Invalid value for attribute '{attribute}': {message}")]
    InvalidAttributeValue { attribute: String, message: String },

    /// Mapping error.
    #[error("Mapping error: attribute '{attribute}' - {message}")]
    Mapping { attribute: String, message: String },

    /// Not found.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Invalid state transition.
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    /// Persistence collaborator rejected a read or write.
    #[error("Store error: {message}")]
    Store { message: String },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl SyncError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an invalid attribute value error.
    pub fn invalid_value(attribute: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidAttributeValue {
            attribute: attribute.into(),
            message: message.into(),
        }
    }

    /// Create a mapping error.
    pub fn mapping(attribute: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Mapping {
            attribute: attribute.into(),
            message: message.into(),
        }
    }

    /// Create a not found error.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Create an invalid state transition error.
    pub fn invalid_state_transition(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::InvalidStateTransition {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Create a store error.
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Check if this error aborts a run before any object is processed.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::ConnectedSystemNotFound { .. }
                | SyncError::RunProfileNotFound { .. }
                | SyncError::InvalidRunProfile { .. }
                | SyncError::Configuration { .. }
        )
    }

    /// Check if this error concerns a single import object.
    ///
    /// Object-level errors fail that object only; the run continues with the
    /// next one.
    pub fn is_object_level(&self) -> bool {
        match self {
            SyncError::ObjectTypeNotFound { .. }
            | SyncError::MissingExternalId { .. }
            | SyncError::InvalidAttributeValue { .. }
            | SyncError::InvalidStateTransition { .. } => true,
            SyncError::Connector(e) => e.is_object_level(),
            _ => false,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Store { .. } => true,
            SyncError::Connector(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            SyncError::ConnectedSystemNotFound { .. } => "CONNECTED_SYSTEM_NOT_FOUND",
            SyncError::RunProfileNotFound { .. } => "RUN_PROFILE_NOT_FOUND",
            SyncError::InvalidRunProfile { .. } => "INVALID_RUN_PROFILE",
            SyncError::Connector(e) => e.error_code(),
            SyncError::Configuration { .. } => "CONFIGURATION_ERROR",
            SyncError::ObjectTypeNotFound { .. } => "OBJECT_TYPE_NOT_FOUND",
            SyncError::MissingExternalId { .. } => "MISSING_EXTERNAL_ID",
            SyncError::InvalidAttributeValue { .. } => "INVALID_ATTRIBUTE_VALUE",
            SyncError::Mapping { .. } => "MAPPING_ERROR",
            SyncError::NotFound { .. } => "NOT_FOUND",
            SyncError::InvalidStateTransition { .. } => "INVALID_STATE_TRANSITION",
            SyncError::Store { .. } => "STORE_ERROR",
            SyncError::Serialization(_) => "SERIALIZATION_ERROR",
            SyncError::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;
