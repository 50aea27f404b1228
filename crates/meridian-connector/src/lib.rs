//! # Meridian Connector
//!
//! The boundary between the sync core and the connected systems it imports
//! from (HR feeds, directories, ...).
//!
//! ## Crate Organization
//!
//! - [`schema`] - Object types and attribute definitions, including the
//!   primary/secondary external identifier flags used for matching
//! - [`import`] - Connector-supplied import objects and raw values
//! - [`traits`] - The [`ImportConnector`](traits::ImportConnector) capability
//! - [`error`] - Error types with transient/permanent/object-level classification
//!
//! ## Example
//!
//! ```
//! use meridian_connector::prelude::*;
//!
//! let user = ConnectedSystemObjectType::new("user")
//!     .with_attribute(
//!         ConnectedSystemAttribute::new("employeeId", AttributeDataType::Text)
//!             .as_primary_external_id(),
//!     )
//!     .with_attribute(
//!         ConnectedSystemAttribute::new("groups", AttributeDataType::Reference).multi_valued(),
//!     );
//! assert!(user.validate().is_ok());
//!
//! let object = ConnectedSystemImportObject::new("user")
//!     .with_change_type(ImportChangeType::Created)
//!     .with_value("employeeId", "E100");
//! assert_eq!(object.first_value("employeeId").and_then(ImportValue::as_text), Some("E100"));
//! ```

pub mod error;
pub mod import;
pub mod schema;
pub mod traits;

/// Prelude module for convenient imports.
///
/// ```
/// use meridian_connector::prelude::*;
/// ```
pub mod prelude {
    // Error handling
    pub use crate::error::{ConnectorError, ConnectorResult};

    // Schema
    pub use crate::schema::{
        AttributeDataType, AttributePlurality, ConnectedSystemAttribute,
        ConnectedSystemObjectType, IdentifierType,
    };

    // Import objects
    pub use crate::import::{
        ConnectedSystemImportObject, ImportAttribute, ImportChangeType, ImportValue,
    };

    // Traits
    pub use crate::traits::{ImportConnector, ImportMode, ImportRequest, ImportStream};
}

// Re-export async_trait for connector implementors
pub use async_trait::async_trait;
