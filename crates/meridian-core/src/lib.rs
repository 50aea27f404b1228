//! Meridian Core Library
//!
//! Shared types for the Meridian identity sync core.
//!
//! # Modules
//!
//! - [`ids`] - Strongly typed identifiers for connected systems, connected
//!   system objects, metaverse objects and sync configuration
//!
//! # Example
//!
//! ```
//! use meridian_core::{ConnectedSystemId, CsoId};
//!
//! let system = ConnectedSystemId::new();
//! let cso = CsoId::new();
//! assert_ne!(system.to_string(), cso.to_string());
//! ```

pub mod ids;

pub use ids::{
    AttributeId, ConnectedSystemId, CsoId, MappingId, MvoId, ObjectTypeId, ParseIdError,
    RunProfileId, SyncRuleId,
};
