//! Strongly Typed Identifiers
//!
//! Newtype wrappers around [`Uuid`] for every entity the sync core touches.
//! A `CsoId` can never be handed to something expecting an `MvoId`, which
//! matters here because both kinds of object reference each other.
//!
//! # Example
//!
//! ```
//! use meridian_core::{CsoId, MvoId};
//!
//! let cso = CsoId::new();
//! let mvo = MvoId::new();
//!
//! fn joins_to(target: MvoId) -> String {
//!     target.to_string()
//! }
//!
//! let _ = joins_to(mvo);
//! // joins_to(cso); // This would not compile!
//! # let _ = cso;
//! ```

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

/// Error type for ID parsing failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The type of ID that failed to parse
    pub id_type: &'static str,
    /// The underlying UUID parse error message
    pub message: String,
}

impl Display for ParseIdError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Failed to parse {}: {}", self.id_type, self.message)
    }
}

impl std::error::Error for ParseIdError {}

/// Macro to define a strongly-typed ID type
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random ID using UUID v4.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an ID from an existing UUID.
            #[must_use]
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns a reference to the underlying UUID.
            #[must_use]
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|e| ParseIdError {
                        id_type: stringify!($name),
                        message: e.to_string(),
                    })
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id!(
    /// Identifier of a connected system (an HR feed, a directory, ...).
    ConnectedSystemId
);

define_id!(
    /// Identifier of one object type within a connected system's schema.
    ObjectTypeId
);

define_id!(
    /// Identifier of one attribute definition within an object type.
    AttributeId
);

define_id!(
    /// Identifier of a Connected System Object.
    ///
    /// CSOs are never hard-deleted, so an id stays valid for the lifetime of
    /// the store even after the object goes obsolete.
    CsoId
);

define_id!(
    /// Identifier of a Metaverse Object.
    MvoId
);

define_id!(
    /// Identifier of a run profile (full import, delta import, ...).
    RunProfileId
);

define_id!(
    /// Identifier of a sync rule.
    SyncRuleId
);

define_id!(
    /// Identifier of a single attribute mapping inside a sync rule.
    MappingId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_creates_distinct_ids() {
        let a = CsoId::new();
        let b = CsoId::new();
        assert_ne!(a, b);
        assert_eq!(a.to_string().len(), 36);
    }

    #[test]
    fn test_from_uuid_preserves_value() {
        let uuid = Uuid::new_v4();
        let id = MvoId::from_uuid(uuid);
        assert_eq!(id.as_uuid(), &uuid);
        assert_eq!(Uuid::from(id), uuid);
    }

    #[test]
    fn test_parse_valid_id() {
        let id: ConnectedSystemId = "550e8400-e29b-41d4-a716-446655440000".parse().unwrap();
        assert_eq!(id.to_string(), "550e8400-e29b-41d4-a716-446655440000");
    }

    #[test]
    fn test_parse_invalid_id_names_the_type() {
        let err = "not-a-uuid".parse::<RunProfileId>().unwrap_err();
        assert_eq!(err.id_type, "RunProfileId");
        assert!(err.to_string().contains("RunProfileId"));
    }

    #[test]
    fn test_serde_is_transparent() {
        let uuid = Uuid::parse_str("123e4567-e89b-12d3-a456-426614174000").unwrap();
        let id = AttributeId::from_uuid(uuid);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"123e4567-e89b-12d3-a456-426614174000\"");

        let back: AttributeId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
