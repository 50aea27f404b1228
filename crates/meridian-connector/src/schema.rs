//! Connected system schema types
//!
//! An object type describes one object class of one connected system: its
//! ordered attribute definitions, their data types and plurality, and which
//! attribute carries the external identifier used to match imported objects
//! against persisted ones.

use meridian_core::{AttributeId, ObjectTypeId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ConnectorError, ConnectorResult};

/// Data type of a connected system attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeDataType {
    /// Free text.
    Text,
    /// Signed integer.
    Number,
    /// UUID/GUID.
    Guid,
    /// Boolean flag.
    Boolean,
    /// Point in time (UTC).
    DateTime,
    /// Reference to another object of the same connected system.
    Reference,
}

impl AttributeDataType {
    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AttributeDataType::Text => "text",
            AttributeDataType::Number => "number",
            AttributeDataType::Guid => "guid",
            AttributeDataType::Boolean => "boolean",
            AttributeDataType::DateTime => "datetime",
            AttributeDataType::Reference => "reference",
        }
    }

    /// Whether values of this type point at other objects.
    #[must_use]
    pub fn is_reference(&self) -> bool {
        matches!(self, AttributeDataType::Reference)
    }
}

impl fmt::Display for AttributeDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AttributeDataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "string" => Ok(AttributeDataType::Text),
            "number" | "integer" | "int" => Ok(AttributeDataType::Number),
            "guid" | "uuid" => Ok(AttributeDataType::Guid),
            "boolean" | "bool" => Ok(AttributeDataType::Boolean),
            "datetime" => Ok(AttributeDataType::DateTime),
            "reference" => Ok(AttributeDataType::Reference),
            _ => Err(format!("Unknown attribute data type: {s}")),
        }
    }
}

/// Whether an attribute holds one value or many.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributePlurality {
    #[default]
    SingleValued,
    MultiValued,
}

impl AttributePlurality {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AttributePlurality::SingleValued => "single_valued",
            AttributePlurality::MultiValued => "multi_valued",
        }
    }
}

impl fmt::Display for AttributePlurality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Role an attribute plays in identifying its object.
///
/// The primary external identifier is the matching key for imports. The
/// secondary is consulted only when an imported object carries no primary
/// value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierType {
    Primary,
    Secondary,
}

/// One attribute definition of an object type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectedSystemAttribute {
    /// Attribute ID.
    pub id: AttributeId,

    /// Name as emitted by the connector.
    pub name: String,

    /// Declared data type; every stored value must agree with it.
    pub data_type: AttributeDataType,

    /// Single or multi-valued.
    #[serde(default)]
    pub plurality: AttributePlurality,

    /// Identifier role, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier_type: Option<IdentifierType>,
}

impl ConnectedSystemAttribute {
    /// Create a single-valued attribute with a fresh id.
    pub fn new(name: impl Into<String>, data_type: AttributeDataType) -> Self {
        Self {
            id: AttributeId::new(),
            name: name.into(),
            data_type,
            plurality: AttributePlurality::SingleValued,
            identifier_type: None,
        }
    }

    /// Mark this attribute as multi-valued.
    #[must_use]
    pub fn multi_valued(mut self) -> Self {
        self.plurality = AttributePlurality::MultiValued;
        self
    }

    /// Mark this attribute as the primary external identifier.
    #[must_use]
    pub fn as_primary_external_id(mut self) -> Self {
        self.identifier_type = Some(IdentifierType::Primary);
        self
    }

    /// Mark this attribute as the secondary external identifier.
    #[must_use]
    pub fn as_secondary_external_id(mut self) -> Self {
        self.identifier_type = Some(IdentifierType::Secondary);
        self
    }

    #[must_use]
    pub fn is_multi_valued(&self) -> bool {
        self.plurality == AttributePlurality::MultiValued
    }

    #[must_use]
    pub fn is_reference(&self) -> bool {
        self.data_type.is_reference()
    }

    #[must_use]
    pub fn is_primary_external_id(&self) -> bool {
        matches!(self.identifier_type, Some(IdentifierType::Primary))
    }

    #[must_use]
    pub fn is_secondary_external_id(&self) -> bool {
        matches!(self.identifier_type, Some(IdentifierType::Secondary))
    }
}

/// Schema for one object class in one connected system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectedSystemObjectType {
    /// Object type ID.
    pub id: ObjectTypeId,

    /// Object type name as emitted by the connector (e.g. "user", "group").
    pub name: String,

    /// Ordered attribute definitions.
    pub attributes: Vec<ConnectedSystemAttribute>,
}

impl ConnectedSystemObjectType {
    /// Create an object type with no attributes.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ObjectTypeId::new(),
            name: name.into(),
            attributes: Vec::new(),
        }
    }

    /// Add an attribute using builder pattern.
    #[must_use]
    pub fn with_attribute(mut self, attribute: ConnectedSystemAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Find an attribute by the name the connector uses.
    #[must_use]
    pub fn get_attribute(&self, name: &str) -> Option<&ConnectedSystemAttribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Find an attribute by id.
    #[must_use]
    pub fn get_attribute_by_id(&self, id: AttributeId) -> Option<&ConnectedSystemAttribute> {
        self.attributes.iter().find(|a| a.id == id)
    }

    /// The primary external identifier attribute.
    #[must_use]
    pub fn primary_external_id(&self) -> Option<&ConnectedSystemAttribute> {
        self.attributes.iter().find(|a| a.is_primary_external_id())
    }

    /// The secondary external identifier attribute, if declared.
    #[must_use]
    pub fn secondary_external_id(&self) -> Option<&ConnectedSystemAttribute> {
        self.attributes.iter().find(|a| a.is_secondary_external_id())
    }

    /// Check the schema can be used for matching.
    ///
    /// Requires exactly one primary external identifier, at most one
    /// secondary, unique attribute names, and single-valued non-reference
    /// identifier attributes.
    pub fn validate(&self) -> ConnectorResult<()> {
        let primaries = self
            .attributes
            .iter()
            .filter(|a| a.is_primary_external_id())
            .count();
        if primaries != 1 {
            return Err(ConnectorError::invalid_schema(
                &self.name,
                format!("expected exactly one primary external identifier, found {primaries}"),
            ));
        }

        let secondaries = self
            .attributes
            .iter()
            .filter(|a| a.is_secondary_external_id())
            .count();
        if secondaries > 1 {
            return Err(ConnectorError::invalid_schema(
                &self.name,
                format!("expected at most one secondary external identifier, found {secondaries}"),
            ));
        }

        for (index, attribute) in self.attributes.iter().enumerate() {
            if self.attributes[..index]
                .iter()
                .any(|other| other.name == attribute.name)
            {
                return Err(ConnectorError::invalid_schema(
                    &self.name,
                    format!("duplicate attribute name '{}'", attribute.name),
                ));
            }

            if attribute.identifier_type.is_some()
                && (attribute.is_multi_valued() || attribute.is_reference())
            {
                return Err(ConnectorError::invalid_schema(
                    &self.name,
                    format!(
                        "identifier attribute '{}' must be single-valued and not a reference",
                        attribute.name
                    ),
                ));
            }
        }

        Ok(())
    }
}
