//! Import objects
//!
//! The connector-supplied payload for one external object. Values are raw:
//! they have not been deduplicated or checked against the object type's
//! schema yet.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Change type declared by the connector for one import object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportChangeType {
    /// Let the sync core infer the change from persisted state.
    #[default]
    NotSet,
    Created,
    Updated,
    Deleted,
}

impl ImportChangeType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportChangeType::NotSet => "not_set",
            ImportChangeType::Created => "created",
            ImportChangeType::Updated => "updated",
            ImportChangeType::Deleted => "deleted",
        }
    }

    #[must_use]
    pub fn is_delete(&self) -> bool {
        matches!(self, ImportChangeType::Deleted)
    }
}

impl fmt::Display for ImportChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ImportChangeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "not_set" | "notset" => Ok(ImportChangeType::NotSet),
            "created" | "create" | "add" => Ok(ImportChangeType::Created),
            "updated" | "update" | "modify" => Ok(ImportChangeType::Updated),
            "deleted" | "delete" => Ok(ImportChangeType::Deleted),
            _ => Err(format!("Unknown import change type: {s}")),
        }
    }
}

/// One raw value as emitted by a connector.
///
/// Reference attributes are emitted as `Text` tokens naming the target's
/// external identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ImportValue {
    Text(String),
    Integer(i64),
    Guid(Uuid),
    Boolean(bool),
    DateTime(DateTime<Utc>),
}

impl ImportValue {
    /// Name of the carried kind, for diagnostics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ImportValue::Text(_) => "text",
            ImportValue::Integer(_) => "integer",
            ImportValue::Guid(_) => "guid",
            ImportValue::Boolean(_) => "boolean",
            ImportValue::DateTime(_) => "datetime",
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ImportValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for ImportValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportValue::Text(v) => write!(f, "{v}"),
            ImportValue::Integer(v) => write!(f, "{v}"),
            ImportValue::Guid(v) => write!(f, "{v}"),
            ImportValue::Boolean(v) => write!(f, "{v}"),
            ImportValue::DateTime(v) => write!(f, "{}", v.to_rfc3339()),
        }
    }
}

impl From<&str> for ImportValue {
    fn from(value: &str) -> Self {
        ImportValue::Text(value.to_string())
    }
}

impl From<String> for ImportValue {
    fn from(value: String) -> Self {
        ImportValue::Text(value)
    }
}

impl From<i64> for ImportValue {
    fn from(value: i64) -> Self {
        ImportValue::Integer(value)
    }
}

impl From<Uuid> for ImportValue {
    fn from(value: Uuid) -> Self {
        ImportValue::Guid(value)
    }
}

impl From<bool> for ImportValue {
    fn from(value: bool) -> Self {
        ImportValue::Boolean(value)
    }
}

impl From<DateTime<Utc>> for ImportValue {
    fn from(value: DateTime<Utc>) -> Self {
        ImportValue::DateTime(value)
    }
}

/// A named attribute and its raw value list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportAttribute {
    pub name: String,
    pub values: Vec<ImportValue>,
}

/// One external object as supplied by a connector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectedSystemImportObject {
    /// Declared change type.
    #[serde(default)]
    pub change_type: ImportChangeType,

    /// Object type name, resolved against the connected system's schema.
    pub object_type: String,

    /// Attribute value lists in emission order.
    #[serde(default)]
    pub attributes: Vec<ImportAttribute>,
}

impl ConnectedSystemImportObject {
    /// Create an import object with no declared change type.
    pub fn new(object_type: impl Into<String>) -> Self {
        Self {
            change_type: ImportChangeType::NotSet,
            object_type: object_type.into(),
            attributes: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_change_type(mut self, change_type: ImportChangeType) -> Self {
        self.change_type = change_type;
        self
    }

    /// Append a single value to an attribute, creating it if needed.
    #[must_use]
    pub fn with_value(self, name: impl Into<String>, value: impl Into<ImportValue>) -> Self {
        self.with_values(name, vec![value.into()])
    }

    /// Append values to an attribute, creating it if needed.
    #[must_use]
    pub fn with_values<V: Into<ImportValue>>(
        mut self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let name = name.into();
        let values = values.into_iter().map(Into::into);
        match self.attributes.iter_mut().find(|a| a.name == name) {
            Some(existing) => existing.values.extend(values),
            None => self.attributes.push(ImportAttribute {
                name,
                values: values.collect(),
            }),
        }
        self
    }

    /// Raw values for an attribute, if the connector supplied it.
    #[must_use]
    pub fn get_values(&self, name: &str) -> Option<&[ImportValue]> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.values.as_slice())
    }

    /// First raw value for an attribute.
    #[must_use]
    pub fn first_value(&self, name: &str) -> Option<&ImportValue> {
        self.get_values(name).and_then(|values| values.first())
    }
}
