//! Attribute value model.
//!
//! Every value stored on a CSO is one [`AttributeValue`] whose variant agrees
//! with the declared [`AttributeDataType`] of its attribute. Equality is exact:
//! text compares byte-for-byte with no case folding, every other kind by value.

use chrono::{DateTime, Utc};
use meridian_connector::schema::AttributeDataType;
use meridian_core::{CsoId, MvoId};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// One value of a connected system object attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AttributeValue {
    Text(String),
    Integer(i64),
    Guid(Uuid),
    Boolean(bool),
    DateTime(DateTime<Utc>),
    Reference(CsoReference),
}

impl AttributeValue {
    /// The schema data type this value satisfies.
    #[must_use]
    pub fn data_type(&self) -> AttributeDataType {
        match self {
            AttributeValue::Text(_) => AttributeDataType::Text,
            AttributeValue::Integer(_) => AttributeDataType::Number,
            AttributeValue::Guid(_) => AttributeDataType::Guid,
            AttributeValue::Boolean(_) => AttributeDataType::Boolean,
            AttributeValue::DateTime(_) => AttributeDataType::DateTime,
            AttributeValue::Reference(_) => AttributeDataType::Reference,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_reference(&self) -> Option<&CsoReference> {
        match self {
            AttributeValue::Reference(r) => Some(r),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_reference_mut(&mut self) -> Option<&mut CsoReference> {
        match self {
            AttributeValue::Reference(r) => Some(r),
            _ => None,
        }
    }

    /// Parse a source-system token into a value of the given scalar type.
    ///
    /// Returns `None` when the token cannot represent a value of that type,
    /// or when `data_type` is a reference.
    #[must_use]
    pub fn parse_token(data_type: AttributeDataType, token: &str) -> Option<Self> {
        match data_type {
            AttributeDataType::Text => Some(AttributeValue::Text(token.to_string())),
            AttributeDataType::Number => token.parse().ok().map(AttributeValue::Integer),
            AttributeDataType::Guid => Uuid::parse_str(token).ok().map(AttributeValue::Guid),
            AttributeDataType::Boolean => token.parse().ok().map(AttributeValue::Boolean),
            AttributeDataType::DateTime => DateTime::parse_from_rfc3339(token)
                .ok()
                .map(|dt| AttributeValue::DateTime(dt.with_timezone(&Utc))),
            AttributeDataType::Reference => None,
        }
    }

    /// Whether this scalar value is the one a source token names.
    ///
    /// The token is read with this value's own type, so `"42"` matches
    /// `Integer(42)` and a guid token matches regardless of hex case. Text
    /// comparison is case-sensitive. References never match a token directly.
    #[must_use]
    pub fn matches_token(&self, token: &str) -> bool {
        match Self::parse_token(self.data_type(), token) {
            Some(parsed) => &parsed == self,
            None => false,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Text(v) => write!(f, "{v}"),
            AttributeValue::Integer(v) => write!(f, "{v}"),
            AttributeValue::Guid(v) => write!(f, "{v}"),
            AttributeValue::Boolean(v) => write!(f, "{v}"),
            AttributeValue::DateTime(v) => write!(f, "{}", v.to_rfc3339()),
            AttributeValue::Reference(r) => write!(f, "{r}"),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Integer(value)
    }
}

impl From<Uuid> for AttributeValue {
    fn from(value: Uuid) -> Self {
        AttributeValue::Guid(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Boolean(value)
    }
}

impl From<DateTime<Utc>> for AttributeValue {
    fn from(value: DateTime<Utc>) -> Self {
        AttributeValue::DateTime(value)
    }
}

/// External identifier values of one CSO.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalIds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<AttributeValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary: Option<AttributeValue>,
}

impl ExternalIds {
    #[must_use]
    pub fn new(primary: Option<AttributeValue>, secondary: Option<AttributeValue>) -> Self {
        Self { primary, secondary }
    }

    /// Compare against a source token using the primary identifier, or the
    /// secondary when no primary value exists.
    #[must_use]
    pub fn matches_token(&self, token: &str) -> bool {
        match (&self.primary, &self.secondary) {
            (Some(primary), _) => primary.matches_token(token),
            (None, Some(secondary)) => secondary.matches_token(token),
            (None, None) => false,
        }
    }
}

/// Navigation snapshot of a referenced CSO.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolvedTarget {
    pub id: CsoId,
    pub external_ids: ExternalIds,
    /// The target's own metaverse join, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metaverse_object_id: Option<MvoId>,
}

/// A reference from one CSO to another in the same connected system.
///
/// `target_id` is authoritative whenever it is set. `target` is the
/// materialized navigation and may be missing even when the id is known.
/// `unresolved_token` is the token the source system supplied when the value
/// was first imported; it is kept for the lifetime of the value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CsoReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<CsoId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Box<ResolvedTarget>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unresolved_token: Option<String>,
}

impl CsoReference {
    /// A reference known only by the source token.
    pub fn unresolved(token: impl Into<String>) -> Self {
        Self {
            target_id: None,
            target: None,
            unresolved_token: Some(token.into()),
        }
    }

    /// Attach a resolved target, keeping the original token.
    #[must_use]
    pub fn resolved_to(mut self, target: ResolvedTarget) -> Self {
        self.target_id = Some(target.id);
        self.target = Some(Box::new(target));
        self
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.target_id.is_some()
    }

    /// Drop the navigation snapshot, leaving id and token.
    pub fn clear_navigation(&mut self) {
        self.target = None;
    }
}

impl fmt::Display for CsoReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.target_id, &self.unresolved_token) {
            (Some(id), Some(token)) => write!(f, "{token} ({id})"),
            (Some(id), None) => write!(f, "{id}"),
            (None, Some(token)) => write!(f, "{token} (unresolved)"),
            (None, None) => write!(f, "(empty reference)"),
        }
    }
}

/// One value of a metaverse object attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum MetaverseValue {
    Text(String),
    Integer(i64),
    Guid(Uuid),
    Boolean(bool),
    DateTime(DateTime<Utc>),
    Reference(MvoId),
}

impl MetaverseValue {
    /// Carry a scalar CSO value across unchanged. References have no scalar
    /// counterpart and yield `None`.
    #[must_use]
    pub fn from_scalar(value: &AttributeValue) -> Option<Self> {
        match value {
            AttributeValue::Text(v) => Some(MetaverseValue::Text(v.clone())),
            AttributeValue::Integer(v) => Some(MetaverseValue::Integer(*v)),
            AttributeValue::Guid(v) => Some(MetaverseValue::Guid(*v)),
            AttributeValue::Boolean(v) => Some(MetaverseValue::Boolean(*v)),
            AttributeValue::DateTime(v) => Some(MetaverseValue::DateTime(*v)),
            AttributeValue::Reference(_) => None,
        }
    }

    #[must_use]
    pub fn as_reference(&self) -> Option<MvoId> {
        match self {
            MetaverseValue::Reference(id) => Some(*id),
            _ => None,
        }
    }
}
