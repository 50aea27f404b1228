//! Connected system objects and metaverse objects.

use chrono::{DateTime, Utc};
use meridian_connector::schema::ConnectedSystemObjectType;
use meridian_core::{AttributeId, ConnectedSystemId, CsoId, MvoId, ObjectTypeId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{SyncError, SyncResult};
use crate::value::{AttributeValue, ExternalIds, MetaverseValue};

/// Lifecycle status of a CSO.
///
/// | from \ to | Normal | Obsolete |
/// |-----------|--------|----------|
/// | Normal    | yes    | yes      |
/// | Obsolete  | no     | no       |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CsoStatus {
    #[default]
    Normal,
    Obsolete,
}

impl CsoStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            CsoStatus::Normal => "normal",
            CsoStatus::Obsolete => "obsolete",
        }
    }

    /// Check if transition to target status is valid.
    #[must_use]
    pub fn can_transition_to(&self, target: CsoStatus) -> bool {
        match (self, target) {
            (CsoStatus::Normal, CsoStatus::Normal | CsoStatus::Obsolete) => true,
            (CsoStatus::Obsolete, _) => false,
        }
    }

    /// Check if this is a terminal status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, CsoStatus::Obsolete)
    }
}

impl fmt::Display for CsoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CsoStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "normal" => Ok(CsoStatus::Normal),
            "obsolete" => Ok(CsoStatus::Obsolete),
            _ => Err(format!("Unknown CSO status: {s}")),
        }
    }
}

/// One stored attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsoAttributeValue {
    pub attribute_id: AttributeId,
    pub value: AttributeValue,
}

/// Persisted representation of one object of one connected system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectedSystemObject {
    pub id: CsoId,
    pub connected_system_id: ConnectedSystemId,
    pub object_type_id: ObjectTypeId,

    /// Attribute holding the primary external identifier.
    pub external_id_attribute_id: AttributeId,

    /// Attribute holding the secondary external identifier, if the type has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_external_id_attribute_id: Option<AttributeId>,

    /// Partition the object was last imported from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<String>,

    pub status: CsoStatus,

    /// Values grouped by attribute in schema order.
    #[serde(default)]
    pub attribute_values: Vec<CsoAttributeValue>,

    /// The join.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metaverse_object_id: Option<MvoId>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConnectedSystemObject {
    /// Create a Normal, unjoined CSO with no values.
    ///
    /// Returns `None` when the object type declares no primary external
    /// identifier.
    #[must_use]
    pub fn new(
        connected_system_id: ConnectedSystemId,
        object_type: &ConnectedSystemObjectType,
    ) -> Option<Self> {
        let primary = object_type.primary_external_id()?;
        let now = Utc::now();
        Some(Self {
            id: CsoId::new(),
            connected_system_id,
            object_type_id: object_type.id,
            external_id_attribute_id: primary.id,
            secondary_external_id_attribute_id: object_type.secondary_external_id().map(|a| a.id),
            partition: None,
            status: CsoStatus::Normal,
            attribute_values: Vec::new(),
            metaverse_object_id: None,
            created_at: now,
            updated_at: now,
        })
    }

    #[must_use]
    pub fn is_normal(&self) -> bool {
        self.status == CsoStatus::Normal
    }

    #[must_use]
    pub fn is_joined(&self) -> bool {
        self.metaverse_object_id.is_some()
    }

    /// Values of one attribute, in stored order.
    pub fn values(&self, attribute_id: AttributeId) -> impl Iterator<Item = &AttributeValue> {
        self.attribute_values
            .iter()
            .filter(move |v| v.attribute_id == attribute_id)
            .map(|v| &v.value)
    }

    /// Replace every value of one attribute.
    pub fn set_values(&mut self, attribute_id: AttributeId, values: Vec<AttributeValue>) {
        let position = self
            .attribute_values
            .iter()
            .position(|v| v.attribute_id == attribute_id);
        self.attribute_values.retain(|v| v.attribute_id != attribute_id);

        let replacement = values.into_iter().map(|value| CsoAttributeValue {
            attribute_id,
            value,
        });
        match position {
            Some(index) => {
                let tail = self.attribute_values.split_off(index);
                self.attribute_values.extend(replacement);
                self.attribute_values.extend(tail);
            }
            None => self.attribute_values.extend(replacement),
        }
    }

    /// Primary external identifier value.
    #[must_use]
    pub fn external_id(&self) -> Option<&AttributeValue> {
        self.values(self.external_id_attribute_id).next()
    }

    /// Secondary external identifier value.
    #[must_use]
    pub fn secondary_external_id(&self) -> Option<&AttributeValue> {
        self.secondary_external_id_attribute_id
            .and_then(|id| self.values(id).next())
    }

    #[must_use]
    pub fn external_ids(&self) -> ExternalIds {
        ExternalIds::new(
            self.external_id().cloned(),
            self.secondary_external_id().cloned(),
        )
    }

    /// Move to a new status, enforcing the transition table.
    pub fn transition_to(&mut self, target: CsoStatus) -> SyncResult<()> {
        if !self.status.can_transition_to(target) {
            return Err(SyncError::invalid_state_transition(
                self.status.as_str(),
                target.as_str(),
            ));
        }
        self.status = target;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Remove the join, returning the previously joined MVO.
    pub fn unjoin(&mut self) -> Option<MvoId> {
        let previous = self.metaverse_object_id.take();
        if previous.is_some() {
            self.updated_at = Utc::now();
        }
        previous
    }

    /// Join to a metaverse object.
    pub fn join(&mut self, mvo_id: MvoId) {
        self.metaverse_object_id = Some(mvo_id);
        self.updated_at = Utc::now();
    }

    /// Stamp the modification time.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// One value queued for, or stored on, a metaverse attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetaverseAttributeValue {
    pub attribute: String,
    pub value: MetaverseValue,
}

/// Canonical identity record.
///
/// The pending queues are filled by attribute flow and drained by the
/// commit collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaverseObject {
    pub id: MvoId,
    pub object_type: String,
    #[serde(default)]
    pub attribute_values: Vec<MetaverseAttributeValue>,
    #[serde(default)]
    pub pending_additions: Vec<MetaverseAttributeValue>,
    #[serde(default)]
    pub pending_removals: Vec<MetaverseAttributeValue>,
}

impl MetaverseObject {
    pub fn new(object_type: impl Into<String>) -> Self {
        Self {
            id: MvoId::new(),
            object_type: object_type.into(),
            attribute_values: Vec::new(),
            pending_additions: Vec::new(),
            pending_removals: Vec::new(),
        }
    }

    /// Current values of one attribute.
    pub fn values<'a>(&'a self, attribute: &'a str) -> impl Iterator<Item = &'a MetaverseValue> {
        self.attribute_values
            .iter()
            .filter(move |v| v.attribute == attribute)
            .map(|v| &v.value)
    }

    /// Pending additions for one attribute.
    pub fn pending_additions_for<'a>(
        &'a self,
        attribute: &'a str,
    ) -> impl Iterator<Item = &'a MetaverseValue> {
        self.pending_additions
            .iter()
            .filter(move |v| v.attribute == attribute)
            .map(|v| &v.value)
    }

    pub fn queue_addition(&mut self, attribute: impl Into<String>, value: MetaverseValue) {
        self.pending_additions.push(MetaverseAttributeValue {
            attribute: attribute.into(),
            value,
        });
    }

    pub fn queue_removal(&mut self, attribute: impl Into<String>, value: MetaverseValue) {
        self.pending_removals.push(MetaverseAttributeValue {
            attribute: attribute.into(),
            value,
        });
    }

    #[must_use]
    pub fn has_pending_changes(&self) -> bool {
        !self.pending_additions.is_empty() || !self.pending_removals.is_empty()
    }

    /// Empty both queues.
    pub fn clear_pending(&mut self) {
        self.pending_additions.clear();
        self.pending_removals.clear();
    }
}
