//! Sync rules and attribute flow into metaverse objects.
//!
//! A sync rule links one CSO object type to one metaverse object type and
//! carries mappings from CSO source attributes to a metaverse attribute. The
//! mapping processor turns the current values of a CSO into pending additions
//! on the target MVO. Computing removals is left to the commit collaborator.

use meridian_connector::schema::{ConnectedSystemAttribute, ConnectedSystemObjectType};
use meridian_core::{AttributeId, ConnectedSystemId, MappingId, ObjectTypeId, SyncRuleId};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::dedup::deduplicate;
use crate::error::{SyncError, SyncResult};
use crate::model::{ConnectedSystemObject, MetaverseObject};
use crate::value::{AttributeValue, MetaverseValue};

/// One CSO attribute feeding a mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncRuleMappingSource {
    pub attribute_id: AttributeId,
}

/// Source attributes flowing into one metaverse attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRuleMapping {
    pub id: MappingId,
    pub target_attribute: String,
    pub sources: Vec<SyncRuleMappingSource>,
}

impl SyncRuleMapping {
    /// Create a mapping with no sources.
    pub fn new(target_attribute: impl Into<String>) -> Self {
        Self {
            id: MappingId::new(),
            target_attribute: target_attribute.into(),
            sources: Vec::new(),
        }
    }

    /// Create a mapping fed by a single attribute.
    pub fn direct(
        attribute: &ConnectedSystemAttribute,
        target_attribute: impl Into<String>,
    ) -> Self {
        Self::new(target_attribute).with_source(attribute.id)
    }

    #[must_use]
    pub fn with_source(mut self, attribute_id: AttributeId) -> Self {
        self.sources.push(SyncRuleMappingSource { attribute_id });
        self
    }
}

/// Inbound sync rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRule {
    pub id: SyncRuleId,
    pub name: String,
    pub connected_system_id: ConnectedSystemId,
    pub cso_object_type_id: ObjectTypeId,
    pub metaverse_object_type: String,
    pub enabled: bool,
    #[serde(default)]
    pub mappings: Vec<SyncRuleMapping>,
}

impl SyncRule {
    /// Create an enabled rule with no mappings.
    pub fn new(
        name: impl Into<String>,
        connected_system_id: ConnectedSystemId,
        cso_object_type_id: ObjectTypeId,
        metaverse_object_type: impl Into<String>,
    ) -> Self {
        Self {
            id: SyncRuleId::new(),
            name: name.into(),
            connected_system_id,
            cso_object_type_id,
            metaverse_object_type: metaverse_object_type.into(),
            enabled: true,
            mappings: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_mapping(mut self, mapping: SyncRuleMapping) -> Self {
        self.mappings.push(mapping);
        self
    }

    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Whether this rule flows the given CSO.
    #[must_use]
    pub fn applies_to(&self, cso: &ConnectedSystemObject) -> bool {
        self.enabled
            && self.connected_system_id == cso.connected_system_id
            && self.cso_object_type_id == cso.object_type_id
    }
}

/// Counts from processing one mapping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MappingOutcome {
    /// Pending additions queued on the MVO.
    pub queued: usize,
    /// Reference values held back because an endpoint is not in the metaverse.
    pub skipped: usize,
}

impl MappingOutcome {
    fn merge(&mut self, other: MappingOutcome) {
        self.queued += other.queued;
        self.skipped += other.skipped;
    }
}

/// Computes pending MVO additions from a CSO's current values.
#[derive(Debug, Clone, Copy, Default)]
pub struct MappingProcessor;

impl MappingProcessor {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Queue one pending addition per source value of `mapping` on `mvo`.
    ///
    /// Scalar values are deduplicated and carried as they are. A reference
    /// value flows as the referenced CSO's MVO, and only when the reference is
    /// resolved and that CSO is joined; otherwise it is skipped.
    pub fn process(
        &self,
        cso: &ConnectedSystemObject,
        mapping: &SyncRuleMapping,
        object_types: &[ConnectedSystemObjectType],
        mvo: &mut MetaverseObject,
    ) -> SyncResult<MappingOutcome> {
        let object_type = object_types
            .iter()
            .find(|t| t.id == cso.object_type_id)
            .ok_or_else(|| {
                SyncError::mapping(
                    &mapping.target_attribute,
                    format!("unknown object type {} for CSO {}", cso.object_type_id, cso.id),
                )
            })?;

        let mut outcome = MappingOutcome::default();
        for source in &mapping.sources {
            let attribute = object_type
                .get_attribute_by_id(source.attribute_id)
                .ok_or_else(|| {
                    SyncError::mapping(
                        &mapping.target_attribute,
                        format!(
                            "source attribute {} is not declared by object type '{}'",
                            source.attribute_id, object_type.name
                        ),
                    )
                })?;

            let values: Vec<AttributeValue> = cso.values(attribute.id).cloned().collect();
            let flowed = if attribute.is_reference() {
                flow_references(cso, attribute, &mapping.target_attribute, &values, mvo)
            } else {
                flow_scalars(&mapping.target_attribute, &values, mvo)
            };
            outcome.merge(flowed);
        }

        debug!(
            cso_id = %cso.id,
            mvo_id = %mvo.id,
            target_attribute = %mapping.target_attribute,
            queued = outcome.queued,
            skipped = outcome.skipped,
            "Processed mapping"
        );
        Ok(outcome)
    }
}

fn flow_scalars(
    target_attribute: &str,
    values: &[AttributeValue],
    mvo: &mut MetaverseObject,
) -> MappingOutcome {
    let mut outcome = MappingOutcome::default();
    for value in deduplicate(values) {
        if let Some(value) = MetaverseValue::from_scalar(&value) {
            mvo.queue_addition(target_attribute, value);
            outcome.queued += 1;
        }
    }
    outcome
}

fn flow_references(
    cso: &ConnectedSystemObject,
    attribute: &ConnectedSystemAttribute,
    target_attribute: &str,
    values: &[AttributeValue],
    mvo: &mut MetaverseObject,
) -> MappingOutcome {
    let mut outcome = MappingOutcome::default();
    for reference in values.iter().filter_map(AttributeValue::as_reference) {
        let referenced_mvo = reference
            .target
            .as_ref()
            .and_then(|target| target.metaverse_object_id);
        match referenced_mvo {
            Some(mvo_id) => {
                mvo.queue_addition(target_attribute, MetaverseValue::Reference(mvo_id));
                outcome.queued += 1;
            }
            None => {
                let reason = if reference.target.is_none() {
                    "reference not resolved"
                } else {
                    "referenced object not joined"
                };
                warn!(
                    cso_id = %cso.id,
                    attribute = %attribute.name,
                    reference = %reference,
                    reason,
                    "Skipping reference value"
                );
                outcome.skipped += 1;
            }
        }
    }
    outcome
}
