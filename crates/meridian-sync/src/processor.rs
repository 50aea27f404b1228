//! Synchronisation of one CSO into its joined metaverse object.

use meridian_connector::schema::ConnectedSystemObjectType;
use meridian_core::{CsoId, MvoId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::error::{SyncError, SyncResult};
use crate::import::ObjectChangeType;
use crate::mapping::{MappingProcessor, SyncRule};
use crate::model::{ConnectedSystemObject, MetaverseObject};

/// Outcome of synchronising one CSO.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncObjectResult {
    pub cso_id: CsoId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mvo_id: Option<MvoId>,
    pub change_type: ObjectChangeType,
    pub has_changes: bool,
    /// Pending additions queued on the MVO.
    pub pending_additions: usize,
    /// Reference values that could not flow yet.
    pub skipped_references: usize,
}

impl SyncObjectResult {
    fn new(cso_id: CsoId, mvo_id: Option<MvoId>, change_type: ObjectChangeType) -> Self {
        Self {
            cso_id,
            mvo_id,
            change_type,
            has_changes: change_type.reports_change(),
            pending_additions: 0,
            skipped_references: 0,
        }
    }
}

/// Runs inbound sync rules for CSOs.
///
/// The caller persists the CSO and MVO afterwards.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncProcessor {
    mappings: MappingProcessor,
}

impl SyncProcessor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Synchronise one CSO.
    ///
    /// An Obsolete joined CSO is disconnected. A Normal joined CSO flows every
    /// mapping of every enabled rule for its type into `mvo`. Unjoined CSOs are
    /// left alone.
    #[instrument(skip_all, fields(cso_id = %cso.id))]
    pub fn process(
        &self,
        cso: &mut ConnectedSystemObject,
        mvo: Option<&mut MetaverseObject>,
        rules: &[SyncRule],
        object_types: &[ConnectedSystemObjectType],
    ) -> SyncResult<SyncObjectResult> {
        let Some(mvo_id) = cso.metaverse_object_id else {
            debug!("CSO not joined, nothing to synchronise");
            return Ok(SyncObjectResult::new(cso.id, None, ObjectChangeType::NoChange));
        };

        if !cso.is_normal() {
            cso.unjoin();
            info!(mvo_id = %mvo_id, "Obsolete CSO disconnected from metaverse object");
            return Ok(SyncObjectResult::new(
                cso.id,
                Some(mvo_id),
                ObjectChangeType::Disconnected,
            ));
        }

        let mvo = mvo.ok_or_else(|| SyncError::not_found("metaverse object", mvo_id.to_string()))?;
        if mvo.id != mvo_id {
            return Err(SyncError::internal(format!(
                "CSO {} is joined to {mvo_id}, got metaverse object {}",
                cso.id, mvo.id
            )));
        }

        let mut pending_additions = 0;
        let mut skipped_references = 0;
        for rule in rules.iter().filter(|r| r.applies_to(cso)) {
            for mapping in &rule.mappings {
                let outcome = self.mappings.process(cso, mapping, object_types, mvo)?;
                pending_additions += outcome.queued;
                skipped_references += outcome.skipped;
            }
        }

        let change_type = if pending_additions > 0 {
            ObjectChangeType::Updated
        } else {
            ObjectChangeType::NoChange
        };
        debug!(
            mvo_id = %mvo_id,
            change_type = %change_type,
            pending_additions,
            skipped_references,
            "Synchronised CSO"
        );

        let mut result = SyncObjectResult::new(cso.id, Some(mvo_id), change_type);
        result.pending_additions = pending_additions;
        result.skipped_references = skipped_references;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::SyncRuleMapping;
    use crate::model::CsoStatus;
    use meridian_connector::schema::{AttributeDataType, ConnectedSystemAttribute};
    use meridian_core::ConnectedSystemId;

    fn user_type() -> ConnectedSystemObjectType {
        ConnectedSystemObjectType::new("user")
            .with_attribute(
                ConnectedSystemAttribute::new("employeeId", AttributeDataType::Text)
                    .as_primary_external_id(),
            )
            .with_attribute(ConnectedSystemAttribute::new(
                "displayName",
                AttributeDataType::Text,
            ))
    }

    fn fixture() -> (ConnectedSystemObjectType, ConnectedSystemObject, Vec<SyncRule>) {
        let object_type = user_type();
        let system = ConnectedSystemId::new();
        let mut cso = ConnectedSystemObject::new(system, &object_type).unwrap();
        let display_name = object_type.get_attribute("displayName").unwrap();
        cso.set_values(display_name.id, vec!["Ada".into()]);

        let rules = vec![SyncRule::new("users", system, object_type.id, "person")
            .with_mapping(SyncRuleMapping::direct(display_name, "displayName"))];
        (object_type, cso, rules)
    }

    #[test]
    fn test_unjoined_is_no_change() {
        let (object_type, mut cso, rules) = fixture();
        let result = SyncProcessor::new()
            .process(&mut cso, None, &rules, &[object_type])
            .unwrap();
        assert_eq!(result.change_type, ObjectChangeType::NoChange);
        assert!(!result.has_changes);
    }

    #[test]
    fn test_joined_flows_mappings() {
        let (object_type, mut cso, rules) = fixture();
        let mut mvo = MetaverseObject::new("person");
        cso.join(mvo.id);

        let result = SyncProcessor::new()
            .process(&mut cso, Some(&mut mvo), &rules, &[object_type.clone()])
            .unwrap();
        assert_eq!(result.change_type, ObjectChangeType::Updated);
        assert_eq!(result.pending_additions, 1);
        assert!(mvo.has_pending_changes());

        // Disabled rules do not flow.
        let disabled: Vec<SyncRule> = rules.into_iter().map(SyncRule::disabled).collect();
        mvo.clear_pending();
        let result = SyncProcessor::new()
            .process(&mut cso, Some(&mut mvo), &disabled, &[object_type])
            .unwrap();
        assert_eq!(result.change_type, ObjectChangeType::NoChange);
        assert!(!mvo.has_pending_changes());
    }

    #[test]
    fn test_obsolete_joined_disconnects() {
        let (object_type, mut cso, rules) = fixture();
        let mvo_id = MvoId::new();
        cso.join(mvo_id);
        cso.transition_to(CsoStatus::Obsolete).unwrap();

        let result = SyncProcessor::new()
            .process(&mut cso, None, &rules, &[object_type])
            .unwrap();
        assert_eq!(result.change_type, ObjectChangeType::Disconnected);
        assert!(result.has_changes);
        assert_eq!(result.mvo_id, Some(mvo_id));
        assert!(!cso.is_joined());
    }

    #[test]
    fn test_joined_without_mvo_is_error() {
        let (object_type, mut cso, rules) = fixture();
        cso.join(MvoId::new());
        let err = SyncProcessor::new()
            .process(&mut cso, None, &rules, &[object_type])
            .unwrap_err();
        assert!(matches!(err, SyncError::NotFound { .. }));
    }
}
