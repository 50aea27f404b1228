//! Reference Tests
//!
//! Reference attributes through the import pipeline:
//! - Resolution of tokens after ingestion, including forward references
//! - Re-linking references whose target became obsolete and came back
//! - Stability of resolved references across re-imports when the store
//!   does not materialize navigation
//! - Membership changes

mod common;

use common::*;
use meridian_core::{AttributeId, CsoId};
use meridian_sync::{
    AttributeValue, ConnectedSystemObject, CsoReference, InMemoryCsoStore, NoExternalIdLookup,
    ObjectChangeType, SyncConfig,
};
use std::sync::Arc;
use uuid::Uuid;

fn references(cso: &ConnectedSystemObject, attribute_id: AttributeId) -> Vec<CsoReference> {
    cso.values(attribute_id)
        .filter_map(AttributeValue::as_reference)
        .cloned()
        .collect()
}

fn target_ids(cso: &ConnectedSystemObject, attribute_id: AttributeId) -> Vec<Option<CsoId>> {
    references(cso, attribute_id)
        .into_iter()
        .map(|r| r.target_id)
        .collect()
}

/// Harness over a store that never materializes navigation.
async fn degraded_harness(with_lookup: bool) -> Harness {
    let store = Arc::new(InMemoryCsoStore::new().with_degraded_navigation());
    if with_lookup {
        Harness::build(default_system(), store.clone(), store, SyncConfig::default()).await
    } else {
        Harness::build(
            default_system(),
            store,
            Arc::new(NoExternalIdLookup),
            SyncConfig::default(),
        )
        .await
    }
}

#[tokio::test]
async fn test_forward_references_are_resolved_after_ingestion() {
    let harness = Harness::new().await;
    let member = harness.attribute("group", "member");

    let summary = harness
        .full_import(vec![group("Admins", &["U1", "U2"]), user("U1"), user("U2")])
        .await;
    assert_eq!(summary.statistics.references_resolved, 2);
    assert_eq!(summary.statistics.references_unresolved, 0);

    let u1 = harness.expect("user", "U1").await;
    let u2 = harness.expect("user", "U2").await;
    let admins = harness.expect("group", "Admins").await;
    assert_eq!(target_ids(&admins, member), vec![Some(u1.id), Some(u2.id)]);

    // The source token is kept alongside the resolved id.
    let tokens: Vec<_> = references(&admins, member)
        .into_iter()
        .map(|r| r.unresolved_token)
        .collect();
    assert_eq!(tokens, vec![Some("U1".to_string()), Some("U2".to_string())]);
}

#[tokio::test]
async fn test_unresolvable_token_is_kept_and_resolved_later() {
    let harness = Harness::new().await;
    let member = harness.attribute("group", "member");

    let summary = harness.full_import(vec![group("Admins", &["ghost"])]).await;
    assert_eq!(summary.statistics.references_unresolved, 1);
    let admins = harness.expect("group", "Admins").await;
    assert_eq!(target_ids(&admins, member), vec![None]);

    // The same token again is the same value, now resolvable.
    let summary = harness
        .full_import(vec![group("Admins", &["ghost"]), user("ghost")])
        .await;
    let result = summary.result_for(admins.id).unwrap();
    assert_eq!(result.change_type, ObjectChangeType::NoChange);
    assert_eq!(summary.statistics.references_resolved, 1);

    let ghost = harness.expect("user", "ghost").await;
    let admins = harness.expect("group", "Admins").await;
    assert_eq!(target_ids(&admins, member), vec![Some(ghost.id)]);
}

#[tokio::test]
async fn test_delta_import_resolves_references_of_untouched_objects() {
    let harness = Harness::new().await;
    let member = harness.attribute("group", "member");

    harness.full_import(vec![group("Admins", &["U9"])]).await;

    // Only the member arrives; the group is not part of this run.
    let summary = harness.delta_import(vec![user("U9")]).await;
    assert_eq!(summary.statistics.references_resolved, 1);
    assert_eq!(summary.statistics.references_unresolved, 0);

    let u9 = harness.expect("user", "U9").await;
    let admins = harness.expect("group", "Admins").await;
    assert_eq!(target_ids(&admins, member), vec![Some(u9.id)]);
}

#[tokio::test]
async fn test_reference_follows_reappearing_target() {
    for harness in [Harness::new().await, degraded_harness(true).await] {
        let member = harness.attribute("group", "member");
        let objects = vec![user("U1"), group("Admins", &["U1"])];

        harness.full_import(objects.clone()).await;
        let old = harness.expect("user", "U1").await;
        let admins = harness.expect("group", "Admins").await;

        harness.delta_import(vec![deleted(user("U1"))]).await;
        let stored = harness.store.get(admins.id).await.unwrap();
        assert_eq!(target_ids(&stored, member), vec![None]);

        let summary = harness.delta_import(objects).await;
        assert_eq!(
            summary.result_for(admins.id).unwrap().change_type,
            ObjectChangeType::NoChange
        );

        let new = harness.expect("user", "U1").await;
        assert_ne!(new.id, old.id);
        let admins = harness.expect("group", "Admins").await;
        assert_eq!(target_ids(&admins, member), vec![Some(new.id)]);
    }
}

#[tokio::test]
async fn test_reference_to_swept_target_is_relinked_when_it_returns() {
    let harness = Harness::new().await;
    let member = harness.attribute("group", "member");

    harness
        .full_import(vec![user("U1"), group("Admins", &["U1"])])
        .await;
    let old = harness.expect("user", "U1").await;

    // U1 drops out of the source; the group still lists it.
    let summary = harness.full_import(vec![group("Admins", &["U1"])]).await;
    assert_eq!(summary.statistics.obsoleted, 1);
    assert_eq!(summary.statistics.references_unresolved, 1);
    let admins = harness.expect("group", "Admins").await;
    assert_eq!(target_ids(&admins, member), vec![None]);
    assert_eq!(
        references(&admins, member)[0].unresolved_token.as_deref(),
        Some("U1")
    );

    let summary = harness.delta_import(vec![user("U1")]).await;
    assert_eq!(summary.statistics.references_resolved, 1);
    let new = harness.expect("user", "U1").await;
    assert_ne!(new.id, old.id);
    let admins = harness.expect("group", "Admins").await;
    assert_eq!(target_ids(&admins, member), vec![Some(new.id)]);
}

#[tokio::test]
async fn test_reference_tokens_resolve_by_secondary_identifier() {
    let harness = Harness::new().await;
    let manager = harness.attribute("user", "manager");
    let guid = Uuid::new_v4();

    harness
        .full_import(vec![
            user("E1").with_value("objectGuid", guid),
            user("E2").with_value("manager", guid.to_string()),
        ])
        .await;

    let e1 = harness.expect("user", "E1").await;
    let e2 = harness.expect("user", "E2").await;
    assert_eq!(target_ids(&e2, manager), vec![Some(e1.id)]);
}

#[tokio::test]
async fn test_token_fallback_preserves_reference_across_reimport() {
    let harness = degraded_harness(false).await;
    let member = harness.attribute("group", "member");
    let objects = vec![user("U1"), group("Admins", &["U1"])];

    harness.full_import(objects.clone()).await;
    let u1 = harness.expect("user", "U1").await;
    let admins = harness.expect("group", "Admins").await;
    assert_eq!(target_ids(&admins, member), vec![Some(u1.id)]);

    // Navigation is missing and the lookup knows nothing: only the stored
    // token can confirm the value.
    let summary = harness.full_import(objects).await;
    let result = summary.result_for(admins.id).unwrap();
    assert_eq!(result.change_type, ObjectChangeType::NoChange);
    assert!(!result.has_changes);
    assert!(result.attribute_changes.is_empty());

    let admins = harness.expect("group", "Admins").await;
    assert_eq!(target_ids(&admins, member), vec![Some(u1.id)]);
}

#[tokio::test]
async fn test_lookup_tier_matches_when_token_changed_form() {
    for (with_lookup, expected) in [
        (true, ObjectChangeType::NoChange),
        (false, ObjectChangeType::Updated),
    ] {
        let harness = degraded_harness(with_lookup).await;
        let guid = Uuid::new_v4();
        let guid_token = guid.to_string();

        // First seen by guid, later by employee id.
        harness
            .full_import(vec![
                user("U1").with_value("objectGuid", guid),
                group("Admins", &[guid_token.as_str()]),
            ])
            .await;
        let admins = harness.expect("group", "Admins").await;

        let summary = harness
            .full_import(vec![
                user("U1").with_value("objectGuid", guid),
                group("Admins", &["U1"]),
            ])
            .await;
        assert_eq!(
            summary.result_for(admins.id).unwrap().change_type,
            expected,
            "with_lookup = {with_lookup}"
        );
    }
}

#[tokio::test]
async fn test_membership_change_removes_and_adds() {
    let harness = degraded_harness(false).await;
    let member = harness.attribute("group", "member");

    harness
        .full_import(vec![user("U1"), user("U2"), group("Admins", &["U1"])])
        .await;
    let admins = harness.expect("group", "Admins").await;

    let summary = harness
        .full_import(vec![user("U1"), user("U2"), group("Admins", &["U2"])])
        .await;
    let result = summary.result_for(admins.id).unwrap();
    assert_eq!(result.change_type, ObjectChangeType::Updated);
    let change = &result.attribute_changes[0];
    assert_eq!(change.attribute_name, "member");
    assert_eq!(change.removed.len(), 1);
    assert_eq!(
        change.added,
        vec![AttributeValue::Reference(CsoReference::unresolved("U2"))]
    );

    let u2 = harness.expect("user", "U2").await;
    let admins = harness.expect("group", "Admins").await;
    assert_eq!(target_ids(&admins, member), vec![Some(u2.id)]);
}

#[tokio::test]
async fn test_reference_tokens_are_case_sensitive_and_deduplicated() {
    let harness = Harness::new().await;
    let member = harness.attribute("group", "member");

    harness
        .full_import(vec![
            user("U1"),
            user("u1"),
            group("Admins", &["U1", "U1", "u1"]),
        ])
        .await;

    let admins = harness.expect("group", "Admins").await;
    let u1 = harness.expect("user", "U1").await;
    let lower = harness.expect("user", "u1").await;
    assert_eq!(target_ids(&admins, member), vec![Some(u1.id), Some(lower.id)]);
}
