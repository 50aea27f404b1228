//! Attribute Flow Tests
//!
//! Imported CSOs flowing into metaverse objects through sync rules:
//! - Reference values wait until both endpoints are in the metaverse
//! - One pending addition per source value
//! - Disconnection of deleted CSOs

mod common;

use common::*;
use meridian_core::MvoId;
use meridian_sync::{
    MetaverseObject, MetaverseValue, ObjectChangeType, SyncProcessor, SyncRule, SyncRuleMapping,
};

impl Harness {
    fn rule(&self, object_type: &str, attribute: &str, target: &str) -> SyncRule {
        let object_type = self
            .system
            .object_type_by_name(object_type)
            .expect("declared object type");
        let attribute = object_type
            .get_attribute(attribute)
            .expect("declared attribute");
        SyncRule::new("inbound", self.system.id, object_type.id, "person")
            .with_mapping(SyncRuleMapping::direct(attribute, target))
    }
}

#[tokio::test]
async fn test_reference_flows_only_once_target_is_joined() {
    let harness = Harness::new().await;
    harness
        .full_import(vec![user("U1"), group("Admins", &["U1"])])
        .await;
    let rules = vec![harness.rule("group", "member", "members")];
    let processor = SyncProcessor::new();

    let mut group_mvo = MetaverseObject::new("group");
    let admins = harness.expect("group", "Admins").await;
    harness.join(admins.id, group_mvo.id).await;

    // Resolved, but the member has no metaverse object yet.
    let mut admins = harness.expect("group", "Admins").await;
    let result = processor
        .process(&mut admins, Some(&mut group_mvo), &rules, &harness.system.object_types)
        .unwrap();
    assert_eq!(result.change_type, ObjectChangeType::NoChange);
    assert_eq!(result.pending_additions, 0);
    assert_eq!(result.skipped_references, 1);
    assert!(!group_mvo.has_pending_changes());

    let user_mvo = MvoId::new();
    let u1 = harness.expect("user", "U1").await;
    harness.join(u1.id, user_mvo).await;

    let mut admins = harness.expect("group", "Admins").await;
    let result = processor
        .process(&mut admins, Some(&mut group_mvo), &rules, &harness.system.object_types)
        .unwrap();
    assert_eq!(result.change_type, ObjectChangeType::Updated);
    assert!(result.has_changes);
    assert_eq!(result.pending_additions, 1);
    let queued: Vec<_> = group_mvo.pending_additions_for("members").cloned().collect();
    assert_eq!(queued, vec![MetaverseValue::Reference(user_mvo)]);
}

#[tokio::test]
async fn test_unresolved_reference_does_not_flow() {
    let harness = Harness::new().await;
    harness.full_import(vec![group("Admins", &["ghost"])]).await;
    let rules = vec![harness.rule("group", "member", "members")];

    let mut group_mvo = MetaverseObject::new("group");
    let admins = harness.expect("group", "Admins").await;
    harness.join(admins.id, group_mvo.id).await;
    let mut admins = harness.expect("group", "Admins").await;

    let result = SyncProcessor::new()
        .process(&mut admins, Some(&mut group_mvo), &rules, &harness.system.object_types)
        .unwrap();
    assert_eq!(result.skipped_references, 1);
    assert!(!group_mvo.has_pending_changes());
}

#[tokio::test]
async fn test_each_member_flows_to_its_own_metaverse_object() {
    let harness = Harness::new().await;
    harness
        .full_import(vec![user("U1"), user("U2"), group("Admins", &["U1", "U2"])])
        .await;
    let rules = vec![harness.rule("group", "member", "members")];

    let (mvo_1, mvo_2) = (MvoId::new(), MvoId::new());
    harness.join(harness.expect("user", "U1").await.id, mvo_1).await;
    harness.join(harness.expect("user", "U2").await.id, mvo_2).await;

    let mut group_mvo = MetaverseObject::new("group");
    let admins = harness.expect("group", "Admins").await;
    harness.join(admins.id, group_mvo.id).await;
    let mut admins = harness.expect("group", "Admins").await;

    let result = SyncProcessor::new()
        .process(&mut admins, Some(&mut group_mvo), &rules, &harness.system.object_types)
        .unwrap();
    assert_eq!(result.pending_additions, 2);
    let queued: Vec<_> = group_mvo.pending_additions_for("members").cloned().collect();
    assert_eq!(
        queued,
        vec![MetaverseValue::Reference(mvo_1), MetaverseValue::Reference(mvo_2)]
    );
}

#[tokio::test]
async fn test_multi_valued_scalars_flow_one_addition_per_value() {
    let harness = Harness::new().await;
    harness
        .full_import(vec![user("U1").with_values(
            "certificates",
            ["CERT-A", "CERT-B", "CERT-A", "CERT-C", "CERT-B"],
        )])
        .await;
    let rules = vec![harness.rule("user", "certificates", "certificates")];

    let mut person = MetaverseObject::new("person");
    let u1 = harness.expect("user", "U1").await;
    harness.join(u1.id, person.id).await;
    let mut u1 = harness.expect("user", "U1").await;

    SyncProcessor::new()
        .process(&mut u1, Some(&mut person), &rules, &harness.system.object_types)
        .unwrap();
    let queued: Vec<_> = person.pending_additions_for("certificates").cloned().collect();
    assert_eq!(
        queued,
        vec![
            MetaverseValue::Text("CERT-A".to_string()),
            MetaverseValue::Text("CERT-B".to_string()),
            MetaverseValue::Text("CERT-C".to_string()),
        ]
    );

    person.clear_pending();
    assert!(!person.has_pending_changes());
}

#[tokio::test]
async fn test_deleted_cso_is_disconnected() {
    let harness = Harness::new().await;
    harness.full_import(vec![user("U1")]).await;
    let rules = vec![harness.rule("user", "displayName", "displayName")];

    let person = MetaverseObject::new("person");
    let u1 = harness.expect("user", "U1").await;
    harness.join(u1.id, person.id).await;

    harness.delta_import(vec![deleted(user("U1"))]).await;
    let mut u1 = harness.store.get(u1.id).await.unwrap();
    assert!(!u1.is_normal());

    let result = SyncProcessor::new()
        .process(&mut u1, None, &rules, &harness.system.object_types)
        .unwrap();
    assert_eq!(result.change_type, ObjectChangeType::Disconnected);
    assert!(result.has_changes);
    assert_eq!(result.mvo_id, Some(person.id));
    assert!(!u1.is_joined());
}
