//! Common test utilities for meridian-sync integration tests.

#![allow(dead_code)]

use futures::StreamExt;
use meridian_connector::error::{ConnectorError, ConnectorResult};
use meridian_connector::import::{ConnectedSystemImportObject, ImportChangeType, ImportValue};
use meridian_connector::schema::{
    AttributeDataType, ConnectedSystemAttribute, ConnectedSystemObjectType,
};
use meridian_connector::traits::{ImportConnector, ImportRequest, ImportStream};
use meridian_core::{AttributeId, CsoId, MvoId, RunProfileId};
use meridian_sync::{
    AttributeValue, ConnectedSystem, ConnectedSystemObject, CsoWrite, ExternalIdLookup,
    ImportReconciler, ImportRunSummary, InMemoryCatalog, InMemoryCsoStore, RunProfile, RunType,
    SyncConfig, SyncResult,
};
use std::sync::{Arc, Mutex, Once};
use tokio_util::sync::CancellationToken;

static INIT: Once = Once::new();

/// Install a test subscriber when `RUST_LOG` is set.
pub fn init_tracing() {
    INIT.call_once(|| {
        if std::env::var("RUST_LOG").is_ok() {
            let _ = tracing_subscriber::fmt()
                .with_test_writer()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .try_init();
        }
    });
}

/// HR-style user type: text primary id, guid secondary id, a manager reference.
pub fn user_type() -> ConnectedSystemObjectType {
    ConnectedSystemObjectType::new("user")
        .with_attribute(
            ConnectedSystemAttribute::new("employeeId", AttributeDataType::Text)
                .as_primary_external_id(),
        )
        .with_attribute(
            ConnectedSystemAttribute::new("objectGuid", AttributeDataType::Guid)
                .as_secondary_external_id(),
        )
        .with_attribute(ConnectedSystemAttribute::new(
            "displayName",
            AttributeDataType::Text,
        ))
        .with_attribute(ConnectedSystemAttribute::new(
            "department",
            AttributeDataType::Text,
        ))
        .with_attribute(
            ConnectedSystemAttribute::new("certificates", AttributeDataType::Text).multi_valued(),
        )
        .with_attribute(ConnectedSystemAttribute::new(
            "manager",
            AttributeDataType::Reference,
        ))
}

/// Directory group with a multi-valued member reference.
pub fn group_type() -> ConnectedSystemObjectType {
    ConnectedSystemObjectType::new("group")
        .with_attribute(
            ConnectedSystemAttribute::new("name", AttributeDataType::Text)
                .as_primary_external_id(),
        )
        .with_attribute(
            ConnectedSystemAttribute::new("member", AttributeDataType::Reference).multi_valued(),
        )
}

/// Connected system with user and group types and one profile per run type.
pub fn default_system() -> ConnectedSystem {
    ConnectedSystem::new("HR")
        .with_object_type(user_type())
        .with_object_type(group_type())
        .with_run_profile(RunProfile::new("Full import", RunType::FullImport))
        .with_run_profile(RunProfile::new("Delta import", RunType::DeltaImport))
        .with_run_profile(RunProfile::new(
            "Full synchronisation",
            RunType::FullSynchronisation,
        ))
}

pub fn user(employee_id: &str) -> ConnectedSystemImportObject {
    ConnectedSystemImportObject::new("user").with_value("employeeId", employee_id)
}

pub fn group(name: &str, members: &[&str]) -> ConnectedSystemImportObject {
    ConnectedSystemImportObject::new("group")
        .with_value("name", name)
        .with_values("member", members.iter().map(|m| ImportValue::from(*m)))
}

pub fn deleted(object: ConnectedSystemImportObject) -> ConnectedSystemImportObject {
    object.with_change_type(ImportChangeType::Deleted)
}

/// Stream over a fixed list of objects.
pub fn stream(objects: Vec<ConnectedSystemImportObject>) -> ImportStream<'static> {
    futures::stream::iter(objects.into_iter().map(Ok)).boxed()
}

/// Stream over pre-built connector results.
pub fn stream_results(
    items: Vec<ConnectorResult<ConnectedSystemImportObject>>,
) -> ImportStream<'static> {
    futures::stream::iter(items).boxed()
}

/// Connector serving a fixed object list and recording the requests it got.
pub struct TestConnector {
    objects: Vec<ConnectedSystemImportObject>,
    pub requests: Mutex<Vec<ImportRequest>>,
}

impl TestConnector {
    pub fn new(objects: Vec<ConnectedSystemImportObject>) -> Self {
        Self {
            objects,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn last_request(&self) -> Option<ImportRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait::async_trait]
impl ImportConnector for TestConnector {
    fn display_name(&self) -> &str {
        "test"
    }

    async fn import(&self, request: &ImportRequest) -> ConnectorResult<ImportStream<'_>> {
        self.requests.lock().unwrap().push(request.clone());
        if self.objects.is_empty() {
            return Err(ConnectorError::connection_failed("no objects configured"));
        }
        Ok(futures::stream::iter(self.objects.clone().into_iter().map(Ok)).boxed())
    }
}

/// A connected system wired to in-memory stores and a reconciler.
pub struct Harness {
    pub system: ConnectedSystem,
    pub catalog: Arc<InMemoryCatalog>,
    pub store: Arc<InMemoryCsoStore>,
    pub reconciler: ImportReconciler,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_system(default_system()).await
    }

    pub async fn with_system(system: ConnectedSystem) -> Self {
        let store = Arc::new(InMemoryCsoStore::new());
        Self::build(system, store.clone(), store, SyncConfig::default()).await
    }

    pub async fn with_config(config: SyncConfig) -> Self {
        let store = Arc::new(InMemoryCsoStore::new());
        Self::build(default_system(), store.clone(), store, config).await
    }

    pub async fn build(
        system: ConnectedSystem,
        store: Arc<InMemoryCsoStore>,
        lookup: Arc<dyn ExternalIdLookup>,
        config: SyncConfig,
    ) -> Self {
        init_tracing();
        let catalog = Arc::new(InMemoryCatalog::new());
        catalog.insert(system.clone()).await;
        let reconciler = ImportReconciler::new(catalog.clone(), store.clone(), lookup, config)
            .expect("valid config");
        Self {
            system,
            catalog,
            store,
            reconciler,
        }
    }

    /// Same system and catalog over a different store and lookup.
    pub fn rewire(
        &self,
        store: Arc<InMemoryCsoStore>,
        lookup: Arc<dyn ExternalIdLookup>,
    ) -> ImportReconciler {
        ImportReconciler::new(self.catalog.clone(), store, lookup, SyncConfig::default())
            .expect("valid config")
    }

    pub fn profile(&self, run_type: RunType) -> RunProfileId {
        self.system
            .run_profiles
            .iter()
            .find(|p| p.run_type == run_type)
            .map(|p| p.id)
            .expect("profile for run type")
    }

    pub fn attribute(&self, object_type: &str, name: &str) -> AttributeId {
        self.system
            .object_type_by_name(object_type)
            .and_then(|t| t.get_attribute(name))
            .map(|a| a.id)
            .expect("declared attribute")
    }

    pub async fn run(
        &self,
        run_type: RunType,
        objects: Vec<ConnectedSystemImportObject>,
    ) -> SyncResult<ImportRunSummary> {
        self.reconciler
            .run(
                self.system.id,
                self.profile(run_type),
                stream(objects),
                &CancellationToken::new(),
            )
            .await
    }

    pub async fn full_import(&self, objects: Vec<ConnectedSystemImportObject>) -> ImportRunSummary {
        self.run(RunType::FullImport, objects)
            .await
            .expect("full import")
    }

    pub async fn delta_import(
        &self,
        objects: Vec<ConnectedSystemImportObject>,
    ) -> ImportRunSummary {
        self.run(RunType::DeltaImport, objects)
            .await
            .expect("delta import")
    }

    /// The Normal CSO of a type with the given text primary id.
    pub async fn find(
        &self,
        object_type: &str,
        external_id: &str,
    ) -> Option<ConnectedSystemObject> {
        let object_type = self.system.object_type_by_name(object_type)?;
        let found = meridian_sync::CsoStore::find_by_external_id(
            self.store.as_ref(),
            self.system.id,
            object_type.id,
            &AttributeValue::from(external_id),
        )
        .await
        .expect("store read");
        match found {
            Some(cso) => self.store.get(cso.id).await,
            None => None,
        }
    }

    pub async fn expect(&self, object_type: &str, external_id: &str) -> ConnectedSystemObject {
        self.find(object_type, external_id)
            .await
            .unwrap_or_else(|| panic!("{object_type} {external_id} should exist"))
    }

    pub async fn all(&self) -> Vec<ConnectedSystemObject> {
        self.store.all(self.system.id).await
    }

    /// Join a CSO to a metaverse object directly in the store.
    pub async fn join(&self, cso_id: CsoId, mvo_id: MvoId) {
        let mut cso = self.store.get(cso_id).await.expect("stored CSO");
        cso.join(mvo_id);
        meridian_sync::CsoStore::save_batch(self.store.as_ref(), vec![CsoWrite::Update(cso)])
            .await
            .expect("join saved");
    }
}

/// Text values of one attribute, in stored order.
pub fn texts(cso: &ConnectedSystemObject, attribute_id: AttributeId) -> Vec<String> {
    cso.values(attribute_id)
        .filter_map(AttributeValue::as_text)
        .map(str::to_string)
        .collect()
}
