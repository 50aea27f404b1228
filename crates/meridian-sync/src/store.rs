//! Persistence seams and in-memory implementations.
//!
//! The core issues match reads and batched write intents; the store owns
//! transactions and locking. The in-memory stores back the tests and can be
//! embedded where no database is wanted.

use async_trait::async_trait;
use meridian_core::{ConnectedSystemId, CsoId, ObjectTypeId};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::{SyncError, SyncResult};
use crate::model::ConnectedSystemObject;
use crate::reference::ExternalIdLookup;
use crate::system::{ConnectedSystem, ConnectedSystemCatalog};
use crate::value::{AttributeValue, ExternalIds, ResolvedTarget};

/// One write intent.
#[derive(Debug, Clone, PartialEq)]
pub enum CsoWrite {
    Create(ConnectedSystemObject),
    Update(ConnectedSystemObject),
}

impl CsoWrite {
    #[must_use]
    pub fn object(&self) -> &ConnectedSystemObject {
        match self {
            CsoWrite::Create(cso) | CsoWrite::Update(cso) => cso,
        }
    }

    #[must_use]
    pub fn into_object(self) -> ConnectedSystemObject {
        match self {
            CsoWrite::Create(cso) | CsoWrite::Update(cso) => cso,
        }
    }
}

/// Storage for connected system objects.
#[async_trait]
pub trait CsoStore: Send + Sync {
    /// Find the Normal CSO of a type whose primary external id equals `value`.
    async fn find_by_external_id(
        &self,
        connected_system_id: ConnectedSystemId,
        object_type_id: ObjectTypeId,
        value: &AttributeValue,
    ) -> SyncResult<Option<ConnectedSystemObject>>;

    /// Find the Normal CSO of a type whose secondary external id equals `value`.
    async fn find_by_secondary_external_id(
        &self,
        connected_system_id: ConnectedSystemId,
        object_type_id: ObjectTypeId,
        value: &AttributeValue,
    ) -> SyncResult<Option<ConnectedSystemObject>>;

    /// Get CSOs by id, any status. Unknown ids are skipped.
    async fn get_many(&self, ids: &[CsoId]) -> SyncResult<Vec<ConnectedSystemObject>>;

    /// All Normal CSOs of a connected system, restricted to one partition
    /// when `partition` is given.
    async fn list_normal(
        &self,
        connected_system_id: ConnectedSystemId,
        partition: Option<&str>,
    ) -> SyncResult<Vec<ConnectedSystemObject>>;

    /// Normal CSOs of a connected system holding at least one reference
    /// value without a live target: no target id, or a target that is
    /// missing or no longer Normal.
    async fn list_with_unresolved_references(
        &self,
        connected_system_id: ConnectedSystemId,
    ) -> SyncResult<Vec<ConnectedSystemObject>>;

    /// Apply writes as one unit.
    async fn save_batch(&self, writes: Vec<CsoWrite>) -> SyncResult<()>;
}

/// Key of the primary external id index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ExternalIdKey {
    connected_system_id: ConnectedSystemId,
    object_type_id: ObjectTypeId,
    value: AttributeValue,
}

impl ExternalIdKey {
    /// Only Normal CSOs hold their external id.
    fn of(cso: &ConnectedSystemObject) -> Option<Self> {
        if !cso.is_normal() {
            return None;
        }
        cso.external_id().map(|value| Self {
            connected_system_id: cso.connected_system_id,
            object_type_id: cso.object_type_id,
            value: value.clone(),
        })
    }
}

#[derive(Debug, Default)]
struct Objects {
    by_id: HashMap<CsoId, ConnectedSystemObject>,
    by_external_id: HashMap<ExternalIdKey, CsoId>,
}

impl Objects {
    fn insert(&mut self, cso: ConnectedSystemObject) {
        if let Some(key) = self.by_id.get(&cso.id).and_then(ExternalIdKey::of) {
            if self.by_external_id.get(&key) == Some(&cso.id) {
                self.by_external_id.remove(&key);
            }
        }
        if let Some(key) = ExternalIdKey::of(&cso) {
            self.by_external_id.insert(key, cso.id);
        }
        self.by_id.insert(cso.id, cso);
    }

    fn is_live(&self, id: CsoId) -> bool {
        self.by_id.get(&id).is_some_and(ConnectedSystemObject::is_normal)
    }

    /// Navigation only reaches Normal targets.
    fn navigate(&self, target_id: CsoId) -> Option<Box<ResolvedTarget>> {
        self.by_id
            .get(&target_id)
            .filter(|target| target.is_normal())
            .map(|target| {
                Box::new(ResolvedTarget {
                    id: target.id,
                    external_ids: target.external_ids(),
                    metaverse_object_id: target.metaverse_object_id,
                })
            })
    }

    fn has_unresolved_reference(&self, cso: &ConnectedSystemObject) -> bool {
        cso.attribute_values
            .iter()
            .filter_map(|v| v.value.as_reference())
            .any(|r| r.target_id.map_or(true, |id| !self.is_live(id)))
    }
}

/// In-memory [`CsoStore`].
///
/// Reference navigation is not stored: it is rebuilt on every read from the
/// target CSO's current identifiers and join.
#[derive(Debug, Default)]
pub struct InMemoryCsoStore {
    objects: RwLock<Objects>,
    degraded_navigation: bool,
    batches: RwLock<Vec<usize>>,
}

impl InMemoryCsoStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Leave reference navigation unmaterialized on every read, as a storage
    /// layer with a partially failed fetch would.
    #[must_use]
    pub fn with_degraded_navigation(mut self) -> Self {
        self.degraded_navigation = true;
        self
    }

    /// Insert objects directly.
    pub async fn seed(&self, objects: impl IntoIterator<Item = ConnectedSystemObject>) {
        let mut guard = self.objects.write().await;
        for cso in objects {
            guard.insert(cso);
        }
    }

    /// Get one CSO with full navigation, regardless of degradation.
    pub async fn get(&self, id: CsoId) -> Option<ConnectedSystemObject> {
        let guard = self.objects.read().await;
        let mut cso = guard.by_id.get(&id)?.clone();
        for value in &mut cso.attribute_values {
            if let Some(reference) = value.value.as_reference_mut() {
                reference.target = reference
                    .target_id
                    .and_then(|target_id| guard.navigate(target_id));
            }
        }
        Some(cso)
    }

    /// Every stored CSO of a connected system.
    pub async fn all(&self, connected_system_id: ConnectedSystemId) -> Vec<ConnectedSystemObject> {
        self.objects
            .read()
            .await
            .by_id
            .values()
            .filter(|c| c.connected_system_id == connected_system_id)
            .cloned()
            .collect()
    }

    /// Sizes of the batches saved so far.
    pub async fn batch_sizes(&self) -> Vec<usize> {
        self.batches.read().await.clone()
    }

    /// Rebuild reference navigation from the current state of each target.
    fn materialize(&self, objects: &Objects, cso: &ConnectedSystemObject) -> ConnectedSystemObject {
        let mut cso = cso.clone();
        for value in &mut cso.attribute_values {
            let Some(reference) = value.value.as_reference_mut() else {
                continue;
            };
            reference.target = match (self.degraded_navigation, reference.target_id) {
                (false, Some(target_id)) => objects.navigate(target_id),
                _ => None,
            };
        }
        cso
    }
}

#[async_trait]
impl CsoStore for InMemoryCsoStore {
    async fn find_by_external_id(
        &self,
        connected_system_id: ConnectedSystemId,
        object_type_id: ObjectTypeId,
        value: &AttributeValue,
    ) -> SyncResult<Option<ConnectedSystemObject>> {
        let guard = self.objects.read().await;
        let key = ExternalIdKey {
            connected_system_id,
            object_type_id,
            value: value.clone(),
        };
        Ok(guard
            .by_external_id
            .get(&key)
            .and_then(|id| guard.by_id.get(id))
            .map(|c| self.materialize(&guard, c)))
    }

    async fn find_by_secondary_external_id(
        &self,
        connected_system_id: ConnectedSystemId,
        object_type_id: ObjectTypeId,
        value: &AttributeValue,
    ) -> SyncResult<Option<ConnectedSystemObject>> {
        let guard = self.objects.read().await;
        let mut found = guard.by_id.values().filter(|c| {
            c.connected_system_id == connected_system_id
                && c.object_type_id == object_type_id
                && c.is_normal()
                && c.secondary_external_id() == Some(value)
        });
        let first = found.next();
        if let Some(other) = found.next() {
            return Err(SyncError::store(format!(
                "secondary external id is shared by Normal CSOs {} and {}",
                first.map(|c| c.id.to_string()).unwrap_or_default(),
                other.id
            )));
        }
        Ok(first.map(|c| self.materialize(&guard, c)))
    }

    async fn get_many(&self, ids: &[CsoId]) -> SyncResult<Vec<ConnectedSystemObject>> {
        let guard = self.objects.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| guard.by_id.get(id))
            .map(|c| self.materialize(&guard, c))
            .collect())
    }

    async fn list_normal(
        &self,
        connected_system_id: ConnectedSystemId,
        partition: Option<&str>,
    ) -> SyncResult<Vec<ConnectedSystemObject>> {
        let guard = self.objects.read().await;
        Ok(guard
            .by_id
            .values()
            .filter(|c| c.connected_system_id == connected_system_id && c.is_normal())
            .filter(|c| partition.is_none() || c.partition.as_deref() == partition)
            .map(|c| self.materialize(&guard, c))
            .collect())
    }

    async fn list_with_unresolved_references(
        &self,
        connected_system_id: ConnectedSystemId,
    ) -> SyncResult<Vec<ConnectedSystemObject>> {
        let guard = self.objects.read().await;
        Ok(guard
            .by_id
            .values()
            .filter(|c| c.connected_system_id == connected_system_id && c.is_normal())
            .filter(|c| guard.has_unresolved_reference(c))
            .map(|c| self.materialize(&guard, c))
            .collect())
    }

    async fn save_batch(&self, writes: Vec<CsoWrite>) -> SyncResult<()> {
        let mut guard = self.objects.write().await;

        // Validate the whole batch before applying any of it.
        let mut finals: HashMap<CsoId, &ConnectedSystemObject> = HashMap::new();
        for write in &writes {
            let cso = write.object();
            let exists = guard.by_id.contains_key(&cso.id) || finals.contains_key(&cso.id);
            match write {
                CsoWrite::Create(_) if exists => {
                    return Err(SyncError::store(format!("CSO {} already exists", cso.id)));
                }
                CsoWrite::Update(_) if !exists => {
                    return Err(SyncError::store(format!("CSO {} does not exist", cso.id)));
                }
                _ => {}
            }
            finals.insert(cso.id, cso);
        }

        let mut claimed: HashMap<ExternalIdKey, CsoId> = HashMap::new();
        for cso in finals.values() {
            let Some(key) = ExternalIdKey::of(cso) else {
                continue;
            };
            let held_elsewhere = guard.by_external_id.get(&key).is_some_and(|holder| {
                *holder != cso.id
                    && finals
                        .get(holder)
                        .map_or(true, |h| ExternalIdKey::of(h).as_ref() == Some(&key))
            });
            if held_elsewhere || claimed.insert(key.clone(), cso.id).is_some() {
                return Err(SyncError::store(format!(
                    "a Normal CSO with external id '{}' already exists",
                    key.value
                )));
            }
        }

        let count = writes.len();
        for write in writes {
            let mut cso = write.into_object();
            for value in &mut cso.attribute_values {
                if let Some(reference) = value.value.as_reference_mut() {
                    reference.clear_navigation();
                }
            }
            guard.insert(cso);
        }
        self.batches.write().await.push(count);
        Ok(())
    }
}

#[async_trait]
impl ExternalIdLookup for InMemoryCsoStore {
    async fn external_ids(&self, ids: &[CsoId]) -> SyncResult<HashMap<CsoId, ExternalIds>> {
        let guard = self.objects.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| guard.by_id.get(id))
            .filter(|c| c.is_normal())
            .map(|c| (c.id, c.external_ids()))
            .collect())
    }
}

/// In-memory [`ConnectedSystemCatalog`].
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    systems: RwLock<HashMap<ConnectedSystemId, ConnectedSystem>>,
}

impl InMemoryCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, system: ConnectedSystem) {
        self.systems.write().await.insert(system.id, system);
    }
}

#[async_trait]
impl ConnectedSystemCatalog for InMemoryCatalog {
    async fn get_connected_system(
        &self,
        id: ConnectedSystemId,
    ) -> SyncResult<Option<ConnectedSystem>> {
        Ok(self.systems.read().await.get(&id).cloned())
    }
}
