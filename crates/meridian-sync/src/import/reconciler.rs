//! Import reconciler.
//!
//! Consumes a connector's object stream for one connected system and run
//! profile, matches each object against persisted CSOs and drives the CSO
//! state machine:
//!
//! - absent -> Normal when nothing matches and the object is not a delete
//! - Normal -> Normal when a match is found; values are recomputed
//! - Normal -> Obsolete on an explicit delete, or during a full import when a
//!   Normal CSO was not seen by the end of the run
//!
//! Writes are batched. Objects are processed one at a time in stream order and
//! each object's changes are staged only once it has been fully processed.

use futures::StreamExt;
use meridian_connector::import::{ConnectedSystemImportObject, ImportChangeType, ImportValue};
use meridian_connector::schema::{
    ConnectedSystemAttribute, ConnectedSystemObjectType, IdentifierType,
};
use meridian_connector::traits::{ImportConnector, ImportRequest, ImportStream};
use meridian_core::{ConnectedSystemId, CsoId, ObjectTypeId, RunProfileId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::convert::{incoming_values, read_identifier, Identifier, IncomingValues};
use super::types::{
    AttributeChange, ImportRunSummary, ObjectChangeType, ObjectImportResult, RunStatus,
    SweepSummary,
};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::model::{ConnectedSystemObject, CsoStatus};
use crate::reference::{ExternalIdLookup, ReferenceMatcher};
use crate::scope::OutOfScopeAction;
use crate::statistics::RunStatistics;
use crate::store::{CsoStore, CsoWrite};
use crate::system::{ConnectedSystem, ConnectedSystemCatalog, RunProfile};
use crate::value::{AttributeValue, CsoReference, ResolvedTarget};

/// Reconciles connector imports into persisted CSOs.
pub struct ImportReconciler {
    catalog: Arc<dyn ConnectedSystemCatalog>,
    store: Arc<dyn CsoStore>,
    lookup: Arc<dyn ExternalIdLookup>,
    config: SyncConfig,
}

impl ImportReconciler {
    /// Create a reconciler.
    pub fn new(
        catalog: Arc<dyn ConnectedSystemCatalog>,
        store: Arc<dyn CsoStore>,
        lookup: Arc<dyn ExternalIdLookup>,
        config: SyncConfig,
    ) -> SyncResult<Self> {
        config.validate()?;
        Ok(Self {
            catalog,
            store,
            lookup,
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Open an import on `connector` as the run profile describes and
    /// reconcile it.
    #[instrument(skip(self, connector, cancel), fields(connector = connector.display_name()))]
    pub async fn run_with_connector(
        &self,
        connected_system_id: ConnectedSystemId,
        run_profile_id: RunProfileId,
        connector: &dyn ImportConnector,
        cancel: &CancellationToken,
    ) -> SyncResult<ImportRunSummary> {
        let (system, profile) = self.load_run(connected_system_id, run_profile_id).await?;
        let mode = profile
            .run_type
            .import_mode()
            .ok_or_else(|| SyncError::internal("run profile was checked to be an import"))?;
        let request = ImportRequest {
            mode,
            partition: profile.partition.clone(),
        };
        let objects = connector.import(&request).await?;
        self.reconcile(&system, &profile, objects, cancel).await
    }

    /// Reconcile an already opened object stream.
    ///
    /// Fails before reading any object when the connected system or run
    /// profile is missing, or the profile is not an import.
    #[instrument(skip(self, objects, cancel))]
    pub async fn run(
        &self,
        connected_system_id: ConnectedSystemId,
        run_profile_id: RunProfileId,
        objects: ImportStream<'_>,
        cancel: &CancellationToken,
    ) -> SyncResult<ImportRunSummary> {
        let (system, profile) = self.load_run(connected_system_id, run_profile_id).await?;
        self.reconcile(&system, &profile, objects, cancel).await
    }

    async fn load_run(
        &self,
        connected_system_id: ConnectedSystemId,
        run_profile_id: RunProfileId,
    ) -> SyncResult<(ConnectedSystem, RunProfile)> {
        let system = self
            .catalog
            .get_connected_system(connected_system_id)
            .await?
            .ok_or(SyncError::ConnectedSystemNotFound {
                id: connected_system_id,
            })?;

        let profile = system
            .run_profile(run_profile_id)
            .cloned()
            .ok_or(SyncError::RunProfileNotFound {
                connected_system_id,
                run_profile_id,
            })?;

        if !profile.run_type.is_import() {
            return Err(SyncError::InvalidRunProfile {
                run_profile_id,
                message: format!("{} is not an import run type", profile.run_type),
            });
        }

        system.validate()?;
        Ok((system, profile))
    }

    async fn reconcile(
        &self,
        system: &ConnectedSystem,
        profile: &RunProfile,
        mut objects: ImportStream<'_>,
        cancel: &CancellationToken,
    ) -> SyncResult<ImportRunSummary> {
        info!(
            connected_system = %system.name,
            run_profile = %profile.name,
            run_type = %profile.run_type,
            partition = ?profile.partition,
            "Starting import run"
        );

        let mut run = ImportRun::new(
            self.store.as_ref(),
            system,
            profile,
            &self.config,
            ReferenceMatcher::new(
                self.lookup.clone(),
                self.config.reference_lookup_batch_size,
            ),
        );

        let mut cancelled = false;
        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                next = objects.next() => next,
            };
            let Some(next) = next else {
                break;
            };

            run.statistics.processed += 1;
            match next {
                Ok(object) => {
                    if let Err(e) = run.process_object(object).await {
                        error!(error = %e, "Import run failed, aborting");
                        run.flush().await?;
                        return Err(e);
                    }
                }
                Err(e) if e.is_object_level() => {
                    warn!(error = %e, "Connector could not read an object, skipping it");
                    run.unidentified_failures += 1;
                    run.statistics.record_failure();
                    run.results
                        .push(ObjectImportResult::failed(String::new(), e.to_string()));
                }
                Err(e) => {
                    error!(error = %e, "Connector stream failed, aborting run");
                    run.flush().await?;
                    return Err(e.into());
                }
            }

            if run.pending.len() >= self.config.batch_size {
                run.flush().await?;
            }
        }

        run.flush().await?;

        if cancelled {
            warn!(
                processed = run.statistics.processed,
                "Import run cancelled, skipping obsolescence sweep and reference resolution"
            );
            return Ok(run.finish(RunStatus::Cancelled, SweepSummary::skipped("run cancelled")));
        }

        let sweep = run.sweep().await?;
        run.resolve_references().await?;

        let status = if run.statistics.failed > 0 {
            RunStatus::CompletedWithErrors
        } else {
            RunStatus::Completed
        };
        Ok(run.finish(status, sweep))
    }
}

/// A staged write.
struct PendingWrite {
    cso: ConnectedSystemObject,
    is_new: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct IdentityKey {
    object_type_id: ObjectTypeId,
    kind: IdentifierType,
    value: AttributeValue,
}

/// Failure of one object.
struct ObjectFailure {
    error: SyncError,
    object_type: String,
    external_id: Option<String>,
    cso_id: Option<CsoId>,
}

impl ObjectFailure {
    fn new(error: SyncError, object_type: &str) -> Self {
        Self {
            error,
            object_type: object_type.to_string(),
            external_id: None,
            cso_id: None,
        }
    }

    fn identified(mut self, identifier: &Identifier, cso_id: Option<CsoId>) -> Self {
        self.external_id = Some(identifier.value.to_string());
        self.cso_id = cso_id;
        self
    }
}

/// State of one run.
struct ImportRun<'a> {
    store: &'a dyn CsoStore,
    system: &'a ConnectedSystem,
    profile: &'a RunProfile,
    config: &'a SyncConfig,
    matcher: ReferenceMatcher,
    pending: HashMap<CsoId, PendingWrite>,
    pending_order: Vec<CsoId>,
    pending_index: HashMap<IdentityKey, CsoId>,
    /// CSOs matched, created or deleted by this run; the sweep spares them.
    seen: HashSet<CsoId>,
    results: Vec<ObjectImportResult>,
    statistics: RunStatistics,
    /// Failures that happened before the external id was known.
    unidentified_failures: u32,
}

impl<'a> ImportRun<'a> {
    fn new(
        store: &'a dyn CsoStore,
        system: &'a ConnectedSystem,
        profile: &'a RunProfile,
        config: &'a SyncConfig,
        matcher: ReferenceMatcher,
    ) -> Self {
        Self {
            store,
            system,
            profile,
            config,
            matcher,
            pending: HashMap::new(),
            pending_order: Vec::new(),
            pending_index: HashMap::new(),
            seen: HashSet::new(),
            results: Vec::new(),
            statistics: RunStatistics::new(),
            unidentified_failures: 0,
        }
    }

    async fn process_object(&mut self, object: ConnectedSystemImportObject) -> SyncResult<()> {
        match self.reconcile_object(&object).await {
            Ok(result) => {
                self.results.push(result);
                Ok(())
            }
            Err(failure) if failure.error.is_object_level() => {
                warn!(
                    object_type = %failure.object_type,
                    external_id = ?failure.external_id,
                    error = %failure.error,
                    "Failed to import object"
                );
                if failure.external_id.is_none() {
                    self.unidentified_failures += 1;
                }
                self.statistics.record_failure();
                let mut result =
                    ObjectImportResult::failed(failure.object_type, failure.error.to_string())
                        .with_external_id(failure.external_id);
                result.cso_id = failure.cso_id;
                self.results.push(result);
                Ok(())
            }
            Err(failure) => Err(failure.error),
        }
    }

    async fn reconcile_object(
        &mut self,
        object: &ConnectedSystemImportObject,
    ) -> Result<ObjectImportResult, ObjectFailure> {
        let system = self.system;
        let object_type = system.object_type_by_name(&object.object_type).ok_or_else(|| {
            ObjectFailure::new(
                SyncError::ObjectTypeNotFound {
                    object_type: object.object_type.clone(),
                },
                &object.object_type,
            )
        })?;

        let identifier = read_identifier(object_type, object)
            .map_err(|e| ObjectFailure::new(e, &object_type.name))?;

        let Some(identifier) = identifier else {
            if object.change_type.is_delete() {
                debug!(
                    object_type = %object_type.name,
                    "Delete without external identifier, nothing to match"
                );
                self.statistics.deletes_ignored += 1;
                return Ok(ObjectImportResult::new(
                    &object_type.name,
                    ObjectChangeType::NoChange,
                ));
            }
            return Err(ObjectFailure::new(
                SyncError::MissingExternalId {
                    object_type: object_type.name.clone(),
                },
                &object_type.name,
            ));
        };

        let matched = self
            .find_match(object_type, &identifier)
            .await
            .map_err(|e| ObjectFailure::new(e, &object_type.name).identified(&identifier, None))?;
        if let Some(cso) = &matched {
            self.seen.insert(cso.id);
        }

        let result = match (object.change_type, matched) {
            (ImportChangeType::Deleted, None) => {
                debug!(
                    object_type = %object_type.name,
                    external_id = %identifier.value,
                    "Delete for unknown object ignored"
                );
                self.statistics.deletes_ignored += 1;
                return Ok(ObjectImportResult::new(
                    &object_type.name,
                    ObjectChangeType::NoChange,
                )
                .with_external_id(Some(identifier.value.to_string())));
            }
            (ImportChangeType::Deleted, Some(mut cso)) => {
                cso.transition_to(CsoStatus::Obsolete).map_err(|e| {
                    ObjectFailure::new(e, &object_type.name).identified(&identifier, Some(cso.id))
                })?;
                info!(
                    cso_id = %cso.id,
                    external_id = %identifier.value,
                    "CSO deleted by connector, marked obsolete"
                );
                let result = ObjectImportResult::new(&object_type.name, ObjectChangeType::Deleted)
                    .with_cso(cso.id);
                self.stage(cso, false);
                result
            }
            (change_type, None) => {
                if change_type == ImportChangeType::Updated {
                    warn!(
                        object_type = %object_type.name,
                        external_id = %identifier.value,
                        "Connector declared an update for an unknown object, creating it"
                    );
                }
                self.create(object_type, object, &identifier).await?
            }
            (change_type, Some(cso)) => {
                if change_type == ImportChangeType::Created {
                    debug!(
                        cso_id = %cso.id,
                        external_id = %identifier.value,
                        "Connector declared a create for an existing object, treating as update"
                    );
                }
                self.update(object_type, object, &identifier, cso).await?
            }
        };

        self.statistics.record(result.change_type);
        Ok(result.with_external_id(Some(identifier.value.to_string())))
    }

    async fn create(
        &mut self,
        object_type: &ConnectedSystemObjectType,
        object: &ConnectedSystemImportObject,
        identifier: &Identifier,
    ) -> Result<ObjectImportResult, ObjectFailure> {
        let mut cso = ConnectedSystemObject::new(self.system.id, object_type).ok_or_else(|| {
            ObjectFailure::new(
                SyncError::configuration(format!(
                    "object type '{}' has no primary external identifier",
                    object_type.name
                )),
                &object_type.name,
            )
        })?;
        cso.partition = self.profile.partition.clone();

        let attribute_changes = self
            .apply_attributes(&mut cso, object_type, object)
            .await
            .map_err(|e| ObjectFailure::new(e, &object_type.name).identified(identifier, None))?;

        info!(
            cso_id = %cso.id,
            object_type = %object_type.name,
            external_id = %identifier.value,
            "Created CSO"
        );
        self.seen.insert(cso.id);
        let mut result =
            ObjectImportResult::new(&object_type.name, ObjectChangeType::Created).with_cso(cso.id);
        result.attribute_changes = attribute_changes;
        self.stage(cso, true);
        Ok(result)
    }

    async fn update(
        &mut self,
        object_type: &ConnectedSystemObjectType,
        object: &ConnectedSystemImportObject,
        identifier: &Identifier,
        existing: ConnectedSystemObject,
    ) -> Result<ObjectImportResult, ObjectFailure> {
        let cso_id = existing.id;
        let system = self.system;
        let scope = system.import_scope(object_type.id);
        let was_in_scope = scope.map_or(true, |s| s.is_in_scope(&existing));

        let mut cso = existing;
        let attribute_changes = self
            .apply_attributes(&mut cso, object_type, object)
            .await
            .map_err(|e| {
                ObjectFailure::new(e, &object_type.name).identified(identifier, Some(cso_id))
            })?;

        let mut change_type = if attribute_changes.is_empty() {
            ObjectChangeType::NoChange
        } else {
            ObjectChangeType::Updated
        };

        if let Some(scope) = scope {
            if cso.is_joined() && !scope.is_in_scope(&cso) {
                match scope.out_of_scope_action {
                    OutOfScopeAction::Disconnect => {
                        let mvo_id = cso.unjoin();
                        info!(
                            cso_id = %cso.id,
                            mvo_id = ?mvo_id,
                            "CSO out of scope, disconnected from metaverse object"
                        );
                        change_type = ObjectChangeType::DisconnectedOutOfScope;
                    }
                    OutOfScopeAction::RetainJoin if was_in_scope => {
                        info!(
                            cso_id = %cso.id,
                            mvo_id = ?cso.metaverse_object_id,
                            "CSO out of scope, join retained"
                        );
                        change_type = ObjectChangeType::OutOfScopeRetainJoin;
                    }
                    OutOfScopeAction::RetainJoin => {}
                }
            }
        }

        let partition_moved =
            self.profile.partition.is_some() && cso.partition != self.profile.partition;
        if partition_moved {
            cso.partition = self.profile.partition.clone();
        }

        if change_type != ObjectChangeType::NoChange || partition_moved {
            debug!(
                cso_id = %cso.id,
                change_type = %change_type,
                changed_attributes = attribute_changes.len(),
                "Updated CSO"
            );
            cso.touch();
            self.stage(cso, false);
        }

        let mut result = ObjectImportResult::new(&object_type.name, change_type).with_cso(cso_id);
        result.attribute_changes = attribute_changes;
        Ok(result)
    }

    /// Recompute the values of every schema attribute from the import object.
    async fn apply_attributes(
        &mut self,
        cso: &mut ConnectedSystemObject,
        object_type: &ConnectedSystemObjectType,
        object: &ConnectedSystemImportObject,
    ) -> SyncResult<Vec<AttributeChange>> {
        for attribute in &object.attributes {
            if object_type.get_attribute(&attribute.name).is_none() {
                warn!(
                    attribute = %attribute.name,
                    object_type = %object_type.name,
                    "Ignoring attribute not declared by the object type"
                );
            }
        }

        let mut changes = Vec::new();
        let mut replacements = Vec::new();
        for attribute in &object_type.attributes {
            let raw: &[ImportValue] = match object.get_values(&attribute.name) {
                Some(raw) => raw,
                // An identifier is never cleared by omission.
                None if attribute.is_primary_external_id()
                    || attribute.is_secondary_external_id() =>
                {
                    continue
                }
                None => &[],
            };
            let existing: Vec<AttributeValue> = cso.values(attribute.id).cloned().collect();
            let (values, change) = match incoming_values(attribute, raw)? {
                IncomingValues::Scalars(incoming) => diff_scalars(attribute, existing, incoming),
                IncomingValues::References(tokens) => {
                    self.diff_references(attribute, existing, tokens).await
                }
            };
            if !change.is_empty() {
                changes.push(change);
                replacements.push((attribute.id, values));
            }
        }

        for (attribute_id, values) in replacements {
            cso.set_values(attribute_id, values);
        }
        Ok(changes)
    }

    /// Keep every persisted reference that an incoming token still names;
    /// tokens nobody claimed become new unresolved references.
    async fn diff_references(
        &mut self,
        attribute: &ConnectedSystemAttribute,
        existing: Vec<AttributeValue>,
        tokens: Vec<String>,
    ) -> (Vec<AttributeValue>, AttributeChange) {
        self.matcher
            .prefetch(existing.iter().filter_map(AttributeValue::as_reference))
            .await;

        let mut claimed = vec![false; tokens.len()];
        let mut retained = Vec::with_capacity(existing.len());
        let mut removed = Vec::new();

        for value in existing {
            let mut hit = None;
            if let Some(reference) = value.as_reference() {
                for (index, token) in tokens.iter().enumerate() {
                    if !claimed[index] && self.matcher.is_same_reference(reference, token).await {
                        hit = Some(index);
                        break;
                    }
                }
            }
            match hit {
                Some(index) => {
                    claimed[index] = true;
                    retained.push(value);
                }
                None => removed.push(value),
            }
        }

        let added: Vec<AttributeValue> = tokens
            .into_iter()
            .zip(claimed)
            .filter(|(_, claimed)| !claimed)
            .map(|(token, _)| AttributeValue::Reference(CsoReference::unresolved(token)))
            .collect();

        retained.extend(added.iter().cloned());
        let change = AttributeChange {
            attribute_id: attribute.id,
            attribute_name: attribute.name.clone(),
            added,
            removed,
        };
        (retained, change)
    }

    async fn find_match(
        &self,
        object_type: &ConnectedSystemObjectType,
        identifier: &Identifier,
    ) -> SyncResult<Option<ConnectedSystemObject>> {
        let key = IdentityKey {
            object_type_id: object_type.id,
            kind: identifier.kind,
            value: identifier.value.clone(),
        };
        if let Some(pending) = self
            .pending_index
            .get(&key)
            .and_then(|id| self.pending.get(id))
        {
            if pending.cso.is_normal()
                && identity_of(&pending.cso, identifier.kind) == Some(&identifier.value)
            {
                return Ok(Some(pending.cso.clone()));
            }
        }

        let found = match identifier.kind {
            IdentifierType::Primary => {
                self.store
                    .find_by_external_id(self.system.id, object_type.id, &identifier.value)
                    .await?
            }
            IdentifierType::Secondary => {
                self.store
                    .find_by_secondary_external_id(
                        self.system.id,
                        object_type.id,
                        &identifier.value,
                    )
                    .await?
            }
        };

        // Unflushed state is newer than the store's.
        Ok(found.and_then(|cso| match self.pending.get(&cso.id) {
            Some(pending) if pending.cso.is_normal() => Some(pending.cso.clone()),
            Some(_) => None,
            None => Some(cso),
        }))
    }

    fn stage(&mut self, cso: ConnectedSystemObject, is_new: bool) {
        if cso.is_normal() {
            for kind in [IdentifierType::Primary, IdentifierType::Secondary] {
                if let Some(value) = identity_of(&cso, kind) {
                    self.pending_index.insert(
                        IdentityKey {
                            object_type_id: cso.object_type_id,
                            kind,
                            value: value.clone(),
                        },
                        cso.id,
                    );
                }
            }
        }

        match self.pending.get_mut(&cso.id) {
            Some(existing) => existing.cso = cso,
            None => {
                self.pending_order.push(cso.id);
                self.pending.insert(cso.id, PendingWrite { cso, is_new });
            }
        }
    }

    async fn flush(&mut self) -> SyncResult<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let writes: Vec<CsoWrite> = self
            .pending_order
            .drain(..)
            .filter_map(|id| self.pending.remove(&id))
            .map(|p| {
                if p.is_new {
                    CsoWrite::Create(p.cso)
                } else {
                    CsoWrite::Update(p.cso)
                }
            })
            .collect();
        debug!(count = writes.len(), "Flushing CSO writes");
        self.store.save_batch(writes).await?;
        self.pending_index.clear();
        Ok(())
    }

    /// Obsolete every Normal CSO of the run's scope that the full import did
    /// not contain.
    async fn sweep(&mut self) -> SyncResult<SweepSummary> {
        if !self.profile.run_type.is_full_import() {
            return Ok(SweepSummary::skipped("delta import"));
        }
        if self.unidentified_failures > 0 && self.config.skip_sweep_on_unidentified_failures {
            warn!(
                unidentified_failures = self.unidentified_failures,
                "Objects failed before their external id was read, skipping obsolescence sweep"
            );
            return Ok(SweepSummary::skipped(format!(
                "{} objects failed before their external id was read",
                self.unidentified_failures
            )));
        }

        let candidates = self
            .store
            .list_normal(self.system.id, self.profile.partition.as_deref())
            .await?;

        let mut obsoleted = 0;
        for mut cso in candidates {
            if self.seen.contains(&cso.id) {
                continue;
            }
            cso.transition_to(CsoStatus::Obsolete)?;
            info!(
                cso_id = %cso.id,
                external_id = ?cso.external_id().map(ToString::to_string),
                "CSO missing from full import, marked obsolete"
            );

            let object_type = self
                .system
                .object_type(cso.object_type_id)
                .map(|t| t.name.clone())
                .unwrap_or_default();
            let result = ObjectImportResult::new(object_type, ObjectChangeType::Deleted)
                .with_cso(cso.id)
                .with_external_id(cso.external_id().map(ToString::to_string));
            self.statistics.record(result.change_type);
            self.results.push(result);
            obsoleted += 1;

            self.stage(cso, false);
            if self.pending.len() >= self.config.batch_size {
                self.flush().await?;
            }
        }
        self.flush().await?;

        Ok(SweepSummary {
            performed: true,
            skipped_reason: None,
            obsoleted,
        })
    }

    /// Point every reference value of the system that has no live target at
    /// the Normal CSO its token names.
    ///
    /// Covers tokens left unresolved by earlier runs and values whose target
    /// has since become obsolete. A value whose dead target cannot be
    /// replaced loses its target id and keeps only its token.
    async fn resolve_references(&mut self) -> SyncResult<()> {
        let mut candidates = self
            .store
            .list_with_unresolved_references(self.system.id)
            .await?;
        candidates.sort_by_key(|c| c.id);

        let mut resolved_tokens: HashMap<String, Option<ResolvedTarget>> = HashMap::new();
        for chunk in candidates.chunks(self.config.batch_size) {
            let target_ids: Vec<CsoId> = chunk
                .iter()
                .flat_map(|c| c.attribute_values.iter())
                .filter_map(|v| v.value.as_reference())
                .filter_map(|r| r.target_id)
                .collect::<HashSet<_>>()
                .into_iter()
                .collect();
            let live: HashSet<CsoId> = self
                .store
                .get_many(&target_ids)
                .await?
                .into_iter()
                .filter(ConnectedSystemObject::is_normal)
                .map(|c| c.id)
                .collect();

            for cso in chunk {
                let mut cso = cso.clone();
                let mut changed = false;
                for index in 0..cso.attribute_values.len() {
                    let Some(reference) = cso.attribute_values[index].value.as_reference() else {
                        continue;
                    };
                    let stale = match reference.target_id {
                        Some(target_id) if live.contains(&target_id) => continue,
                        Some(_) => true,
                        None => false,
                    };
                    let token = reference.unresolved_token.clone();

                    let target = match &token {
                        Some(token) => {
                            if !resolved_tokens.contains_key(token) {
                                let target = self.resolve_token(token).await?;
                                resolved_tokens.insert(token.clone(), target);
                            }
                            resolved_tokens.get(token).cloned().flatten()
                        }
                        None => None,
                    };

                    let Some(reference) = cso.attribute_values[index].value.as_reference_mut()
                    else {
                        continue;
                    };
                    match target {
                        Some(target) => {
                            reference.target_id = Some(target.id);
                            reference.target = Some(Box::new(target));
                            self.statistics.references_resolved += 1;
                            changed = true;
                        }
                        None => {
                            if stale {
                                info!(
                                    cso_id = %cso.id,
                                    target_id = ?reference.target_id,
                                    token = ?token,
                                    "Reference target is no longer present, unlinking"
                                );
                                reference.target_id = None;
                                reference.clear_navigation();
                                changed = true;
                            } else {
                                debug!(
                                    cso_id = %cso.id,
                                    token = ?token,
                                    "Reference still unresolved"
                                );
                            }
                            self.statistics.references_unresolved += 1;
                        }
                    }
                }
                if changed {
                    cso.touch();
                    self.stage(cso, false);
                }
            }
            self.flush().await?;
        }

        if self.statistics.references_unresolved > 0 {
            warn!(
                unresolved = self.statistics.references_unresolved,
                resolved = self.statistics.references_resolved,
                "Some references could not be resolved"
            );
        }
        Ok(())
    }

    /// Find the single Normal CSO of this system named by a token, by primary
    /// external id first and secondary second.
    async fn resolve_token(&self, token: &str) -> SyncResult<Option<ResolvedTarget>> {
        for kind in [IdentifierType::Primary, IdentifierType::Secondary] {
            let mut hits = Vec::new();
            for object_type in &self.system.object_types {
                let attribute = match kind {
                    IdentifierType::Primary => object_type.primary_external_id(),
                    IdentifierType::Secondary => object_type.secondary_external_id(),
                };
                let Some(value) =
                    attribute.and_then(|a| AttributeValue::parse_token(a.data_type, token))
                else {
                    continue;
                };
                let found = match kind {
                    IdentifierType::Primary => {
                        self.store
                            .find_by_external_id(self.system.id, object_type.id, &value)
                            .await?
                    }
                    IdentifierType::Secondary => {
                        self.store
                            .find_by_secondary_external_id(self.system.id, object_type.id, &value)
                            .await?
                    }
                };
                hits.extend(found);
            }

            match hits.len() {
                0 => continue,
                1 => {
                    let target = &hits[0];
                    return Ok(Some(ResolvedTarget {
                        id: target.id,
                        external_ids: target.external_ids(),
                        metaverse_object_id: target.metaverse_object_id,
                    }));
                }
                n => {
                    warn!(
                        token = %token,
                        matches = n,
                        "Reference token is ambiguous, leaving it unresolved"
                    );
                    return Ok(None);
                }
            }
        }
        Ok(None)
    }

    fn finish(self, status: RunStatus, sweep: SweepSummary) -> ImportRunSummary {
        info!(
            status = %status,
            processed = self.statistics.processed,
            created = self.statistics.created,
            updated = self.statistics.updated,
            obsoleted = self.statistics.obsoleted,
            failed = self.statistics.failed,
            "Import run finished"
        );
        ImportRunSummary {
            run_profile_id: self.profile.id,
            run_type: self.profile.run_type,
            status,
            results: self.results,
            statistics: self.statistics,
            sweep,
        }
    }
}

fn identity_of(cso: &ConnectedSystemObject, kind: IdentifierType) -> Option<&AttributeValue> {
    match kind {
        IdentifierType::Primary => cso.external_id(),
        IdentifierType::Secondary => cso.secondary_external_id(),
    }
}

/// Scalars are replaced wholesale; the change lists what entered and left.
fn diff_scalars(
    attribute: &ConnectedSystemAttribute,
    existing: Vec<AttributeValue>,
    incoming: Vec<AttributeValue>,
) -> (Vec<AttributeValue>, AttributeChange) {
    let added = incoming
        .iter()
        .filter(|v| !existing.contains(v))
        .cloned()
        .collect();
    let removed = existing
        .into_iter()
        .filter(|v| !incoming.contains(v))
        .collect();
    let change = AttributeChange {
        attribute_id: attribute.id,
        attribute_name: attribute.name.clone(),
        added,
        removed,
    };
    (incoming, change)
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_connector::schema::AttributeDataType;

    #[test]
    fn test_diff_scalars() {
        let attribute =
            ConnectedSystemAttribute::new("mail", AttributeDataType::Text).multi_valued();
        let existing = vec!["a@x".into(), "b@x".into()];
        let incoming = vec!["b@x".into(), "c@x".into()];

        let (values, change) = diff_scalars(&attribute, existing, incoming.clone());
        assert_eq!(values, incoming);
        assert_eq!(change.added, vec![AttributeValue::from("c@x")]);
        assert_eq!(change.removed, vec![AttributeValue::from("a@x")]);
    }

    #[test]
    fn test_diff_scalars_ignores_order() {
        let attribute =
            ConnectedSystemAttribute::new("mail", AttributeDataType::Text).multi_valued();
        let existing = vec!["a@x".into(), "b@x".into()];
        let incoming = vec!["b@x".into(), "a@x".into()];

        let (_, change) = diff_scalars(&attribute, existing, incoming);
        assert!(change.is_empty());
    }
}
