//! Connected systems and run profiles.

use async_trait::async_trait;
use meridian_connector::schema::ConnectedSystemObjectType;
use meridian_connector::traits::ImportMode;
use meridian_core::{ConnectedSystemId, ObjectTypeId, RunProfileId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{SyncError, SyncResult};
use crate::scope::ImportScope;

/// Kind of work a run profile performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunType {
    FullImport,
    DeltaImport,
    FullSynchronisation,
    DeltaSynchronisation,
}

impl RunType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RunType::FullImport => "full_import",
            RunType::DeltaImport => "delta_import",
            RunType::FullSynchronisation => "full_synchronisation",
            RunType::DeltaSynchronisation => "delta_synchronisation",
        }
    }

    /// Connector import mode, for import run types.
    #[must_use]
    pub fn import_mode(&self) -> Option<ImportMode> {
        match self {
            RunType::FullImport => Some(ImportMode::Full),
            RunType::DeltaImport => Some(ImportMode::Delta),
            RunType::FullSynchronisation | RunType::DeltaSynchronisation => None,
        }
    }

    #[must_use]
    pub fn is_import(&self) -> bool {
        self.import_mode().is_some()
    }

    /// Whether absence from the run implies deletion.
    #[must_use]
    pub fn is_full_import(&self) -> bool {
        matches!(self, RunType::FullImport)
    }
}

impl fmt::Display for RunType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RunType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "full_import" => Ok(RunType::FullImport),
            "delta_import" => Ok(RunType::DeltaImport),
            "full_synchronisation" | "full_synchronization" => Ok(RunType::FullSynchronisation),
            "delta_synchronisation" | "delta_synchronization" => {
                Ok(RunType::DeltaSynchronisation)
            }
            _ => Err(format!("Unknown run type: {s}")),
        }
    }
}

/// A named, schedulable unit of work against one connected system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunProfile {
    pub id: RunProfileId,
    pub name: String,
    pub run_type: RunType,
    /// Partition to import; `None` covers the whole system.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<String>,
}

impl RunProfile {
    pub fn new(name: impl Into<String>, run_type: RunType) -> Self {
        Self {
            id: RunProfileId::new(),
            name: name.into(),
            run_type,
            partition: None,
        }
    }

    #[must_use]
    pub fn with_partition(mut self, partition: impl Into<String>) -> Self {
        self.partition = Some(partition.into());
        self
    }
}

/// An external system the core imports from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectedSystem {
    pub id: ConnectedSystemId,
    pub name: String,
    #[serde(default)]
    pub object_types: Vec<ConnectedSystemObjectType>,
    #[serde(default)]
    pub run_profiles: Vec<RunProfile>,
    #[serde(default)]
    pub import_scopes: Vec<ImportScope>,
}

impl ConnectedSystem {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ConnectedSystemId::new(),
            name: name.into(),
            object_types: Vec::new(),
            run_profiles: Vec::new(),
            import_scopes: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_object_type(mut self, object_type: ConnectedSystemObjectType) -> Self {
        self.object_types.push(object_type);
        self
    }

    #[must_use]
    pub fn with_run_profile(mut self, run_profile: RunProfile) -> Self {
        self.run_profiles.push(run_profile);
        self
    }

    #[must_use]
    pub fn with_import_scope(mut self, scope: ImportScope) -> Self {
        self.import_scopes.push(scope);
        self
    }

    #[must_use]
    pub fn object_type_by_name(&self, name: &str) -> Option<&ConnectedSystemObjectType> {
        self.object_types.iter().find(|t| t.name == name)
    }

    #[must_use]
    pub fn object_type(&self, id: ObjectTypeId) -> Option<&ConnectedSystemObjectType> {
        self.object_types.iter().find(|t| t.id == id)
    }

    #[must_use]
    pub fn run_profile(&self, id: RunProfileId) -> Option<&RunProfile> {
        self.run_profiles.iter().find(|p| p.id == id)
    }

    #[must_use]
    pub fn import_scope(&self, object_type_id: ObjectTypeId) -> Option<&ImportScope> {
        self.import_scopes
            .iter()
            .find(|s| s.object_type_id == object_type_id)
    }

    /// Validate every object type schema.
    pub fn validate(&self) -> SyncResult<()> {
        for object_type in &self.object_types {
            object_type
                .validate()
                .map_err(|e| SyncError::configuration(e.to_string()))?;
        }
        Ok(())
    }
}

/// Source of connected system definitions.
#[async_trait]
pub trait ConnectedSystemCatalog: Send + Sync {
    /// Get a connected system with its schema and run profiles.
    async fn get_connected_system(
        &self,
        id: ConnectedSystemId,
    ) -> SyncResult<Option<ConnectedSystem>>;
}
