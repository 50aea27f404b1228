//! Import results reported to the audit collaborator.

use meridian_core::{AttributeId, CsoId, RunProfileId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SyncResult;
use crate::statistics::RunStatistics;
use crate::system::RunType;
use crate::value::AttributeValue;

/// Outcome for one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectChangeType {
    NoChange,
    Created,
    Updated,
    /// Moved to Obsolete.
    Deleted,
    /// Join removed because the CSO went obsolete.
    Disconnected,
    /// Join removed because the CSO left its import scope.
    DisconnectedOutOfScope,
    /// CSO left its import scope; join kept.
    OutOfScopeRetainJoin,
}

impl ObjectChangeType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectChangeType::NoChange => "no_change",
            ObjectChangeType::Created => "created",
            ObjectChangeType::Updated => "updated",
            ObjectChangeType::Deleted => "deleted",
            ObjectChangeType::Disconnected => "disconnected",
            ObjectChangeType::DisconnectedOutOfScope => "disconnected_out_of_scope",
            ObjectChangeType::OutOfScopeRetainJoin => "out_of_scope_retain_join",
        }
    }

    /// Whether an audit record must be written even without value changes.
    #[must_use]
    pub fn reports_change(&self) -> bool {
        !matches!(self, ObjectChangeType::NoChange)
    }
}

impl fmt::Display for ObjectChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ObjectChangeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "no_change" => Ok(ObjectChangeType::NoChange),
            "created" => Ok(ObjectChangeType::Created),
            "updated" => Ok(ObjectChangeType::Updated),
            "deleted" => Ok(ObjectChangeType::Deleted),
            "disconnected" => Ok(ObjectChangeType::Disconnected),
            "disconnected_out_of_scope" => Ok(ObjectChangeType::DisconnectedOutOfScope),
            "out_of_scope_retain_join" => Ok(ObjectChangeType::OutOfScopeRetainJoin),
            _ => Err(format!("Unknown object change type: {s}")),
        }
    }
}

/// Values added to and removed from one attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeChange {
    pub attribute_id: AttributeId,
    pub attribute_name: String,
    #[serde(default)]
    pub added: Vec<AttributeValue>,
    #[serde(default)]
    pub removed: Vec<AttributeValue>,
}

impl AttributeChange {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Per-object result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectImportResult {
    /// External id as supplied, when it could be read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    pub object_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cso_id: Option<CsoId>,
    pub change_type: ObjectChangeType,
    pub has_changes: bool,
    #[serde(default)]
    pub attribute_changes: Vec<AttributeChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ObjectImportResult {
    pub fn new(object_type: impl Into<String>, change_type: ObjectChangeType) -> Self {
        Self {
            external_id: None,
            object_type: object_type.into(),
            cso_id: None,
            change_type,
            has_changes: change_type.reports_change(),
            attribute_changes: Vec::new(),
            error: None,
        }
    }

    /// A failed object.
    pub fn failed(object_type: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(object_type, ObjectChangeType::NoChange)
        }
    }

    #[must_use]
    pub fn with_external_id(mut self, external_id: Option<String>) -> Self {
        self.external_id = external_id;
        self
    }

    #[must_use]
    pub fn with_cso(mut self, cso_id: CsoId) -> Self {
        self.cso_id = Some(cso_id);
        self
    }

    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

/// Final state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    CompletedWithErrors,
    Cancelled,
}

impl RunStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Completed => "completed",
            RunStatus::CompletedWithErrors => "completed_with_errors",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What the full-import obsolescence sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepSummary {
    pub performed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped_reason: Option<String>,
    #[serde(default)]
    pub obsoleted: u32,
}

impl SweepSummary {
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            performed: false,
            skipped_reason: Some(reason.into()),
            obsoleted: 0,
        }
    }
}

/// Summary of one import run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRunSummary {
    pub run_profile_id: RunProfileId,
    pub run_type: RunType,
    pub status: RunStatus,
    /// Per-object results in processing order, sweep results last.
    pub results: Vec<ObjectImportResult>,
    pub statistics: RunStatistics,
    pub sweep: SweepSummary,
}

impl ImportRunSummary {
    /// Results that must produce an audit record.
    pub fn changes(&self) -> impl Iterator<Item = &ObjectImportResult> {
        self.results.iter().filter(|r| r.has_changes)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ObjectImportResult> {
        self.results.iter().filter(|r| r.is_failure())
    }

    /// Result for one CSO, if it was touched.
    #[must_use]
    pub fn result_for(&self, cso_id: CsoId) -> Option<&ObjectImportResult> {
        self.results.iter().find(|r| r.cso_id == Some(cso_id))
    }

    /// Serialize for the audit collaborator.
    pub fn to_json(&self) -> SyncResult<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}
