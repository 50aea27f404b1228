//! Run statistics tracking.

use serde::{Deserialize, Serialize};

use crate::import::ObjectChangeType;

/// Counters for one import run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatistics {
    /// Objects read from the connector, failures included.
    #[serde(default)]
    pub processed: u32,
    #[serde(default)]
    pub created: u32,
    #[serde(default)]
    pub updated: u32,
    #[serde(default)]
    pub unchanged: u32,
    /// Explicit deletes plus full-import sweep.
    #[serde(default)]
    pub obsoleted: u32,
    /// Joined CSOs that crossed the scope boundary.
    #[serde(default)]
    pub out_of_scope: u32,
    /// Deletes for objects that were never seen.
    #[serde(default)]
    pub deletes_ignored: u32,
    #[serde(default)]
    pub failed: u32,
    #[serde(default)]
    pub references_resolved: u32,
    #[serde(default)]
    pub references_unresolved: u32,
}

impl RunStatistics {
    /// Create new empty statistics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one object outcome.
    pub fn record(&mut self, change_type: ObjectChangeType) {
        match change_type {
            ObjectChangeType::NoChange => self.unchanged += 1,
            ObjectChangeType::Created => self.created += 1,
            ObjectChangeType::Updated => self.updated += 1,
            ObjectChangeType::Deleted => self.obsoleted += 1,
            ObjectChangeType::DisconnectedOutOfScope | ObjectChangeType::OutOfScopeRetainJoin => {
                self.out_of_scope += 1
            }
            // Produced by synchronisation, not import.
            ObjectChangeType::Disconnected => {}
        }
    }

    pub fn record_failure(&mut self) {
        self.failed += 1;
    }

    /// Objects whose state changed.
    #[must_use]
    pub fn changed(&self) -> u32 {
        self.created + self.updated + self.obsoleted + self.out_of_scope
    }

    /// Calculate failure rate as a percentage of processed objects.
    #[must_use]
    pub fn failure_rate(&self) -> f64 {
        if self.processed == 0 {
            0.0
        } else {
            (f64::from(self.failed) / f64::from(self.processed)) * 100.0
        }
    }
}
