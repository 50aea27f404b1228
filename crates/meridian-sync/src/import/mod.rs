//! Connector import into connected system objects.

mod convert;
mod reconciler;
mod types;

pub use reconciler::ImportReconciler;
pub use types::{
    AttributeChange, ImportRunSummary, ObjectChangeType, ObjectImportResult, RunStatus,
    SweepSummary,
};
