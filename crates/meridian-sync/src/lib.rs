//! # Meridian Sync
//!
//! Import reconciliation and attribute flow for Meridian.
//!
//! This crate provides:
//! - Import reconciliation of connector objects into connected system objects
//! - Deduplication of multi-valued attributes
//! - Reference matching that tolerates missing navigation
//! - Import scoping with disconnect or retain-join handling
//! - Sync rule mapping into metaverse objects
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────────┐     ┌──────────────┐
//! │  Connector  │────►│ Import Reconciler│────►│   CSO Store  │
//! │  (stream)   │     │                  │     │              │
//! └─────────────┘     └────────┬─────────┘     └──────┬───────┘
//!                              │                      │
//!                   ┌──────────┴─────────┐            ▼
//!                   │ Dedup + Reference  │     ┌──────────────┐     ┌──────────────┐
//!                   │      Matcher       │     │Sync Processor│────►│  MVO pending │
//!                   └────────────────────┘     │  + Mappings  │     │   additions  │
//!                                              └──────────────┘     └──────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use meridian_sync::{ImportReconciler, InMemoryCatalog, InMemoryCsoStore, SyncConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let store = Arc::new(InMemoryCsoStore::new());
//! let reconciler = ImportReconciler::new(catalog, store.clone(), store, SyncConfig::from_env()?)?;
//!
//! let summary = reconciler
//!     .run_with_connector(system_id, run_profile_id, &connector, &CancellationToken::new())
//!     .await?;
//! for result in summary.changes() {
//!     audit.record(result);
//! }
//! ```

pub mod config;
pub mod dedup;
pub mod error;
pub mod import;
pub mod mapping;
pub mod model;
pub mod processor;
pub mod reference;
pub mod scope;
pub mod statistics;
pub mod store;
pub mod system;
pub mod value;

// Re-exports for convenience
pub use config::{ConfigError, SyncConfig};
pub use dedup::deduplicate;
pub use error::{SyncError, SyncResult};
pub use import::{
    AttributeChange, ImportReconciler, ImportRunSummary, ObjectChangeType, ObjectImportResult,
    RunStatus, SweepSummary,
};
pub use mapping::{
    MappingOutcome, MappingProcessor, SyncRule, SyncRuleMapping, SyncRuleMappingSource,
};
pub use model::{
    ConnectedSystemObject, CsoAttributeValue, CsoStatus, MetaverseAttributeValue, MetaverseObject,
};
pub use processor::{SyncObjectResult, SyncProcessor};
pub use reference::{
    ExternalIdLookup, MatchTier, NoExternalIdLookup, ReferenceMatch, ReferenceMatcher,
};
pub use scope::{
    ImportScope, OutOfScopeAction, ScopingComparison, ScopingCriteriaGroup, ScopingCriterion,
    ScopingLogic,
};
pub use statistics::RunStatistics;
pub use store::{CsoStore, CsoWrite, InMemoryCatalog, InMemoryCsoStore};
pub use system::{ConnectedSystem, ConnectedSystemCatalog, RunProfile, RunType};
pub use value::{AttributeValue, CsoReference, ExternalIds, MetaverseValue, ResolvedTarget};
