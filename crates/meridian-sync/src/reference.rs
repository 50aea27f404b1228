//! Reference matching.
//!
//! Decides whether a persisted reference value and an incoming source token
//! name the same target. The storage layer does not always materialize the
//! navigation to the referenced CSO, so three sources of truth are tried in
//! order, and the first one that can give an answer decides:
//!
//! 1. the materialized target's external identifier,
//! 2. the external identifier fetched through an [`ExternalIdLookup`] for the
//!    persisted target id,
//! 3. the token stored when the value was first imported.
//!
//! The first tier with something to compare gives the verdict, even when it
//! disagrees. A value is also different when no tier has anything to compare.
//! Without the lower tiers a healthy reference would be removed and re-added
//! on every run whenever navigation is missing.
//!
//! Navigation and lookup only know Normal targets. A reference to an obsolete
//! CSO is therefore judged by its token, and the import's resolution pass
//! re-points it at the live CSO that token names.

use async_trait::async_trait;
use meridian_core::CsoId;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::SyncResult;
use crate::value::{CsoReference, ExternalIds};

/// Resolves external identifiers for CSO ids without navigation.
#[async_trait]
pub trait ExternalIdLookup: Send + Sync {
    /// External identifiers of the given CSOs. Unknown ids, and ids of CSOs
    /// that are no longer Normal, are absent from the result.
    async fn external_ids(&self, ids: &[CsoId]) -> SyncResult<HashMap<CsoId, ExternalIds>>;
}

/// Which tier decided a comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchTier {
    /// Materialized target navigation.
    Navigation,
    /// External-id lookup by target id.
    Lookup,
    /// Stored source token.
    Token,
}

/// Outcome of one comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceMatch {
    pub same: bool,
    /// `None` when no tier had anything to compare.
    pub tier: Option<MatchTier>,
}

/// Reference matcher with a per-run lookup cache.
pub struct ReferenceMatcher {
    lookup: Arc<dyn ExternalIdLookup>,
    batch_size: usize,
    cache: HashMap<CsoId, ExternalIds>,
    /// Ids the lookup was asked about and did not know.
    missing: HashSet<CsoId>,
}

impl ReferenceMatcher {
    pub fn new(lookup: Arc<dyn ExternalIdLookup>, batch_size: usize) -> Self {
        Self {
            lookup,
            batch_size: batch_size.max(1),
            cache: HashMap::new(),
            missing: HashSet::new(),
        }
    }

    /// Fetch external ids for every reference that has a target id but no
    /// navigation, in batches. A failed lookup is logged and leaves those
    /// ids to the token tier.
    pub async fn prefetch<'a, I>(&mut self, references: I)
    where
        I: IntoIterator<Item = &'a CsoReference>,
    {
        let wanted: Vec<CsoId> = references
            .into_iter()
            .filter(|r| r.target.is_none())
            .filter_map(|r| r.target_id)
            .filter(|id| !self.cache.contains_key(id) && !self.missing.contains(id))
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        for chunk in wanted.chunks(self.batch_size) {
            match self.lookup.external_ids(chunk).await {
                Ok(found) => {
                    debug!(
                        requested = chunk.len(),
                        found = found.len(),
                        "Fetched external ids for reference targets"
                    );
                    for id in chunk {
                        if !found.contains_key(id) {
                            self.missing.insert(*id);
                        }
                    }
                    self.cache.extend(found);
                }
                Err(e) => {
                    warn!(
                        requested = chunk.len(),
                        error = %e,
                        "External id lookup failed, falling back to stored tokens"
                    );
                    self.missing.extend(chunk.iter().copied());
                }
            }
        }
    }

    /// Compare a persisted reference against an incoming token.
    pub async fn compare(&mut self, persisted: &CsoReference, token: &str) -> ReferenceMatch {
        if let Some(target) = &persisted.target {
            return ReferenceMatch {
                same: target.external_ids.matches_token(token),
                tier: Some(MatchTier::Navigation),
            };
        }

        if let Some(target_id) = persisted.target_id {
            if !self.cache.contains_key(&target_id) && !self.missing.contains(&target_id) {
                self.prefetch(std::iter::once(persisted)).await;
            }
            if let Some(external_ids) = self.cache.get(&target_id) {
                return ReferenceMatch {
                    same: external_ids.matches_token(token),
                    tier: Some(MatchTier::Lookup),
                };
            }
        }

        match &persisted.unresolved_token {
            Some(stored) => ReferenceMatch {
                same: stored == token,
                tier: Some(MatchTier::Token),
            },
            None => ReferenceMatch {
                same: false,
                tier: None,
            },
        }
    }

    /// Whether a persisted reference and an incoming token name the same target.
    pub async fn is_same_reference(&mut self, persisted: &CsoReference, token: &str) -> bool {
        self.compare(persisted, token).await.same
    }
}

/// Drop-in lookup that knows nothing.
///
/// With it every reference lacking navigation is decided by its stored token.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoExternalIdLookup;

#[async_trait]
impl ExternalIdLookup for NoExternalIdLookup {
    async fn external_ids(&self, _ids: &[CsoId]) -> SyncResult<HashMap<CsoId, ExternalIds>> {
        Ok(HashMap::new())
    }
}
