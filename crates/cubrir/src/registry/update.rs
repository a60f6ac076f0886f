//! Instrumentation Updates
//!
//! Immutable values describing one re-instrumentation cycle: the version and
//! slot count the registry transitions to, the changed packages with their
//! rebuilt files, and the context table those files were tagged against.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::context::ContextStore;
use super::entity::SourceFileInfo;

/// One changed or added package and its changed files
///
/// Files replace same-name files in the live package wholesale; there is no
/// finer-grained structural edit.
#[derive(Debug, Clone)]
pub struct PackageDelta {
    name: String,
    files: Vec<Arc<SourceFileInfo>>,
}

impl PackageDelta {
    /// Describe a package's changed files
    #[must_use]
    pub fn new(name: &str, files: Vec<SourceFileInfo>) -> Self {
        Self {
            name: name.to_string(),
            files: files.into_iter().map(Arc::new).collect(),
        }
    }

    /// Package name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The rebuilt files
    #[must_use]
    pub fn files(&self) -> &[Arc<SourceFileInfo>] {
        &self.files
    }
}

/// Immutable description of one re-instrumentation cycle
///
/// Computed by the instrumentation pass against a specific registry version;
/// applying it to any other version is a conflict the caller resolves by
/// recomputing.
#[derive(Debug, Clone)]
pub struct InstrumentationUpdate {
    version: u64,
    start_ts: u64,
    end_ts: u64,
    slot_count: usize,
    packages: Vec<PackageDelta>,
    context_store: ContextStore,
}

impl InstrumentationUpdate {
    /// Describe a full update
    #[must_use]
    pub fn new(
        version: u64,
        start_ts: u64,
        end_ts: u64,
        slot_count: usize,
        packages: Vec<PackageDelta>,
        context_store: ContextStore,
    ) -> Self {
        Self {
            version,
            start_ts,
            end_ts,
            slot_count,
            packages,
            context_store,
        }
    }

    /// The reserved empty variant: a version rollover with no structural
    /// change, used when re-instrumentation finds nothing changed but the
    /// version must still track the build timestamp
    #[must_use]
    pub fn version_bump(version: u64, start_ts: u64, end_ts: u64, slot_count: usize) -> Self {
        Self {
            version,
            start_ts,
            end_ts,
            slot_count,
            packages: Vec::new(),
            context_store: ContextStore::new(),
        }
    }

    /// Version the registry transitions to
    #[inline]
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Start of the instrumentation time window (millis, inclusive)
    #[inline]
    #[must_use]
    pub fn start_ts(&self) -> u64 {
        self.start_ts
    }

    /// End of the instrumentation time window (millis, exclusive)
    #[inline]
    #[must_use]
    pub fn end_ts(&self) -> u64 {
        self.end_ts
    }

    /// Total slot count required after application
    #[inline]
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    /// Changed packages
    #[must_use]
    pub fn packages(&self) -> &[PackageDelta] {
        &self.packages
    }

    /// Context names this update's files were tagged against
    #[must_use]
    pub fn context_store(&self) -> &ContextStore {
        &self.context_store
    }

    /// Whether this is the empty (version-bump-only) variant
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Package-qualified names of every changed file
    #[must_use]
    pub fn changed_files(&self) -> Vec<String> {
        self.packages
            .iter()
            .flat_map(|delta| {
                delta
                    .files()
                    .iter()
                    .map(move |f| format!("{}/{}", delta.name(), f.name()))
            })
            .collect()
    }
}

/// Summary of a successfully applied update
///
/// The unit handed to observers: live coverage flushers size their recording
/// arrays from `slot_count`, persistence serializes the rest. The registry
/// owns no byte format; serde derives leave that to the consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateSummary {
    /// Version the registry now holds
    pub version: u64,
    /// Start of the instrumentation time window (millis)
    pub start_ts: u64,
    /// End of the instrumentation time window (millis)
    pub end_ts: u64,
    /// Total slot count after application
    pub slot_count: usize,
    /// Package-qualified names of the files this update touched
    pub changed_files: Vec<String>,
    /// Context store the registry holds after reconciliation
    pub context_store: ContextStore,
}
