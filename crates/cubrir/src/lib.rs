//! Cubrir: Structural Coverage Registry
//!
//! Cubrir (Spanish: "to cover") tracks the structural elements of a code
//! base — packages, files, classes, methods, statements, branches — and maps
//! each onto a contiguous range of a flat coverage-data array. A live
//! registry absorbs incremental re-instrumentation results under optimistic
//! version control, feeds derived filtered views from the same update
//! stream, and rolls raw hit counts up into per-entity metrics through
//! pluggable coverage data providers.
//!
//! The registry owns no byte format, report renderer, or instrumentation
//! pass; those live at its boundary. What it guarantees is that no coverage
//! slot is ever lost or double-counted across incremental rebuilds.

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]

pub mod registry;
mod result;

pub use registry::{
    AcceptAll, AggregateProvider, BitRemap, BitSetProvider, BlockMetrics, BranchInfo,
    ClassBuilder, ClassInfo, ContextDef, ContextFilter, ContextSet, ContextStore,
    CoverageDataProvider, CoverageRegistry, EntityId, EntityKind, EntityPredicate, EntityRef,
    ExcludeTestCode, FilteredView, InstrumentationUpdate, MethodBuilder, MethodInfo,
    MetricsCache, MetricsEngine, NullProvider, PackageDelta, PackageInfo, PerTestRecorder,
    Project, RangeTestStats, SlotBitSet, SlotCursor, SlotRange, SourceFileBuilder,
    SourceFileInfo, StatementInfo, TestCaseInfo, TestId, TestOutcome, UpdateSummary,
};
pub use result::{RegistryError, RegistryResult};
