//! Structural Coverage Registry
//!
//! Tracks which structural elements of a code base exist (packages, files,
//! classes, methods, statements, branches), assigns each a stable slot range
//! in the flat coverage array, and absorbs incremental re-instrumentation
//! results under optimistic version control.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  CUBRIR REGISTRY ARCHITECTURE                                    │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  Instrumentation → Update → [CAS] Original View → Filtered Views │
//! │                                 ↓                      ↓         │
//! │                          Metrics Engine  ←  Coverage Provider    │
//! │                                 ↓                                │
//! │                          Context Filter                          │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Structural nodes at file level and below are immutable and `Arc`-shared;
//! all mutation funnels through [`CoverageRegistry::apply_update`], whose
//! version compare-and-set is the single serialization point. Filtered
//! views mirror the same update stream with identical slot numbering, so
//! one coverage array serves every view.

mod context;
mod entity;
mod metrics;
mod provider;
mod slots;
mod update;
mod view;

pub use context::{
    BitRemap, ContextDef, ContextFilter, ContextSet, ContextStore, CTX_ASSERT, CTX_LOG,
};
pub use entity::{
    BranchInfo, ClassInfo, EntityId, EntityKind, EntityRef, MethodInfo, PackageInfo, Project,
    SlotRange, SourceFileInfo, StatementInfo,
};
pub use metrics::{BlockMetrics, MetricsCache, MetricsEngine};
pub use provider::{
    AggregateProvider, BitSetProvider, CoverageDataProvider, NullProvider, PerTestRecorder,
    RangeTestStats, SlotBitSet, TestCaseInfo, TestId, TestOutcome,
};
pub use slots::{ClassBuilder, MethodBuilder, SlotCursor, SourceFileBuilder};
pub use update::{InstrumentationUpdate, PackageDelta, UpdateSummary};
pub use view::{AcceptAll, CoverageRegistry, EntityPredicate, ExcludeTestCode, FilteredView};
