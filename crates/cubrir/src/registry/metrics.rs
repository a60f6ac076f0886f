//! Metrics Engine
//!
//! Bottom-up recursive rollup of raw coverage data into per-entity
//! statistics. A container's totals are the sum of its children's totals
//! plus anything it claims directly; covered counts consult the attached
//! [`CoverageDataProvider`] slot by slot, honoring the active
//! [`ContextFilter`]. Computed snapshots live in a derived-data table keyed
//! by entity identity, outside the structural nodes, and are invalidated by
//! structural updates and provider swaps.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use super::context::ContextFilter;
use super::entity::{
    BranchInfo, ClassInfo, EntityId, MethodInfo, PackageInfo, Project, SlotRange, SourceFileInfo,
    StatementInfo,
};
use super::provider::{CoverageDataProvider, PerTestRecorder};

/// Aggregated metrics for one entity
///
/// Structural counters (statements, branches, methods, complexity) fold up
/// the tree; test counters are per-entity, derived from the tests whose
/// coverage touches the entity's own slot range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockMetrics {
    /// Total statements
    pub statements: u32,
    /// Statements with a nonzero hit count
    pub covered_statements: u32,
    /// Total branch arms
    pub branches: u32,
    /// Branch arms with a nonzero hit count
    pub covered_branches: u32,
    /// Total methods
    pub methods: u32,
    /// Methods with at least one hit slot
    pub covered_methods: u32,
    /// Summed cyclomatic complexity
    pub complexity: u32,
    /// Tests whose coverage touches this entity
    pub tests_run: u32,
    /// Of those, how many passed
    pub tests_passed: u32,
    /// Of those, how many failed
    pub tests_failed: u32,
    /// Summed duration of the touching tests, in milliseconds
    pub test_time_ms: u64,
}

impl BlockMetrics {
    /// Fold another entity's structural counters into this one
    ///
    /// Test counters are deliberately not summed: the same test touches many
    /// children, so each level derives its own from the recorder.
    pub fn add(&mut self, other: &BlockMetrics) {
        self.statements += other.statements;
        self.covered_statements += other.covered_statements;
        self.branches += other.branches;
        self.covered_branches += other.covered_branches;
        self.methods += other.methods;
        self.covered_methods += other.covered_methods;
        self.complexity += other.complexity;
    }

    fn percentage(covered: u32, total: u32) -> f64 {
        if total == 0 {
            return 100.0; // Vacuously covered
        }
        f64::from(covered) / f64::from(total) * 100.0
    }

    /// Statement coverage percentage (0 of 0 is 100%)
    #[must_use]
    pub fn statement_coverage(&self) -> f64 {
        Self::percentage(self.covered_statements, self.statements)
    }

    /// Branch coverage percentage (0 of 0 is 100%)
    #[must_use]
    pub fn branch_coverage(&self) -> f64 {
        Self::percentage(self.covered_branches, self.branches)
    }

    /// Method coverage percentage (0 of 0 is 100%)
    #[must_use]
    pub fn method_coverage(&self) -> f64 {
        Self::percentage(self.covered_methods, self.methods)
    }

    /// Total coverable elements across statements, branch arms, and methods
    #[must_use]
    pub fn total_elements(&self) -> u32 {
        self.statements + self.branches + self.methods
    }

    /// Covered elements across statements, branch arms, and methods
    #[must_use]
    pub fn covered_elements(&self) -> u32 {
        self.covered_statements + self.covered_branches + self.covered_methods
    }

    /// Overall element coverage percentage (0 of 0 is 100%)
    #[must_use]
    pub fn element_coverage(&self) -> f64 {
        Self::percentage(self.covered_elements(), self.total_elements())
    }
}

/// Walks the structural tree against a provider and filter
///
/// Pure: holds no cache. Callers wanting memoization go through
/// [`MetricsCache`] (the registry views do).
pub struct MetricsEngine<'a> {
    provider: &'a dyn CoverageDataProvider,
    filter: &'a ContextFilter,
    tests: Option<&'a PerTestRecorder>,
}

impl<'a> MetricsEngine<'a> {
    /// An engine over a provider and an active context filter
    #[must_use]
    pub fn new(provider: &'a dyn CoverageDataProvider, filter: &'a ContextFilter) -> Self {
        Self {
            provider,
            filter,
            tests: None,
        }
    }

    /// Attach a per-test recorder so test counters are populated
    #[must_use]
    pub fn with_tests(mut self, tests: &'a PerTestRecorder) -> Self {
        self.tests = Some(tests);
        self
    }

    fn fold_statement(&self, statement: &StatementInfo, out: &mut BlockMetrics) {
        if self.filter.excludes_entity(statement.contexts()) {
            return;
        }
        out.statements += 1;
        if self.provider.is_hit(statement.slot()) {
            out.covered_statements += 1;
        }
    }

    fn fold_branch(&self, branch: &BranchInfo, out: &mut BlockMetrics) {
        if self.filter.excludes_entity(branch.contexts()) {
            return;
        }
        out.branches += 2;
        if self.provider.is_hit(branch.true_slot()) {
            out.covered_branches += 1;
        }
        if self.provider.is_hit(branch.false_slot()) {
            out.covered_branches += 1;
        }
    }

    fn apply_test_stats(&self, range: SlotRange, out: &mut BlockMetrics) {
        if let Some(recorder) = self.tests {
            let stats = recorder.stats_for(range);
            out.tests_run = stats.tests_run;
            out.tests_passed = stats.tests_passed;
            out.tests_failed = stats.tests_failed;
            out.test_time_ms = stats.test_time_ms;
        }
    }

    /// Metrics for one method
    ///
    /// An excluded method contributes no method count or complexity, but its
    /// statements and branches are still visited: a child carrying context
    /// bits outside the excluded mask keeps counting.
    #[must_use]
    pub fn method_metrics(&self, method: &MethodInfo) -> BlockMetrics {
        let mut out = BlockMetrics::default();
        if !self.filter.excludes_entity(method.contexts()) {
            out.methods = 1;
            out.complexity = method.complexity();
            let range = method.slots();
            if !range.is_empty() && range.iter().any(|slot| self.provider.is_hit(slot)) {
                out.covered_methods = 1;
            }
        }
        for statement in method.statements() {
            self.fold_statement(statement, &mut out);
        }
        for branch in method.branches() {
            self.fold_branch(branch, &mut out);
        }
        self.apply_test_stats(method.slots(), &mut out);
        out
    }

    /// Metrics for one class: class-level statements plus all methods
    #[must_use]
    pub fn class_metrics(&self, class: &ClassInfo) -> BlockMetrics {
        let mut out = BlockMetrics::default();
        for statement in class.class_statements() {
            self.fold_statement(statement, &mut out);
        }
        for method in class.methods() {
            out.add(&self.method_metrics(method));
        }
        self.apply_test_stats(class.slots(), &mut out);
        out
    }

    /// Metrics for one file
    #[must_use]
    pub fn file_metrics(&self, file: &SourceFileInfo) -> BlockMetrics {
        let mut out = BlockMetrics::default();
        for class in file.classes() {
            out.add(&self.class_metrics(class));
        }
        self.apply_test_stats(file.slots(), &mut out);
        out
    }

    /// Metrics for one package
    #[must_use]
    pub fn package_metrics(&self, package: &PackageInfo) -> BlockMetrics {
        let mut out = BlockMetrics::default();
        for file in package.files() {
            out.add(&self.file_metrics(file));
        }
        self.apply_test_stats(package.slots(), &mut out);
        out
    }

    /// Metrics for the whole project
    #[must_use]
    pub fn project_metrics(&self, project: &Project) -> BlockMetrics {
        let mut out = BlockMetrics::default();
        for package in project.packages().iter() {
            out.add(&self.package_metrics(package));
        }
        self.apply_test_stats(SlotRange::new(0, project.slot_count()), &mut out);
        out
    }
}

impl fmt::Debug for MetricsEngine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsEngine")
            .field("filter", self.filter)
            .field("has_tests", &self.tests.is_some())
            .finish()
    }
}

/// Derived-metrics table, kept outside the structural nodes
///
/// Keyed by entity identity so entries survive slot renumbering concerns
/// entirely; invalidation happens along the identity hierarchy.
#[derive(Debug, Default)]
pub struct MetricsCache {
    entries: RwLock<HashMap<EntityId, BlockMetrics>>,
}

impl MetricsCache {
    /// An empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached snapshot for an entity, if still valid
    #[must_use]
    pub fn get(&self, id: &EntityId) -> Option<BlockMetrics> {
        self.entries.read().get(id).copied()
    }

    /// Store a computed snapshot
    pub fn insert(&self, id: EntityId, metrics: BlockMetrics) {
        let _ = self.entries.write().insert(id, metrics);
    }

    /// Number of live entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the cache holds no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drop everything (provider swap: the data changed under every entry)
    pub fn invalidate_all(&self) {
        let mut entries = self.entries.write();
        let dropped = entries.len();
        entries.clear();
        if dropped > 0 {
            tracing::trace!(dropped, "invalidated all cached metrics");
        }
    }

    /// Drop the entry for `id`, its whole subtree, and every ancestor up to
    /// the root (a structural change anywhere re-aggregates upward)
    pub fn invalidate_subtree_and_ancestors(&self, id: &EntityId) {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|key, _| {
            !id.is_self_or_ancestor_of(key) && !key.is_self_or_ancestor_of(id)
        });
        let dropped = before - entries.len();
        if dropped > 0 {
            tracing::trace!(%id, dropped, "invalidated cached metrics");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vacuous_percentages_are_100() {
        let metrics = BlockMetrics::default();
        assert_eq!(metrics.statement_coverage(), 100.0);
        assert_eq!(metrics.branch_coverage(), 100.0);
        assert_eq!(metrics.method_coverage(), 100.0);
        assert_eq!(metrics.element_coverage(), 100.0);
    }

    #[test]
    fn test_percentage_math() {
        let metrics = BlockMetrics {
            statements: 4,
            covered_statements: 1,
            ..Default::default()
        };
        assert_eq!(metrics.statement_coverage(), 25.0);
    }

    #[test]
    fn test_add_skips_test_counters() {
        let mut a = BlockMetrics {
            statements: 1,
            tests_run: 5,
            ..Default::default()
        };
        let b = BlockMetrics {
            statements: 2,
            tests_run: 7,
            ..Default::default()
        };
        a.add(&b);
        assert_eq!(a.statements, 3);
        assert_eq!(a.tests_run, 5);
    }

    #[test]
    fn test_cache_subtree_and_ancestor_invalidation() {
        let cache = MetricsCache::new();
        cache.insert(EntityId::project(), BlockMetrics::default());
        cache.insert(EntityId::package("core"), BlockMetrics::default());
        cache.insert(EntityId::file("core", "a.rs"), BlockMetrics::default());
        cache.insert(
            EntityId::class("core", "a.rs", "A"),
            BlockMetrics::default(),
        );
        cache.insert(EntityId::file("core", "b.rs"), BlockMetrics::default());
        cache.insert(EntityId::package("other"), BlockMetrics::default());

        cache.invalidate_subtree_and_ancestors(&EntityId::file("core", "a.rs"));

        // Subtree gone, ancestors gone, siblings and unrelated packages stay
        assert!(cache.get(&EntityId::file("core", "a.rs")).is_none());
        assert!(cache.get(&EntityId::class("core", "a.rs", "A")).is_none());
        assert!(cache.get(&EntityId::package("core")).is_none());
        assert!(cache.get(&EntityId::project()).is_none());
        assert!(cache.get(&EntityId::file("core", "b.rs")).is_some());
        assert!(cache.get(&EntityId::package("other")).is_some());
    }
}
