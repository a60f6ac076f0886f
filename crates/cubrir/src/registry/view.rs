//! Registry Views
//!
//! The original (canonical) view owns the project tree and is the only place
//! structural updates enter, serialized through the version CAS. Filtered
//! views are derived, predicate-reduced copies that consume the same update
//! stream with identical slot numbering, so one coverage array serves every
//! view simultaneously. A merged registry combines several projects for
//! reporting only and refuses updates outright.

use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

use crate::result::{RegistryError, RegistryResult};

use super::context::{ContextFilter, ContextStore};
use super::entity::{
    ClassInfo, EntityId, MethodInfo, PackageInfo, Project, SourceFileInfo,
};
use super::metrics::{BlockMetrics, MetricsCache, MetricsEngine};
use super::provider::{CoverageDataProvider, NullProvider, PerTestRecorder, TestId};
use super::update::{InstrumentationUpdate, UpdateSummary};

/// Decides which entities a filtered view accepts
///
/// Structural inclusion is decided at file granularity; within an accepted
/// file, classes and methods can additionally be excluded during the copy.
/// Every decision defaults to accept.
pub trait EntityPredicate: Send + Sync {
    /// Whether a file (and thus its subtree) enters the view
    fn accepts_file(&self, _package: &str, _file: &SourceFileInfo) -> bool {
        true
    }

    /// Whether a class inside an accepted file enters the view
    fn accepts_class(&self, _class: &ClassInfo) -> bool {
        true
    }

    /// Whether a method inside an accepted class enters the view
    fn accepts_method(&self, _method: &MethodInfo) -> bool {
        true
    }
}

/// Accepts everything (a filtered view equal to the original)
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl EntityPredicate for AcceptAll {}

/// Accepts only application code, dropping entities marked as test code
#[derive(Debug, Clone, Copy, Default)]
pub struct ExcludeTestCode;

impl EntityPredicate for ExcludeTestCode {
    fn accepts_file(&self, _package: &str, file: &SourceFileInfo) -> bool {
        // A file whose every class is test code carries nothing for this view
        file.classes().is_empty() || !file.classes().iter().all(ClassInfo::is_test)
    }

    fn accepts_class(&self, class: &ClassInfo) -> bool {
        !class.is_test()
    }

    fn accepts_method(&self, method: &MethodInfo) -> bool {
        !method.is_test()
    }
}

/// Query-time state shared by every view flavor: the attached provider and
/// recorder, the active context filter, and the derived-metrics table
struct QueryState {
    provider: RwLock<Option<Arc<dyn CoverageDataProvider>>>,
    tests: RwLock<Option<Arc<PerTestRecorder>>>,
    filter: RwLock<ContextFilter>,
    cache: MetricsCache,
}

impl QueryState {
    fn new() -> Self {
        Self {
            provider: RwLock::new(None),
            tests: RwLock::new(None),
            filter: RwLock::new(ContextFilter::none()),
            cache: MetricsCache::new(),
        }
    }

    fn attach_provider(&self, provider: Arc<dyn CoverageDataProvider>) {
        *self.provider.write() = Some(provider);
        // The data changed under every cached entry even though structure didn't
        self.cache.invalidate_all();
    }

    fn detach_provider(&self) {
        *self.provider.write() = None;
        self.cache.invalidate_all();
    }

    fn attach_recorder(&self, recorder: Arc<PerTestRecorder>) {
        *self.tests.write() = Some(recorder);
        self.cache.invalidate_all();
    }

    fn set_filter(&self, filter: ContextFilter) {
        *self.filter.write() = filter;
        self.cache.invalidate_all();
    }

    fn filter(&self) -> ContextFilter {
        self.filter.read().clone()
    }

    fn recorder(&self) -> Option<Arc<PerTestRecorder>> {
        self.tests.read().clone()
    }

    /// Cached compute: consult the table, otherwise run the fold with the
    /// currently attached provider (or the null provider when none is)
    fn compute<F>(&self, id: EntityId, fold: F) -> BlockMetrics
    where
        F: FnOnce(&MetricsEngine<'_>) -> BlockMetrics,
    {
        if let Some(cached) = self.cache.get(&id) {
            return cached;
        }
        let provider = self.provider.read().clone();
        let recorder = self.tests.read().clone();
        let filter = self.filter.read().clone();
        let provider_ref: &dyn CoverageDataProvider =
            provider.as_deref().unwrap_or(&NullProvider);
        let mut engine = MetricsEngine::new(provider_ref, &filter);
        if let Some(recorder) = recorder.as_deref() {
            engine = engine.with_tests(recorder);
        }
        let metrics = fold(&engine);
        self.cache.insert(id, metrics);
        metrics
    }
}

macro_rules! metrics_entry_points {
    () => {
        /// Metrics for the whole project (cached)
        #[must_use]
        pub fn project_metrics(&self) -> BlockMetrics {
            self.query
                .compute(EntityId::project(), |engine| {
                    engine.project_metrics(&self.project)
                })
        }

        /// Metrics for a package (cached), `None` if absent
        #[must_use]
        pub fn package_metrics(&self, package: &str) -> Option<BlockMetrics> {
            let pkg = self.project.find_package(package)?;
            Some(self.query.compute(EntityId::package(package), |engine| {
                engine.package_metrics(&pkg)
            }))
        }

        /// Metrics for a file (cached), `None` if absent
        #[must_use]
        pub fn file_metrics(&self, package: &str, file: &str) -> Option<BlockMetrics> {
            let node = self.project.find_file(package, file)?;
            Some(self.query.compute(EntityId::file(package, file), |engine| {
                engine.file_metrics(&node)
            }))
        }

        /// Metrics for a class (cached), `None` if absent
        #[must_use]
        pub fn class_metrics(
            &self,
            package: &str,
            file: &str,
            class: &str,
        ) -> Option<BlockMetrics> {
            let node = self.project.find_file(package, file)?;
            let class_node = node.find_class(class)?.clone();
            Some(
                self.query
                    .compute(EntityId::class(package, file, class), |engine| {
                        engine.class_metrics(&class_node)
                    }),
            )
        }

        /// Metrics for a method (cached), `None` if absent
        #[must_use]
        pub fn method_metrics(
            &self,
            package: &str,
            file: &str,
            class: &str,
            method: &str,
        ) -> Option<BlockMetrics> {
            let node = self.project.find_file(package, file)?;
            let method_node = node.find_class(class)?.find_method(method)?.clone();
            Some(self.query.compute(
                EntityId::method(package, file, class, method),
                |engine| engine.method_metrics(&method_node),
            ))
        }

        /// Metrics for what one test alone covers and no other test does
        ///
        /// Runs the standard fold against the unique-coverage set difference.
        /// Uncached: the derived provider is per call. `None` when no
        /// recorder is attached or the test is unknown.
        #[must_use]
        pub fn unique_test_metrics(&self, test: TestId) -> Option<BlockMetrics> {
            let recorder = self.query.recorder()?;
            let provider = recorder.unique_provider(test)?;
            let filter = self.query.filter();
            let engine = MetricsEngine::new(&provider, &filter).with_tests(&recorder);
            Some(engine.project_metrics(&self.project))
        }

        /// Attach the coverage data provider consulted by metrics queries
        ///
        /// Swapping providers invalidates cached metrics; the registry does
        /// not own the provider's lifecycle.
        pub fn attach_provider(&self, provider: Arc<dyn CoverageDataProvider>) {
            self.query.attach_provider(provider);
        }

        /// Detach the provider; queries fall back to 0% covered
        pub fn detach_provider(&self) {
            self.query.detach_provider();
        }

        /// Attach the per-test recorder consulted for test counters and
        /// unique-coverage queries
        pub fn attach_recorder(&self, recorder: Arc<PerTestRecorder>) {
            self.query.attach_recorder(recorder);
        }

        /// Set the active context filter (invalidates cached metrics)
        pub fn set_context_filter(&self, filter: ContextFilter) {
            self.query.set_filter(filter);
        }

        /// The active context filter
        #[must_use]
        pub fn context_filter(&self) -> ContextFilter {
            self.query.filter()
        }
    };
}

/// The canonical coverage registry (the original view)
///
/// All structural mutation funnels through [`CoverageRegistry::apply_update`],
/// serialized by the project's version CAS. Readers are never blocked:
/// traversal works over `Arc` snapshots that an in-flight update cannot
/// tear.
pub struct CoverageRegistry {
    project: Project,
    views: RwLock<Vec<Arc<FilteredView>>>,
    query: QueryState,
    read_only: bool,
}

impl CoverageRegistry {
    /// An empty registry at version 0
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            project: Project::new(name),
            views: RwLock::new(Vec::new()),
            query: QueryState::new(),
            read_only: false,
        }
    }

    /// The root project
    #[must_use]
    pub fn project(&self) -> &Project {
        &self.project
    }

    /// Current registry version
    #[must_use]
    pub fn version(&self) -> u64 {
        self.project.version()
    }

    /// Total slot count of the coverage array
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.project.slot_count()
    }

    /// Context store the registry currently holds
    #[must_use]
    pub fn context_store(&self) -> Arc<ContextStore> {
        self.project.context_store()
    }

    /// Whether this registry is a merged, reporting-only view
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn validate(update: &InstrumentationUpdate) -> RegistryResult<()> {
        let mut seen_packages = std::collections::HashSet::new();
        let mut max_end = 0usize;
        for delta in update.packages() {
            if !seen_packages.insert(delta.name()) {
                return Err(RegistryError::StructuralInconsistency {
                    message: format!("package {} appears twice in one update", delta.name()),
                });
            }
            let mut seen_files = std::collections::HashSet::new();
            for file in delta.files() {
                if !seen_files.insert(file.name()) {
                    return Err(RegistryError::StructuralInconsistency {
                        message: format!(
                            "file {}/{} appears twice in one update",
                            delta.name(),
                            file.name()
                        ),
                    });
                }
                max_end = max_end.max(file.slots().end());
            }
        }
        if max_end > update.slot_count() {
            return Err(RegistryError::StructuralInconsistency {
                message: format!(
                    "update declares {} slots but its files extend to {}",
                    update.slot_count(),
                    max_end
                ),
            });
        }
        Ok(())
    }

    /// Atomically apply an incremental re-instrumentation result
    ///
    /// Compare-and-sets the version from `expected_version` to the update's
    /// version; on conflict the error carries the version that won and the
    /// registry keeps its last-good state — the caller recomputes against it
    /// and retries, the registry never retries internally. On success the
    /// changed packages are merged (whole-file replacement, append-only
    /// ranges), context stores are reconciled by name, cached metrics are
    /// invalidated along the touched subtrees, and the update is mirrored to
    /// every filtered view.
    pub fn apply_update(
        &self,
        expected_version: u64,
        update: &InstrumentationUpdate,
    ) -> RegistryResult<UpdateSummary> {
        if self.read_only {
            return Err(RegistryError::ReadOnlyRegistry);
        }
        Self::validate(update)?;
        self.project
            .try_advance_version(expected_version, update.version())
            .map_err(|actual| RegistryError::VersionConflict {
                expected: expected_version,
                actual,
            })?;

        // Reconcile context stores by name; bit positions may move
        let (merged_store, remap) = self.project.context_store().merge(update.context_store());
        let needs_remap = !remap.is_identity();
        self.project.swap_context_store(merged_store);

        let mut packages: Vec<Arc<PackageInfo>> = self.project.packages().as_ref().clone();
        let mut touched: Vec<EntityId> = Vec::new();
        for delta in update.packages() {
            let files: Vec<Arc<SourceFileInfo>> = delta
                .files()
                .iter()
                .map(|f| {
                    if needs_remap {
                        Arc::new(f.remapped(&remap))
                    } else {
                        Arc::clone(f)
                    }
                })
                .collect();
            for file in &files {
                touched.push(EntityId::file(delta.name(), file.name()));
            }
            match packages.iter().position(|p| p.name() == delta.name()) {
                Some(i) => packages[i] = Arc::new(packages[i].with_merged_files(&files, &[])),
                None => packages.push(Arc::new(PackageInfo::new(delta.name(), files))),
            }
        }
        // One atomic swap: readers see the fully-old or fully-new forest
        self.project.swap_packages(packages);
        self.project.extend_slot_count(update.slot_count());
        self.project.extend_slot_count(self.project.max_extent());

        for id in &touched {
            self.query.cache.invalidate_subtree_and_ancestors(id);
        }

        for view in self.views.read().iter() {
            view.mirror(update);
        }

        let summary = UpdateSummary {
            version: update.version(),
            start_ts: update.start_ts(),
            end_ts: update.end_ts(),
            slot_count: self.project.slot_count(),
            changed_files: update.changed_files(),
            context_store: (*self.project.context_store()).clone(),
        };
        tracing::debug!(
            version = summary.version,
            slots = summary.slot_count,
            files = summary.changed_files.len(),
            "applied instrumentation update"
        );
        Ok(summary)
    }

    /// Register a filtered view over this registry
    ///
    /// The view is seeded from the current state and mirrors every
    /// subsequent update.
    pub fn add_filtered_view<P>(&self, name: &str, predicate: P) -> Arc<FilteredView>
    where
        P: EntityPredicate + 'static,
    {
        let view = Arc::new(FilteredView::derive(name, Box::new(predicate), &self.project));
        self.views.write().push(Arc::clone(&view));
        view
    }

    /// The registered filtered views
    #[must_use]
    pub fn filtered_views(&self) -> Vec<Arc<FilteredView>> {
        self.views.read().clone()
    }

    /// Merge several registries into one reporting-only registry
    ///
    /// Each source's slot ranges are rebased past the previous sources'
    /// slot counts so all ranges stay disjoint in one address space; context
    /// stores are reconciled by name. When two sources carry the same
    /// package, their files are combined and a same-name file from a later
    /// source wins. The result refuses updates with
    /// [`RegistryError::ReadOnlyRegistry`].
    #[must_use]
    pub fn merge(name: &str, sources: &[&CoverageRegistry]) -> CoverageRegistry {
        let project = Project::new(name);
        let mut merged_store = ContextStore::new();
        let mut packages: Vec<Arc<PackageInfo>> = Vec::new();
        let mut offset = 0usize;
        let mut version = 0u64;

        for source in sources {
            let src = source.project();
            version = version.max(src.version());
            let (next_store, remap) = merged_store.merge(&src.context_store());
            merged_store = next_store;
            for pkg in src.packages().iter() {
                let mut rebased = pkg.shifted(offset);
                if !remap.is_identity() {
                    rebased = rebased.remapped(&remap);
                }
                match packages.iter().position(|p| p.name() == rebased.name()) {
                    Some(i) => {
                        packages[i] =
                            Arc::new(packages[i].with_merged_files(rebased.files(), &[]));
                    }
                    None => packages.push(Arc::new(rebased)),
                }
            }
            offset += src.slot_count();
        }

        project.force_version(version);
        project.swap_context_store(merged_store);
        project.swap_packages(packages);
        project.extend_slot_count(offset);
        project.extend_slot_count(project.max_extent());
        tracing::debug!(
            sources = sources.len(),
            slots = project.slot_count(),
            "merged registries for reporting"
        );

        CoverageRegistry {
            project,
            views: RwLock::new(Vec::new()),
            query: QueryState::new(),
            read_only: true,
        }
    }

    metrics_entry_points!();
}

impl fmt::Debug for CoverageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoverageRegistry")
            .field("project", &self.project)
            .field("views", &self.views.read().len())
            .field("read_only", &self.read_only)
            .finish()
    }
}

/// A derived, predicate-filtered projection of the original registry
///
/// Structurally reduced but never renumbered: every accepted entity keeps
/// the slot range it has in the original, so one coverage array serves both
/// views. Does not participate in the version CAS — it trusts that the
/// original validated the update and simply mirrors it.
pub struct FilteredView {
    name: String,
    predicate: Box<dyn EntityPredicate>,
    project: Project,
    query: QueryState,
}

impl FilteredView {
    fn derive(name: &str, predicate: Box<dyn EntityPredicate>, source: &Project) -> Self {
        let project = Project::new(source.name());
        project.force_version(source.version());
        project.swap_context_store((*source.context_store()).clone());

        let mut packages: Vec<Arc<PackageInfo>> = Vec::new();
        for pkg in source.packages().iter() {
            let files: Vec<Arc<SourceFileInfo>> = pkg
                .files()
                .iter()
                .filter_map(|f| Self::copy_file(predicate.as_ref(), pkg.name(), f))
                .collect();
            if !files.is_empty() {
                packages.push(Arc::new(PackageInfo::new(pkg.name(), files)));
            }
        }
        project.swap_packages(packages);
        project.extend_slot_count(source.slot_count());

        Self {
            name: name.to_string(),
            predicate,
            project,
            query: QueryState::new(),
        }
    }

    /// Filtered copy of one file, identical slot numbering
    fn copy_file(
        predicate: &dyn EntityPredicate,
        package: &str,
        file: &Arc<SourceFileInfo>,
    ) -> Option<Arc<SourceFileInfo>> {
        if !predicate.accepts_file(package, file) {
            return None;
        }
        Some(Arc::new(file.retaining(
            |class| predicate.accepts_class(class),
            |method| predicate.accepts_method(method),
        )))
    }

    /// View name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The view's derived project
    #[must_use]
    pub fn project(&self) -> &Project {
        &self.project
    }

    /// Version last mirrored from the original
    #[must_use]
    pub fn version(&self) -> u64 {
        self.project.version()
    }

    /// Consume one propagated update
    ///
    /// Packages absent from the view are created lazily on the first
    /// accepted file; a changed file the predicate now rejects is dropped
    /// from the view (whole-file replacement semantics).
    pub(crate) fn mirror(&self, update: &InstrumentationUpdate) {
        self.project.force_version(update.version());

        // The view's store started as a copy of the original's, so this
        // merge reproduces the original's reconciliation bit for bit
        let (merged_store, remap) = self.project.context_store().merge(update.context_store());
        let needs_remap = !remap.is_identity();
        self.project.swap_context_store(merged_store);

        let mut packages: Vec<Arc<PackageInfo>> = self.project.packages().as_ref().clone();
        let mut touched: Vec<EntityId> = Vec::new();
        for delta in update.packages() {
            let mut accepted: Vec<Arc<SourceFileInfo>> = Vec::new();
            let mut rejected: Vec<&str> = Vec::new();
            for file in delta.files() {
                touched.push(EntityId::file(delta.name(), file.name()));
                let incoming = if needs_remap {
                    Arc::new(file.remapped(&remap))
                } else {
                    Arc::clone(file)
                };
                match Self::copy_file(self.predicate.as_ref(), delta.name(), &incoming) {
                    Some(copy) => accepted.push(copy),
                    None => rejected.push(file.name()),
                }
            }
            if let Some(i) = packages.iter().position(|p| p.name() == delta.name()) {
                packages[i] = Arc::new(packages[i].with_merged_files(&accepted, &rejected));
            } else if !accepted.is_empty() {
                packages.push(Arc::new(PackageInfo::new(delta.name(), accepted)));
            }
        }
        self.project.swap_packages(packages);
        self.project.extend_slot_count(update.slot_count());

        for id in &touched {
            self.query.cache.invalidate_subtree_and_ancestors(id);
        }
        tracing::trace!(view = %self.name, version = update.version(), "mirrored update");
    }

    metrics_entry_points!();
}

impl fmt::Debug for FilteredView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilteredView")
            .field("name", &self.name)
            .field("project", &self.project)
            .finish()
    }
}
