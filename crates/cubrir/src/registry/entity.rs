//! Structural Entity Model
//!
//! The typed tree of code elements a registry tracks: project → package →
//! source file → class → method → statement/branch. Nodes at file level and
//! below are immutable and `Arc`-shared; replacing a file replaces its whole
//! subtree. The project root carries the version word and swaps whole
//! package lists, so a concurrent reader always sees a fully-old or
//! fully-new snapshot, never a partial one.

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use super::context::{BitRemap, ContextSet, ContextStore};

/// Half-open index range `[start, start + len)` into the flat coverage array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotRange {
    start: usize,
    len: usize,
}

impl SlotRange {
    /// Create a range
    #[inline]
    #[must_use]
    pub const fn new(start: usize, len: usize) -> Self {
        Self { start, len }
    }

    /// A zero-length range anchored at the given position
    #[inline]
    #[must_use]
    pub const fn empty_at(start: usize) -> Self {
        Self { start, len: 0 }
    }

    /// First slot index
    #[inline]
    #[must_use]
    pub const fn start(self) -> usize {
        self.start
    }

    /// Number of slots
    #[inline]
    #[must_use]
    pub const fn len(self) -> usize {
        self.len
    }

    /// One past the last slot index
    #[inline]
    #[must_use]
    pub const fn end(self) -> usize {
        self.start + self.len
    }

    /// Whether the range spans no slots
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.len == 0
    }

    /// Whether a slot index falls inside the range
    #[inline]
    #[must_use]
    pub const fn contains(self, slot: usize) -> bool {
        slot >= self.start && slot < self.end()
    }

    /// Whether two ranges share any slot
    #[must_use]
    pub const fn overlaps(self, other: SlotRange) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        self.start < other.end() && other.start < self.end()
    }

    /// Smallest range spanning both inputs
    ///
    /// Zero-length ranges act as identity so empty containers do not drag a
    /// union back to their anchor.
    #[must_use]
    pub fn union(self, other: SlotRange) -> SlotRange {
        if self.is_empty() {
            return other;
        }
        if other.is_empty() {
            return self;
        }
        let start = self.start.min(other.start);
        let end = self.end().max(other.end());
        SlotRange::new(start, end - start)
    }

    /// Iterate over the slot indices in the range
    pub fn iter(self) -> impl Iterator<Item = usize> {
        self.start..self.end()
    }

    /// The same range shifted right by `delta` slots
    #[must_use]
    pub(crate) const fn shifted(self, delta: usize) -> SlotRange {
        SlotRange::new(self.start + delta, self.len)
    }
}

/// Kind of structural element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// The root container
    Project,
    /// A package / namespace grouping of files
    Package,
    /// One source file
    File,
    /// A class (or equivalent type-level container)
    Class,
    /// A method or function
    Method,
    /// One executable statement
    Statement,
    /// One branch point (two arms)
    Branch,
}

/// Stable identity of an entity, independent of slot numbering
///
/// A hierarchical name path: `package / file / class / method`. Used as the
/// key of the derived-metrics table, so identity survives re-instrumentation
/// even when slot ranges move.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityId {
    segments: Vec<String>,
}

impl EntityId {
    /// Identity of the project root
    #[must_use]
    pub fn project() -> Self {
        Self { segments: Vec::new() }
    }

    /// Identity of a package
    #[must_use]
    pub fn package(name: &str) -> Self {
        Self {
            segments: vec![name.to_string()],
        }
    }

    /// Identity of a file within a package
    #[must_use]
    pub fn file(package: &str, file: &str) -> Self {
        Self {
            segments: vec![package.to_string(), file.to_string()],
        }
    }

    /// Identity of a class within a file
    #[must_use]
    pub fn class(package: &str, file: &str, class: &str) -> Self {
        Self {
            segments: vec![package.to_string(), file.to_string(), class.to_string()],
        }
    }

    /// Identity of a method within a class
    #[must_use]
    pub fn method(package: &str, file: &str, class: &str, method: &str) -> Self {
        Self {
            segments: vec![
                package.to_string(),
                file.to_string(),
                class.to_string(),
                method.to_string(),
            ],
        }
    }

    /// Identity of a named child of this entity
    #[must_use]
    pub fn child(&self, segment: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Self { segments }
    }

    /// Identity of the parent entity, `None` for the project root
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.segments.is_empty() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Depth in the tree (0 for the project root)
    #[must_use]
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Whether this identity is `other` or one of its ancestors
    #[must_use]
    pub fn is_self_or_ancestor_of(&self, other: &EntityId) -> bool {
        other.segments.len() >= self.segments.len()
            && other.segments[..self.segments.len()] == self.segments[..]
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "<project>");
        }
        write!(f, "{}", self.segments.join("/"))
    }
}

/// Borrowed tagged-union view over any entity in the tree
///
/// The uniform surface for consumers that walk the registry generically
/// (report renderers); per-variant data stays on the concrete node types.
#[derive(Debug, Clone, Copy)]
pub enum EntityRef<'a> {
    /// The project root
    Project(&'a Project),
    /// A package
    Package(&'a PackageInfo),
    /// A source file
    File(&'a SourceFileInfo),
    /// A class
    Class(&'a ClassInfo),
    /// A method
    Method(&'a MethodInfo),
    /// A statement
    Statement(&'a StatementInfo),
    /// A branch
    Branch(&'a BranchInfo),
}

impl EntityRef<'_> {
    /// Which variant this reference holds
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Project(_) => EntityKind::Project,
            Self::Package(_) => EntityKind::Package,
            Self::File(_) => EntityKind::File,
            Self::Class(_) => EntityKind::Class,
            Self::Method(_) => EntityKind::Method,
            Self::Statement(_) => EntityKind::Statement,
            Self::Branch(_) => EntityKind::Branch,
        }
    }

    /// The entity's slot range
    #[must_use]
    pub fn slots(&self) -> SlotRange {
        match self {
            Self::Project(p) => SlotRange::new(0, p.slot_count()),
            Self::Package(p) => p.slots(),
            Self::File(f) => f.slots(),
            Self::Class(c) => c.slots(),
            Self::Method(m) => m.slots(),
            Self::Statement(s) => SlotRange::new(s.slot(), 1),
            Self::Branch(b) => b.slots(),
        }
    }

    /// The entity's context set; containers above class level carry none
    #[must_use]
    pub fn contexts(&self) -> Option<&ContextSet> {
        match self {
            Self::Project(_) | Self::Package(_) | Self::File(_) => None,
            Self::Class(c) => Some(c.contexts()),
            Self::Method(m) => Some(m.contexts()),
            Self::Statement(s) => Some(s.contexts()),
            Self::Branch(b) => Some(b.contexts()),
        }
    }
}

/// A single executable statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementInfo {
    line: u32,
    slot: usize,
    contexts: ContextSet,
}

impl StatementInfo {
    pub(crate) fn new(line: u32, slot: usize, contexts: ContextSet) -> Self {
        Self { line, slot, contexts }
    }

    /// Source line the statement starts on
    #[inline]
    #[must_use]
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Coverage array index holding this statement's hit counter
    #[inline]
    #[must_use]
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Contexts applying to this statement
    #[must_use]
    pub fn contexts(&self) -> &ContextSet {
        &self.contexts
    }

    pub(crate) fn shifted(&self, delta: usize) -> Self {
        Self {
            slot: self.slot + delta,
            ..self.clone()
        }
    }

    pub(crate) fn remapped(&self, remap: &BitRemap) -> Self {
        Self {
            contexts: self.contexts.remap(remap),
            ..self.clone()
        }
    }
}

/// One branch point with a true arm and a false arm
///
/// The two arms occupy two consecutive slots: `slots.start()` counts the
/// true arm, `slots.start() + 1` the false arm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchInfo {
    line: u32,
    slots: SlotRange,
    contexts: ContextSet,
}

impl BranchInfo {
    pub(crate) fn new(line: u32, slots: SlotRange, contexts: ContextSet) -> Self {
        Self { line, slots, contexts }
    }

    /// Source line of the branch condition
    #[inline]
    #[must_use]
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Slot range covering both arms
    #[inline]
    #[must_use]
    pub fn slots(&self) -> SlotRange {
        self.slots
    }

    /// Slot counting the true arm
    #[inline]
    #[must_use]
    pub fn true_slot(&self) -> usize {
        self.slots.start()
    }

    /// Slot counting the false arm
    #[inline]
    #[must_use]
    pub fn false_slot(&self) -> usize {
        self.slots.start() + 1
    }

    /// Contexts applying to this branch
    #[must_use]
    pub fn contexts(&self) -> &ContextSet {
        &self.contexts
    }

    pub(crate) fn shifted(&self, delta: usize) -> Self {
        Self {
            slots: self.slots.shifted(delta),
            ..self.clone()
        }
    }

    pub(crate) fn remapped(&self, remap: &BitRemap) -> Self {
        Self {
            contexts: self.contexts.remap(remap),
            ..self.clone()
        }
    }
}

/// A method or function with its statements and branches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodInfo {
    name: String,
    line: u32,
    complexity: u32,
    slots: SlotRange,
    statements: Vec<StatementInfo>,
    branches: Vec<BranchInfo>,
    contexts: ContextSet,
    is_test: bool,
}

impl MethodInfo {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        name: String,
        line: u32,
        complexity: u32,
        slots: SlotRange,
        statements: Vec<StatementInfo>,
        branches: Vec<BranchInfo>,
        contexts: ContextSet,
        is_test: bool,
    ) -> Self {
        Self {
            name,
            line,
            complexity,
            slots,
            statements,
            branches,
            contexts,
            is_test,
        }
    }

    /// Method name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declaration line
    #[inline]
    #[must_use]
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Cyclomatic complexity
    #[inline]
    #[must_use]
    pub fn complexity(&self) -> u32 {
        self.complexity
    }

    /// Slot range spanning all contained statements and branch arms
    #[inline]
    #[must_use]
    pub fn slots(&self) -> SlotRange {
        self.slots
    }

    /// Contained statements in source order
    #[must_use]
    pub fn statements(&self) -> &[StatementInfo] {
        &self.statements
    }

    /// Contained branches in source order
    #[must_use]
    pub fn branches(&self) -> &[BranchInfo] {
        &self.branches
    }

    /// Contexts applying to this method
    #[must_use]
    pub fn contexts(&self) -> &ContextSet {
        &self.contexts
    }

    /// Whether the method was recognized as test code at instrumentation time
    #[inline]
    #[must_use]
    pub fn is_test(&self) -> bool {
        self.is_test
    }

    pub(crate) fn shifted(&self, delta: usize) -> Self {
        Self {
            slots: self.slots.shifted(delta),
            statements: self.statements.iter().map(|s| s.shifted(delta)).collect(),
            branches: self.branches.iter().map(|b| b.shifted(delta)).collect(),
            ..self.clone()
        }
    }

    pub(crate) fn remapped(&self, remap: &BitRemap) -> Self {
        Self {
            contexts: self.contexts.remap(remap),
            statements: self.statements.iter().map(|s| s.remapped(remap)).collect(),
            branches: self.branches.iter().map(|b| b.remapped(remap)).collect(),
            ..self.clone()
        }
    }
}

/// A class with its methods and any class-level statements
///
/// Class-level statements (field initializers, static blocks) are the slots
/// the class claims directly, ahead of its methods' ranges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassInfo {
    name: String,
    line: u32,
    slots: SlotRange,
    class_statements: Vec<StatementInfo>,
    methods: Vec<MethodInfo>,
    contexts: ContextSet,
    is_test: bool,
}

impl ClassInfo {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        name: String,
        line: u32,
        slots: SlotRange,
        class_statements: Vec<StatementInfo>,
        methods: Vec<MethodInfo>,
        contexts: ContextSet,
        is_test: bool,
    ) -> Self {
        Self {
            name,
            line,
            slots,
            class_statements,
            methods,
            contexts,
            is_test,
        }
    }

    /// Class name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declaration line
    #[inline]
    #[must_use]
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Slot range spanning class-level statements and all methods
    #[inline]
    #[must_use]
    pub fn slots(&self) -> SlotRange {
        self.slots
    }

    /// Statements the class claims directly (outside any method)
    #[must_use]
    pub fn class_statements(&self) -> &[StatementInfo] {
        &self.class_statements
    }

    /// Contained methods in source order
    #[must_use]
    pub fn methods(&self) -> &[MethodInfo] {
        &self.methods
    }

    /// Find a method by name
    #[must_use]
    pub fn find_method(&self, name: &str) -> Option<&MethodInfo> {
        self.methods.iter().find(|m| m.name() == name)
    }

    /// Contexts applying to this class
    #[must_use]
    pub fn contexts(&self) -> &ContextSet {
        &self.contexts
    }

    /// Whether the class was recognized as test code at instrumentation time
    #[inline]
    #[must_use]
    pub fn is_test(&self) -> bool {
        self.is_test
    }

    /// A copy keeping only the methods accepted by `keep`, same slot numbering
    pub(crate) fn retaining_methods<F>(&self, keep: F) -> Self
    where
        F: Fn(&MethodInfo) -> bool,
    {
        Self {
            methods: self.methods.iter().filter(|m| keep(m)).cloned().collect(),
            ..self.clone()
        }
    }

    pub(crate) fn shifted(&self, delta: usize) -> Self {
        Self {
            slots: self.slots.shifted(delta),
            class_statements: self
                .class_statements
                .iter()
                .map(|s| s.shifted(delta))
                .collect(),
            methods: self.methods.iter().map(|m| m.shifted(delta)).collect(),
            ..self.clone()
        }
    }

    pub(crate) fn remapped(&self, remap: &BitRemap) -> Self {
        Self {
            contexts: self.contexts.remap(remap),
            class_statements: self
                .class_statements
                .iter()
                .map(|s| s.remapped(remap))
                .collect(),
            methods: self.methods.iter().map(|m| m.remapped(remap)).collect(),
            ..self.clone()
        }
    }
}

/// One instrumented source file
///
/// Immutable: re-instrumentation replaces the whole file, never edits it in
/// place. Readers holding an `Arc` keep a consistent snapshot across updates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFileInfo {
    name: String,
    slots: SlotRange,
    classes: Vec<ClassInfo>,
    line_count: u32,
    timestamp: u64,
    source_hash: Option<u64>,
}

impl SourceFileInfo {
    pub(crate) fn new(
        name: String,
        slots: SlotRange,
        classes: Vec<ClassInfo>,
        line_count: u32,
        timestamp: u64,
        source_hash: Option<u64>,
    ) -> Self {
        Self {
            name,
            slots,
            classes,
            line_count,
            timestamp,
            source_hash,
        }
    }

    /// File name (package-relative path)
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Slot range spanning all contained classes
    #[inline]
    #[must_use]
    pub fn slots(&self) -> SlotRange {
        self.slots
    }

    /// Contained classes in source order
    #[must_use]
    pub fn classes(&self) -> &[ClassInfo] {
        &self.classes
    }

    /// Find a class by name
    #[must_use]
    pub fn find_class(&self, name: &str) -> Option<&ClassInfo> {
        self.classes.iter().find(|c| c.name() == name)
    }

    /// Number of source lines
    #[inline]
    #[must_use]
    pub fn line_count(&self) -> u32 {
        self.line_count
    }

    /// Source modification timestamp (millis) recorded at instrumentation
    #[inline]
    #[must_use]
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Hash of the source text, when the instrumentation pass supplied one
    #[inline]
    #[must_use]
    pub fn source_hash(&self) -> Option<u64> {
        self.source_hash
    }

    /// A copy with classes filtered and methods filtered within them
    pub(crate) fn retaining<FC, FM>(&self, keep_class: FC, keep_method: FM) -> Self
    where
        FC: Fn(&ClassInfo) -> bool,
        FM: Fn(&MethodInfo) -> bool,
    {
        Self {
            classes: self
                .classes
                .iter()
                .filter(|c| keep_class(c))
                .map(|c| c.retaining_methods(&keep_method))
                .collect(),
            ..self.clone()
        }
    }

    pub(crate) fn shifted(&self, delta: usize) -> Self {
        Self {
            slots: self.slots.shifted(delta),
            classes: self.classes.iter().map(|c| c.shifted(delta)).collect(),
            ..self.clone()
        }
    }

    pub(crate) fn remapped(&self, remap: &BitRemap) -> Self {
        Self {
            classes: self.classes.iter().map(|c| c.remapped(remap)).collect(),
            ..self.clone()
        }
    }
}

/// A package grouping of source files
///
/// Immutable value: update application builds a merged copy and swaps it
/// into the project's package list.
#[derive(Debug, Clone)]
pub struct PackageInfo {
    name: String,
    slots: SlotRange,
    files: Vec<Arc<SourceFileInfo>>,
}

impl PackageInfo {
    /// Build a package from its files; the range spans the files' extents
    #[must_use]
    pub fn new(name: &str, files: Vec<Arc<SourceFileInfo>>) -> Self {
        let slots = Self::extent_of(&files);
        Self {
            name: name.to_string(),
            slots,
            files,
        }
    }

    fn extent_of(files: &[Arc<SourceFileInfo>]) -> SlotRange {
        files
            .iter()
            .map(|f| f.slots())
            .fold(SlotRange::empty_at(0), SlotRange::union)
    }

    /// Package name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Slot range spanning all contained files
    ///
    /// Never shrinks across versions: merges take the union of the old and
    /// new extents even when files are removed from a filtered copy.
    #[inline]
    #[must_use]
    pub fn slots(&self) -> SlotRange {
        self.slots
    }

    /// Contained files
    #[must_use]
    pub fn files(&self) -> &[Arc<SourceFileInfo>] {
        &self.files
    }

    /// Find a file by name
    #[must_use]
    pub fn find_file(&self, name: &str) -> Option<&Arc<SourceFileInfo>> {
        self.files.iter().find(|f| f.name() == name)
    }

    /// A merged copy: changed files replace same-name files wholesale,
    /// `removed` names are dropped, and the range is extended to the union
    /// of the old and new extents.
    #[must_use]
    pub(crate) fn with_merged_files(
        &self,
        changed: &[Arc<SourceFileInfo>],
        removed: &[&str],
    ) -> Self {
        let mut files: Vec<Arc<SourceFileInfo>> = self
            .files
            .iter()
            .filter(|f| {
                !removed.contains(&f.name())
                    && !changed.iter().any(|c| c.name() == f.name())
            })
            .cloned()
            .collect();
        files.extend(changed.iter().cloned());
        let slots = self.slots.union(Self::extent_of(&files));
        Self {
            name: self.name.clone(),
            slots,
            files,
        }
    }

    pub(crate) fn shifted(&self, delta: usize) -> Self {
        let files: Vec<Arc<SourceFileInfo>> = self
            .files
            .iter()
            .map(|f| Arc::new(f.shifted(delta)))
            .collect();
        Self {
            name: self.name.clone(),
            slots: self.slots.shifted(delta),
            files,
        }
    }

    pub(crate) fn remapped(&self, remap: &BitRemap) -> Self {
        let files: Vec<Arc<SourceFileInfo>> = self
            .files
            .iter()
            .map(|f| Arc::new(f.remapped(remap)))
            .collect();
        Self {
            name: self.name.clone(),
            slots: self.slots,
            files,
        }
    }
}

/// The root container of a registry tree
///
/// Carries the version word used for optimistic concurrency and the total
/// slot count of the flat coverage array. Structural mutation swaps the
/// whole package list in one atomic store.
pub struct Project {
    name: String,
    version: AtomicU64,
    slot_count: AtomicUsize,
    packages: ArcSwap<Vec<Arc<PackageInfo>>>,
    context_store: ArcSwap<ContextStore>,
}

impl Project {
    /// Create an empty project at version 0
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            version: AtomicU64::new(0),
            slot_count: AtomicUsize::new(0),
            packages: ArcSwap::from_pointee(Vec::new()),
            context_store: ArcSwap::from_pointee(ContextStore::with_defaults()),
        }
    }

    /// Project name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current registry version
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Compare-and-set the version word
    ///
    /// The single serialization point for structural writers. On failure the
    /// observed version is returned and nothing changes.
    pub(crate) fn try_advance_version(&self, expected: u64, next: u64) -> Result<(), u64> {
        self.version
            .compare_exchange(expected, next, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
    }

    /// Overwrite the version without a compare (filtered-view mirroring,
    /// which trusts the original view's CAS)
    pub(crate) fn force_version(&self, version: u64) {
        self.version.store(version, Ordering::Release);
    }

    /// Total slot count of the coverage array
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slot_count.load(Ordering::Acquire)
    }

    /// Grow the slot count to at least `required` (never shrinks)
    pub(crate) fn extend_slot_count(&self, required: usize) {
        let _ = self.slot_count.fetch_max(required, Ordering::AcqRel);
    }

    /// Snapshot of the current package list
    #[must_use]
    pub fn packages(&self) -> Arc<Vec<Arc<PackageInfo>>> {
        self.packages.load_full()
    }

    /// Swap in a new package list (single atomic store)
    pub(crate) fn swap_packages(&self, packages: Vec<Arc<PackageInfo>>) {
        self.packages.store(Arc::new(packages));
    }

    /// Snapshot of the current context store
    #[must_use]
    pub fn context_store(&self) -> Arc<ContextStore> {
        self.context_store.load_full()
    }

    /// Swap in a reconciled context store
    pub(crate) fn swap_context_store(&self, store: ContextStore) {
        self.context_store.store(Arc::new(store));
    }

    /// Find a package by name
    #[must_use]
    pub fn find_package(&self, name: &str) -> Option<Arc<PackageInfo>> {
        self.packages().iter().find(|p| p.name() == name).cloned()
    }

    /// Find a file by package and file name
    #[must_use]
    pub fn find_file(&self, package: &str, file: &str) -> Option<Arc<SourceFileInfo>> {
        self.find_package(package)
            .and_then(|p| p.find_file(file).cloned())
    }

    /// Every file across every package
    #[must_use]
    pub fn files(&self) -> Vec<Arc<SourceFileInfo>> {
        self.packages()
            .iter()
            .flat_map(|p| p.files().iter().cloned())
            .collect()
    }

    /// Largest slot extent observed across all packages
    #[must_use]
    pub fn max_extent(&self) -> usize {
        self.packages()
            .iter()
            .map(|p| p.slots().end())
            .max()
            .unwrap_or(0)
    }
}

impl fmt::Debug for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Project")
            .field("name", &self.name)
            .field("version", &self.version())
            .field("slot_count", &self.slot_count())
            .field("packages", &self.packages().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_range_basics() {
        let r = SlotRange::new(4, 3);
        assert_eq!(r.start(), 4);
        assert_eq!(r.len(), 3);
        assert_eq!(r.end(), 7);
        assert!(r.contains(4));
        assert!(r.contains(6));
        assert!(!r.contains(7));
    }

    #[test]
    fn test_slot_range_overlap() {
        let a = SlotRange::new(0, 4);
        let b = SlotRange::new(4, 2);
        let c = SlotRange::new(3, 2);
        assert!(!a.overlaps(b)); // adjacent, half-open
        assert!(a.overlaps(c));
        assert!(!a.overlaps(SlotRange::empty_at(2))); // empty never overlaps
    }

    #[test]
    fn test_slot_range_union_ignores_empty() {
        let a = SlotRange::new(10, 5);
        let empty = SlotRange::empty_at(0);
        assert_eq!(a.union(empty), a);
        assert_eq!(empty.union(a), a);
        assert_eq!(
            SlotRange::new(2, 2).union(SlotRange::new(6, 2)),
            SlotRange::new(2, 6)
        );
    }

    #[test]
    fn test_entity_id_hierarchy() {
        let method = EntityId::method("core", "engine.rs", "Engine", "start");
        let file = EntityId::file("core", "engine.rs");
        assert!(file.is_self_or_ancestor_of(&method));
        assert!(!method.is_self_or_ancestor_of(&file));
        assert!(EntityId::project().is_self_or_ancestor_of(&file));
        assert_eq!(method.parent().unwrap().depth(), 3);
        assert_eq!(method.to_string(), "core/engine.rs/Engine/start");
    }

    #[test]
    fn test_project_version_cas() {
        let project = Project::new("demo");
        assert_eq!(project.version(), 0);
        assert!(project.try_advance_version(0, 7).is_ok());
        assert_eq!(project.version(), 7);
        assert_eq!(project.try_advance_version(0, 9), Err(7));
        assert_eq!(project.version(), 7);
    }

    #[test]
    fn test_slot_count_never_shrinks() {
        let project = Project::new("demo");
        project.extend_slot_count(10);
        project.extend_slot_count(4);
        assert_eq!(project.slot_count(), 10);
    }
}
