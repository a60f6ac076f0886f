//! Slot Allocation
//!
//! Assigns each structural element a contiguous index range in the flat
//! coverage array. Allocation is sequential and deterministic: children are
//! placed one after another starting at the container's current end, and the
//! container's final range spans from its first claimed slot to its last
//! child's end. Ranges are append-only for the lifetime of a registry; a
//! re-instrumented file gets a fresh sub-range without disturbing anyone
//! else's.
//!
//! An instrumentation pass that re-emits surviving entities in their prior
//! order before appending new ones keeps their ranges stable, so coverage
//! recorded under the previous version stays addressable.

use super::context::ContextSet;
use super::entity::{BranchInfo, ClassInfo, MethodInfo, SlotRange, SourceFileInfo, StatementInfo};

/// Monotonically advancing next-free-slot position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotCursor {
    next: usize,
}

impl SlotCursor {
    /// A cursor at slot 0
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self { next: 0 }
    }

    /// A cursor anchored at an arbitrary position (appending after an
    /// existing extent)
    #[inline]
    #[must_use]
    pub const fn starting_at(next: usize) -> Self {
        Self { next }
    }

    /// Current position
    #[inline]
    #[must_use]
    pub const fn position(self) -> usize {
        self.next
    }

    /// Claim `n` consecutive slots
    fn take(&mut self, n: usize) -> SlotRange {
        let range = SlotRange::new(self.next, n);
        self.next += n;
        range
    }
}

impl Default for SlotCursor {
    fn default() -> Self {
        Self::new()
    }
}

/// A coverable element recorded in source order
#[derive(Debug, Clone)]
enum ElementSpec {
    Statement { line: u32, contexts: ContextSet },
    Branch { line: u32, contexts: ContextSet },
}

/// Builder for one method's coverable elements
///
/// Statements and branches keep their recorded (source) order when slots are
/// assigned: one slot per statement, two per branch (true and false arms).
#[derive(Debug, Clone)]
pub struct MethodBuilder {
    name: String,
    line: u32,
    complexity: Option<u32>,
    contexts: ContextSet,
    is_test: bool,
    elements: Vec<ElementSpec>,
}

impl MethodBuilder {
    /// Start a method at the given declaration line
    #[must_use]
    pub fn new(name: &str, line: u32) -> Self {
        Self {
            name: name.to_string(),
            line,
            complexity: None,
            contexts: ContextSet::new(),
            is_test: false,
            elements: Vec::new(),
        }
    }

    /// Set an explicit cyclomatic complexity
    ///
    /// When unset, `1 + branch count` is used.
    #[must_use]
    pub fn with_complexity(mut self, complexity: u32) -> Self {
        self.complexity = Some(complexity);
        self
    }

    /// Attach contexts to the method; they propagate into every contained
    /// statement and branch, so excluding the method excludes its subtree
    #[must_use]
    pub fn with_contexts(mut self, contexts: ContextSet) -> Self {
        self.contexts = contexts;
        self
    }

    /// Mark the method as test code
    #[must_use]
    pub fn test_method(mut self, is_test: bool) -> Self {
        self.is_test = is_test;
        self
    }

    /// Record a statement
    #[must_use]
    pub fn statement(self, line: u32) -> Self {
        self.statement_in(line, ContextSet::new())
    }

    /// Record a statement carrying its own contexts
    #[must_use]
    pub fn statement_in(mut self, line: u32, contexts: ContextSet) -> Self {
        self.elements.push(ElementSpec::Statement { line, contexts });
        self
    }

    /// Record a branch point (two arms)
    #[must_use]
    pub fn branch(self, line: u32) -> Self {
        self.branch_in(line, ContextSet::new())
    }

    /// Record a branch point carrying its own contexts
    #[must_use]
    pub fn branch_in(mut self, line: u32, contexts: ContextSet) -> Self {
        self.elements.push(ElementSpec::Branch { line, contexts });
        self
    }

    fn build(self, cursor: &mut SlotCursor) -> MethodInfo {
        let start = cursor.position();
        let mut statements = Vec::new();
        let mut branches = Vec::new();
        let mut branch_count = 0u32;
        for element in self.elements {
            match element {
                ElementSpec::Statement { line, mut contexts } => {
                    contexts.or_with(&self.contexts);
                    statements.push(StatementInfo::new(line, cursor.take(1).start(), contexts));
                }
                ElementSpec::Branch { line, mut contexts } => {
                    contexts.or_with(&self.contexts);
                    branch_count += 1;
                    branches.push(BranchInfo::new(line, cursor.take(2), contexts));
                }
            }
        }
        let slots = SlotRange::new(start, cursor.position() - start);
        let complexity = self.complexity.unwrap_or(1 + branch_count);
        MethodInfo::new(
            self.name,
            self.line,
            complexity,
            slots,
            statements,
            branches,
            self.contexts,
            self.is_test,
        )
    }
}

/// Builder for one class
///
/// Class-level statements are the slots the class claims directly; they are
/// allocated first, ahead of the methods' ranges.
#[derive(Debug, Clone)]
pub struct ClassBuilder {
    name: String,
    line: u32,
    contexts: ContextSet,
    is_test: bool,
    class_statements: Vec<(u32, ContextSet)>,
    methods: Vec<MethodBuilder>,
}

impl ClassBuilder {
    /// Start a class at the given declaration line
    #[must_use]
    pub fn new(name: &str, line: u32) -> Self {
        Self {
            name: name.to_string(),
            line,
            contexts: ContextSet::new(),
            is_test: false,
            class_statements: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Attach contexts to the class; they propagate into the whole subtree
    #[must_use]
    pub fn with_contexts(mut self, contexts: ContextSet) -> Self {
        self.contexts = contexts;
        self
    }

    /// Mark the class as test code
    #[must_use]
    pub fn test_class(mut self, is_test: bool) -> Self {
        self.is_test = is_test;
        self
    }

    /// Record a class-level statement (field initializer, static block)
    #[must_use]
    pub fn class_statement(mut self, line: u32) -> Self {
        self.class_statements.push((line, ContextSet::new()));
        self
    }

    /// Add a method
    #[must_use]
    pub fn method(mut self, method: MethodBuilder) -> Self {
        self.methods.push(method);
        self
    }

    fn build(self, cursor: &mut SlotCursor) -> ClassInfo {
        let start = cursor.position();
        let class_statements = self
            .class_statements
            .into_iter()
            .map(|(line, mut contexts)| {
                contexts.or_with(&self.contexts);
                StatementInfo::new(line, cursor.take(1).start(), contexts)
            })
            .collect();
        let methods = self
            .methods
            .into_iter()
            .map(|mut m| {
                m.contexts.or_with(&self.contexts);
                let is_test = m.is_test || self.is_test;
                m.test_method(is_test).build(cursor)
            })
            .collect();
        let slots = SlotRange::new(start, cursor.position() - start);
        ClassInfo::new(
            self.name,
            self.line,
            slots,
            class_statements,
            methods,
            self.contexts,
            self.is_test,
        )
    }
}

/// Builder for one source file
///
/// Produced by the instrumentation pass for every new or changed file; the
/// finished [`SourceFileInfo`] travels inside a package delta. An empty file
/// (say, an interface with no statements) still gets a valid zero-length
/// range anchored at the cursor, so downstream code treats it uniformly.
#[derive(Debug, Clone)]
pub struct SourceFileBuilder {
    name: String,
    line_count: u32,
    timestamp: u64,
    source_hash: Option<u64>,
    classes: Vec<ClassBuilder>,
}

impl SourceFileBuilder {
    /// Start a file
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            line_count: 0,
            timestamp: 0,
            source_hash: None,
            classes: Vec::new(),
        }
    }

    /// Set the number of source lines
    #[must_use]
    pub fn with_line_count(mut self, line_count: u32) -> Self {
        self.line_count = line_count;
        self
    }

    /// Set the source modification timestamp (millis)
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Set a hash of the source text
    #[must_use]
    pub fn with_source_hash(mut self, hash: u64) -> Self {
        self.source_hash = Some(hash);
        self
    }

    /// Add a class
    #[must_use]
    pub fn class(mut self, class: ClassBuilder) -> Self {
        self.classes.push(class);
        self
    }

    /// Assign slots and produce the immutable file node
    ///
    /// The cursor advances past everything this file claimed; the caller
    /// builds the next file from the same cursor.
    #[must_use]
    pub fn build(self, cursor: &mut SlotCursor) -> SourceFileInfo {
        let start = cursor.position();
        let classes: Vec<ClassInfo> = self
            .classes
            .into_iter()
            .map(|c| c.build(cursor))
            .collect();
        let slots = SlotRange::new(start, cursor.position() - start);
        SourceFileInfo::new(
            self.name,
            slots,
            classes,
            self.line_count,
            self.timestamp,
            self.source_hash,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_allocation() {
        let mut cursor = SlotCursor::new();
        let file = SourceFileBuilder::new("calc.rs")
            .class(
                ClassBuilder::new("Calc", 1)
                    .class_statement(2)
                    .method(MethodBuilder::new("add", 4).statement(5).statement(6))
                    .method(MethodBuilder::new("div", 9).statement(10).branch(11)),
            )
            .build(&mut cursor);

        assert_eq!(file.slots(), SlotRange::new(0, 6));
        let class = file.find_class("Calc").unwrap();
        assert_eq!(class.slots(), SlotRange::new(0, 6));
        assert_eq!(class.class_statements()[0].slot(), 0);
        assert_eq!(class.find_method("add").unwrap().slots(), SlotRange::new(1, 2));
        assert_eq!(class.find_method("div").unwrap().slots(), SlotRange::new(3, 3));
        assert_eq!(cursor.position(), 6);
    }

    #[test]
    fn test_empty_container_zero_length_anchor() {
        let mut cursor = SlotCursor::starting_at(12);
        let file = SourceFileBuilder::new("traits.rs")
            .class(ClassBuilder::new("Marker", 1))
            .build(&mut cursor);
        assert_eq!(file.slots(), SlotRange::empty_at(12));
        assert!(file.find_class("Marker").unwrap().slots().is_empty());
        assert_eq!(cursor.position(), 12);
    }

    #[test]
    fn test_branch_claims_two_slots() {
        let mut cursor = SlotCursor::new();
        let file = SourceFileBuilder::new("b.rs")
            .class(ClassBuilder::new("B", 1).method(MethodBuilder::new("f", 2).branch(3)))
            .build(&mut cursor);
        let branch = &file.classes()[0].methods()[0].branches()[0];
        assert_eq!(branch.true_slot(), 0);
        assert_eq!(branch.false_slot(), 1);
        assert_eq!(cursor.position(), 2);
    }

    #[test]
    fn test_default_complexity_counts_branches() {
        let mut cursor = SlotCursor::new();
        let file = SourceFileBuilder::new("c.rs")
            .class(
                ClassBuilder::new("C", 1)
                    .method(MethodBuilder::new("plain", 2).statement(3))
                    .method(MethodBuilder::new("branchy", 5).branch(6).branch(7)),
            )
            .build(&mut cursor);
        let class = &file.classes()[0];
        assert_eq!(class.find_method("plain").unwrap().complexity(), 1);
        assert_eq!(class.find_method("branchy").unwrap().complexity(), 3);
    }

    #[test]
    fn test_container_contexts_propagate() {
        let mut cursor = SlotCursor::new();
        let ctx = ContextSet::single(2);
        let file = SourceFileBuilder::new("t.rs")
            .class(
                ClassBuilder::new("T", 1)
                    .with_contexts(ctx.clone())
                    .method(MethodBuilder::new("m", 2).statement(3)),
            )
            .build(&mut cursor);
        let method = &file.classes()[0].methods()[0];
        assert!(method.contexts().get(2));
        assert!(method.statements()[0].contexts().get(2));
    }

    #[test]
    fn test_deterministic_rebuild() {
        let build = || {
            let mut cursor = SlotCursor::new();
            SourceFileBuilder::new("d.rs")
                .class(
                    ClassBuilder::new("D", 1)
                        .method(MethodBuilder::new("a", 2).statement(3))
                        .method(MethodBuilder::new("b", 5).statement(6).branch(7)),
                )
                .build(&mut cursor)
        };
        assert_eq!(build(), build());
    }
}
