//! Coverage Contexts
//!
//! Named classifications of statements and methods (e.g. "log statements",
//! "assertions") that can be excluded from metrics after instrumentation,
//! without re-instrumenting.
//!
//! Each context occupies one bit position. Bit positions are local to a
//! context store: the same name may sit at different bits in two stores, so
//! stores are always reconciled by name, never by position.

use crate::result::{RegistryError, RegistryResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const WORD_BITS: usize = 64;

/// Fixed-width bit vector identifying which contexts apply to an entity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSet {
    words: Vec<u64>,
}

impl ContextSet {
    /// Create an empty context set
    #[must_use]
    pub fn new() -> Self {
        Self { words: Vec::new() }
    }

    /// Create a set with a single bit set
    #[must_use]
    pub fn single(bit: usize) -> Self {
        let mut set = Self::new();
        set.set(bit);
        set
    }

    /// Set a bit, growing the vector as needed
    pub fn set(&mut self, bit: usize) {
        let word = bit / WORD_BITS;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1 << (bit % WORD_BITS);
    }

    /// Clear a bit
    pub fn clear(&mut self, bit: usize) {
        let word = bit / WORD_BITS;
        if word < self.words.len() {
            self.words[word] &= !(1 << (bit % WORD_BITS));
        }
    }

    /// Check whether a bit is set
    #[must_use]
    pub fn get(&self, bit: usize) -> bool {
        let word = bit / WORD_BITS;
        self.words
            .get(word)
            .is_some_and(|w| w & (1 << (bit % WORD_BITS)) != 0)
    }

    /// Whether no bits are set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    /// Number of set bits
    #[must_use]
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Whether any bit is set in both sets
    #[must_use]
    pub fn intersects(&self, other: &ContextSet) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .any(|(a, b)| a & b != 0)
    }

    /// Bitwise AND of two sets
    #[must_use]
    pub fn and(&self, other: &ContextSet) -> ContextSet {
        let words = self
            .words
            .iter()
            .zip(other.words.iter())
            .map(|(a, b)| a & b)
            .collect();
        ContextSet { words }
    }

    /// Bitwise OR of another set into this one
    pub fn or_with(&mut self, other: &ContextSet) {
        if other.words.len() > self.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (a, b) in self.words.iter_mut().zip(other.words.iter()) {
            *a |= b;
        }
    }

    /// Whether every set bit of `other` is also set in `self`
    #[must_use]
    pub fn contains_all(&self, other: &ContextSet) -> bool {
        for (i, b) in other.words.iter().enumerate() {
            let a = self.words.get(i).copied().unwrap_or(0);
            if b & !a != 0 {
                return false;
            }
        }
        true
    }

    /// Index of the first set bit at or after `from`, if any
    ///
    /// Lets callers enumerate applicable contexts without a full scan.
    #[must_use]
    pub fn next_set_bit(&self, from: usize) -> Option<usize> {
        let mut word = from / WORD_BITS;
        if word >= self.words.len() {
            return None;
        }
        // Mask off bits below `from` in the first word
        let mut current = self.words[word] & !((1u64 << (from % WORD_BITS)) - 1);
        loop {
            if current != 0 {
                return Some(word * WORD_BITS + current.trailing_zeros() as usize);
            }
            word += 1;
            if word >= self.words.len() {
                return None;
            }
            current = self.words[word];
        }
    }

    /// Iterate over all set bit positions
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        let mut next = self.next_set_bit(0);
        std::iter::from_fn(move || {
            let bit = next?;
            next = self.next_set_bit(bit + 1);
            Some(bit)
        })
    }

    /// Rewrite bit positions through a remap table
    ///
    /// Bits without a remap entry keep their position.
    #[must_use]
    pub fn remap(&self, remap: &BitRemap) -> ContextSet {
        let mut out = ContextSet::new();
        for bit in self.iter() {
            out.set(remap.target(bit));
        }
        out
    }
}

/// Bit-position rewrite table produced when two context stores are reconciled
#[derive(Debug, Clone, Default)]
pub struct BitRemap {
    map: HashMap<usize, usize>,
}

impl BitRemap {
    /// Record that an incoming bit moves to a new position
    pub fn insert(&mut self, from: usize, to: usize) {
        let _ = self.map.insert(from, to);
    }

    /// Where an incoming bit lands (unmapped bits stay in place)
    #[must_use]
    pub fn target(&self, from: usize) -> usize {
        self.map.get(&from).copied().unwrap_or(from)
    }

    /// Whether every mapped bit keeps its position
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.map.iter().all(|(from, to)| from == to)
    }
}

/// Name-to-bit-index table for the contexts known to one registry or update
///
/// Bits are assigned in registration order. Two stores that registered the
/// same names in different orders disagree on positions; [`ContextStore::merge`]
/// reconciles them by name and yields the [`BitRemap`] that rewrites the
/// incoming side's context sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextStore {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

/// Built-in context for assertion statements
pub const CTX_ASSERT: &str = "assert";
/// Built-in context for logging statements
pub const CTX_LOG: &str = "log";

impl ContextStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-registered with the built-in contexts
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut store = Self::new();
        let _ = store.register(CTX_ASSERT);
        let _ = store.register(CTX_LOG);
        store
    }

    /// Register a context name, returning its bit position
    ///
    /// Registering an existing name returns its current position.
    pub fn register(&mut self, name: &str) -> usize {
        if let Some(bit) = self.index.get(name) {
            return *bit;
        }
        let bit = self.names.len();
        self.names.push(name.to_string());
        let _ = self.index.insert(name.to_string(), bit);
        bit
    }

    /// Bit position of a context name, if registered
    #[must_use]
    pub fn bit_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Context name at a bit position, if any
    #[must_use]
    pub fn name_of(&self, bit: usize) -> Option<&str> {
        self.names.get(bit).map(String::as_str)
    }

    /// Number of registered contexts
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether no contexts are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Iterate over registered names in bit order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Build a context set from names registered in this store
    pub fn set_for<'a, I>(&self, names: I) -> RegistryResult<ContextSet>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut set = ContextSet::new();
        for name in names {
            let bit = self.bit_of(name).ok_or_else(|| RegistryError::UnknownContext {
                name: name.to_string(),
            })?;
            set.set(bit);
        }
        Ok(set)
    }

    /// Merge another store into this one, reconciling by name
    ///
    /// Names already present keep their bits; new names are appended. The
    /// returned remap translates `other`'s bit positions into the merged
    /// store's positions.
    #[must_use]
    pub fn merge(&self, other: &ContextStore) -> (ContextStore, BitRemap) {
        let mut merged = self.clone();
        let mut remap = BitRemap::default();
        for (bit, name) in other.names.iter().enumerate() {
            let target = merged.register(name);
            remap.insert(bit, target);
        }
        (merged, remap)
    }
}

/// A named custom context, optionally backed by a match pattern
///
/// The instrumentation pass applies pattern-backed definitions to source text
/// (a statement, a method signature) to decide which statements carry the
/// context bit. Definitions without a pattern are tagged explicitly.
#[derive(Debug, Clone)]
pub struct ContextDef {
    name: String,
    pattern: Option<Regex>,
}

impl ContextDef {
    /// A definition with no pattern (tagged explicitly by the caller)
    #[must_use]
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            pattern: None,
        }
    }

    /// A definition whose statements are recognized by a regex
    pub fn with_pattern(name: &str, pattern: &str) -> RegistryResult<Self> {
        let compiled = Regex::new(pattern).map_err(|e| RegistryError::InvalidContextPattern {
            name: name.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            name: name.to_string(),
            pattern: Some(compiled),
        })
    }

    /// The context name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this definition recognizes the given source text
    ///
    /// Pattern-less definitions match nothing automatically.
    #[must_use]
    pub fn matches(&self, text: &str) -> bool {
        self.pattern.as_ref().is_some_and(|p| p.is_match(text))
    }
}

/// Active exclusion mask applied during metrics computation
///
/// An entity is excluded when its context set is non-empty and every one of
/// its bits is in the excluded mask. Partial overlap keeps the entity
/// counted; children of an excluded entity are still visited.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextFilter {
    excluded: ContextSet,
}

impl ContextFilter {
    /// A filter that excludes nothing
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// A filter excluding the given context set
    #[must_use]
    pub fn excluding(excluded: ContextSet) -> Self {
        Self { excluded }
    }

    /// Add one context bit to the exclusion mask
    pub fn exclude(&mut self, bit: usize) {
        self.excluded.set(bit);
    }

    /// Whether an entity with the given contexts is fully excluded
    #[must_use]
    pub fn excludes_entity(&self, contexts: &ContextSet) -> bool {
        !contexts.is_empty() && self.excluded.contains_all(contexts)
    }

    /// The exclusion mask
    #[must_use]
    pub fn excluded(&self) -> &ContextSet {
        &self.excluded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_roundtrip() {
        let mut set = ContextSet::new();
        set.set(0);
        set.set(63);
        set.set(64);
        set.set(130);
        assert!(set.get(0));
        assert!(set.get(63));
        assert!(set.get(64));
        assert!(set.get(130));
        assert!(!set.get(1));
        assert!(!set.get(129));
        assert_eq!(set.count(), 4);
    }

    #[test]
    fn test_clear_bit() {
        let mut set = ContextSet::single(5);
        set.clear(5);
        assert!(set.is_empty());
    }

    #[test]
    fn test_next_set_bit_walks_words() {
        let mut set = ContextSet::new();
        set.set(3);
        set.set(70);
        assert_eq!(set.next_set_bit(0), Some(3));
        assert_eq!(set.next_set_bit(4), Some(70));
        assert_eq!(set.next_set_bit(71), None);
    }

    #[test]
    fn test_iter_yields_all_bits() {
        let mut set = ContextSet::new();
        set.set(1);
        set.set(64);
        set.set(65);
        let bits: Vec<usize> = set.iter().collect();
        assert_eq!(bits, vec![1, 64, 65]);
    }

    #[test]
    fn test_intersects_and_bitwise_and() {
        let mut a = ContextSet::single(3);
        a.set(70);
        let b = ContextSet::single(70);
        let c = ContextSet::single(4);

        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        let both = a.and(&b);
        assert!(both.get(70));
        assert!(!both.get(3));
        assert_eq!(both.count(), 1);
    }

    #[test]
    fn test_contains_all_ignores_trailing_zero_words() {
        let small = ContextSet::single(2);
        let mut big = ContextSet::single(2);
        big.set(200);
        big.clear(200); // big now has trailing empty words
        assert!(small.contains_all(&big));
        assert!(big.contains_all(&small));
    }

    #[test]
    fn test_store_merge_reconciles_by_name() {
        let mut a = ContextStore::new();
        let _ = a.register("log");
        let _ = a.register("assert");

        let mut b = ContextStore::new();
        let _ = b.register("assert"); // bit 0 in b, bit 1 in a
        let _ = b.register("deprecated"); // new name

        let (merged, remap) = a.merge(&b);
        assert_eq!(merged.bit_of("log"), Some(0));
        assert_eq!(merged.bit_of("assert"), Some(1));
        assert_eq!(merged.bit_of("deprecated"), Some(2));
        assert_eq!(merged.name_of(2), Some("deprecated"));
        assert_eq!(remap.target(0), 1);
        assert_eq!(remap.target(1), 2);
        assert!(!remap.is_identity());

        let b_set = ContextSet::single(0); // "assert" in b's numbering
        let remapped = b_set.remap(&remap);
        assert!(remapped.get(1));
        assert!(!remapped.get(0));
    }

    #[test]
    fn test_filter_requires_full_exclusion() {
        let mut filter = ContextFilter::none();
        filter.exclude(0);

        let only_log = ContextSet::single(0);
        let mut log_and_assert = ContextSet::single(0);
        log_and_assert.set(1);

        assert!(filter.excludes_entity(&only_log));
        assert!(!filter.excludes_entity(&log_and_assert)); // partial overlap
        assert!(!filter.excludes_entity(&ContextSet::new())); // no contexts
    }

    #[test]
    fn test_context_def_pattern() {
        let def = ContextDef::with_pattern("log", r"^\s*(log|trace|debug)\b").unwrap();
        assert!(def.matches("log::info!(\"hi\")"));
        assert!(!def.matches("let x = 1;"));
        assert!(!ContextDef::named("manual").matches("anything"));
    }

    #[test]
    fn test_invalid_pattern_is_an_error() {
        let err = ContextDef::with_pattern("bad", "(unclosed").unwrap_err();
        assert!(err.to_string().contains("bad"));
    }

    #[test]
    fn test_set_for_unknown_name() {
        let store = ContextStore::with_defaults();
        assert!(store.set_for(["assert"]).is_ok());
        assert!(store.set_for(["nope"]).is_err());
    }
}
