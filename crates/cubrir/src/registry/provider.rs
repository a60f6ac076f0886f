//! Coverage Data Providers
//!
//! Pluggable mappings from slot index to recorded data. The registry never
//! owns the recording side: a provider is attached per query and only ever
//! read through. Aggregate recording yields hit counts; per-test recording
//! yields presence bits keyed by test identity, from which unique-coverage
//! providers are derived by set difference.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::entity::SlotRange;

/// Read-only mapping from slot index to recorded coverage data
pub trait CoverageDataProvider: Send + Sync {
    /// Number of recorded hits for the slot
    fn hit_count(&self, slot: usize) -> u64;

    /// Whether the slot was hit at all
    fn is_hit(&self, slot: usize) -> bool {
        self.hit_count(slot) > 0
    }
}

/// Aggregate hit-count array covering the whole registry
#[derive(Debug, Clone)]
pub struct AggregateProvider {
    counts: Arc<[u64]>,
}

impl AggregateProvider {
    /// Wrap a recorded hit-count array
    #[must_use]
    pub fn new(counts: Vec<u64>) -> Self {
        Self {
            counts: counts.into(),
        }
    }

    /// Number of slots the array covers
    #[must_use]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Whether the array is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

impl CoverageDataProvider for AggregateProvider {
    fn hit_count(&self, slot: usize) -> u64 {
        self.counts.get(slot).copied().unwrap_or(0)
    }
}

/// Presence bit vector over slot indices (per-test recording)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotBitSet {
    words: Vec<u64>,
}

impl SlotBitSet {
    /// An empty bit set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty bit set sized for the given slot count
    #[must_use]
    pub fn with_capacity(slots: usize) -> Self {
        Self {
            words: vec![0; slots.div_ceil(64)],
        }
    }

    /// Mark a slot as hit
    pub fn set(&mut self, slot: usize) {
        let word = slot / 64;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1 << (slot % 64);
    }

    /// Whether a slot was hit
    #[must_use]
    pub fn get(&self, slot: usize) -> bool {
        self.words
            .get(slot / 64)
            .is_some_and(|w| w & (1 << (slot % 64)) != 0)
    }

    /// Number of hit slots
    #[must_use]
    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Whether no slot was hit
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    /// OR another set into this one
    pub fn union_with(&mut self, other: &SlotBitSet) {
        if other.words.len() > self.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (a, b) in self.words.iter_mut().zip(other.words.iter()) {
            *a |= b;
        }
    }

    /// Bits set in `self` but not in `other`
    #[must_use]
    pub fn difference(&self, other: &SlotBitSet) -> SlotBitSet {
        let words = self
            .words
            .iter()
            .enumerate()
            .map(|(i, a)| a & !other.words.get(i).copied().unwrap_or(0))
            .collect();
        SlotBitSet { words }
    }

    /// Whether any hit slot falls inside the range
    #[must_use]
    pub fn intersects_range(&self, range: SlotRange) -> bool {
        range.iter().any(|slot| self.get(slot))
    }
}

/// Provider view over a presence bit vector
#[derive(Debug, Clone)]
pub struct BitSetProvider {
    bits: SlotBitSet,
}

impl BitSetProvider {
    /// Wrap a recorded bit set
    #[must_use]
    pub fn new(bits: SlotBitSet) -> Self {
        Self { bits }
    }

    /// The underlying bit set
    #[must_use]
    pub fn bits(&self) -> &SlotBitSet {
        &self.bits
    }
}

impl CoverageDataProvider for BitSetProvider {
    fn hit_count(&self, slot: usize) -> u64 {
        u64::from(self.bits.get(slot))
    }
}

/// Provider with no data behind it
///
/// Queries against a registry with nothing attached read through this:
/// everything is 0% covered, never an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProvider;

impl CoverageDataProvider for NullProvider {
    fn hit_count(&self, _slot: usize) -> u64 {
        0
    }
}

/// Identity of one recorded test execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TestId(Uuid);

impl TestId {
    /// A fresh random identity
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// The inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TestId {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of a recorded test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestOutcome {
    /// The test passed
    Passed,
    /// The test failed
    Failed,
}

/// Static description of one test execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCaseInfo {
    id: TestId,
    name: String,
    outcome: TestOutcome,
    duration_ms: u64,
}

impl TestCaseInfo {
    /// Describe a test execution
    #[must_use]
    pub fn new(id: TestId, name: &str, outcome: TestOutcome, duration_ms: u64) -> Self {
        Self {
            id,
            name: name.to_string(),
            outcome,
            duration_ms,
        }
    }

    /// Test identity
    #[inline]
    #[must_use]
    pub fn id(&self) -> TestId {
        self.id
    }

    /// Test name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Recorded outcome
    #[inline]
    #[must_use]
    pub fn outcome(&self) -> TestOutcome {
        self.outcome
    }

    /// Whether the test passed
    #[inline]
    #[must_use]
    pub fn passed(&self) -> bool {
        self.outcome == TestOutcome::Passed
    }

    /// Wall-clock duration in milliseconds
    #[inline]
    #[must_use]
    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }
}

/// Pass/fail/timing rollup for the tests touching a slot range
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeTestStats {
    /// Tests that hit at least one slot in the range
    pub tests_run: u32,
    /// Of those, how many passed
    pub tests_passed: u32,
    /// Of those, how many failed
    pub tests_failed: u32,
    /// Summed duration of the touching tests, in milliseconds
    pub test_time_ms: u64,
}

/// Per-test coverage recording keyed by test identity
///
/// The test-execution recorder feeds one entry per test: the static test
/// description plus the bit vector of slots that test hit. From the whole
/// collection the recorder derives aggregate, single-test, and
/// unique-coverage providers, all valid against the same slot numbering.
#[derive(Debug, Clone, Default)]
pub struct PerTestRecorder {
    tests: Vec<(TestCaseInfo, SlotBitSet)>,
}

impl PerTestRecorder {
    /// An empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one test's coverage
    ///
    /// Re-recording the same identity replaces the earlier entry.
    pub fn record(&mut self, info: TestCaseInfo, bits: SlotBitSet) {
        if let Some(entry) = self.tests.iter_mut().find(|(t, _)| t.id() == info.id()) {
            *entry = (info, bits);
        } else {
            self.tests.push((info, bits));
        }
    }

    /// Number of recorded tests
    #[must_use]
    pub fn len(&self) -> usize {
        self.tests.len()
    }

    /// Whether nothing was recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    /// Iterate over recorded test descriptions in recording order
    pub fn tests(&self) -> impl Iterator<Item = &TestCaseInfo> {
        self.tests.iter().map(|(t, _)| t)
    }

    /// The bit vector recorded for one test
    #[must_use]
    pub fn coverage_of(&self, id: TestId) -> Option<&SlotBitSet> {
        self.tests
            .iter()
            .find(|(t, _)| t.id() == id)
            .map(|(_, bits)| bits)
    }

    /// Union of every test's bits — the aggregate view
    #[must_use]
    pub fn aggregate_provider(&self) -> BitSetProvider {
        let mut union = SlotBitSet::new();
        for (_, bits) in &self.tests {
            union.union_with(bits);
        }
        BitSetProvider::new(union)
    }

    /// Provider over a single test's bits
    #[must_use]
    pub fn test_provider(&self, id: TestId) -> Option<BitSetProvider> {
        self.coverage_of(id).map(|bits| BitSetProvider::new(bits.clone()))
    }

    /// Provider over what `id` alone covers and no other test does
    ///
    /// The test's bits minus the union of every other test's bits. Running
    /// the standard metrics fold against this provider answers "what would
    /// go uncovered if this test disappeared".
    #[must_use]
    pub fn unique_provider(&self, id: TestId) -> Option<BitSetProvider> {
        let own = self.coverage_of(id)?;
        let mut others = SlotBitSet::new();
        for (t, bits) in &self.tests {
            if t.id() != id {
                others.union_with(bits);
            }
        }
        Some(BitSetProvider::new(own.difference(&others)))
    }

    /// Test descriptions whose coverage touches the range
    #[must_use]
    pub fn tests_touching(&self, range: SlotRange) -> Vec<&TestCaseInfo> {
        self.tests
            .iter()
            .filter(|(_, bits)| bits.intersects_range(range))
            .map(|(t, _)| t)
            .collect()
    }

    /// Pass/fail/timing rollup for the tests touching the range
    #[must_use]
    pub fn stats_for(&self, range: SlotRange) -> RangeTestStats {
        let mut stats = RangeTestStats::default();
        for test in self.tests_touching(range) {
            stats.tests_run += 1;
            if test.passed() {
                stats.tests_passed += 1;
            } else {
                stats.tests_failed += 1;
            }
            stats.test_time_ms += test.duration_ms();
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_out_of_range_is_zero() {
        let provider = AggregateProvider::new(vec![3, 0, 1]);
        assert_eq!(provider.hit_count(0), 3);
        assert!(!provider.is_hit(1));
        assert!(provider.is_hit(2));
        assert_eq!(provider.hit_count(99), 0);
    }

    #[test]
    fn test_null_provider_everything_uncovered() {
        let provider = NullProvider;
        assert!(!provider.is_hit(0));
        assert_eq!(provider.hit_count(123), 0);
    }

    #[test]
    fn test_bitset_difference() {
        let mut a = SlotBitSet::new();
        a.set(1);
        a.set(70);
        let mut b = SlotBitSet::new();
        b.set(70);
        let diff = a.difference(&b);
        assert!(diff.get(1));
        assert!(!diff.get(70));
        assert_eq!(diff.count_ones(), 1);
    }

    #[test]
    fn test_recorder_unique_coverage() {
        let mut recorder = PerTestRecorder::new();
        let t1 = TestId::new();
        let t2 = TestId::new();

        let mut b1 = SlotBitSet::new();
        b1.set(0);
        b1.set(1);
        recorder.record(
            TestCaseInfo::new(t1, "alpha", TestOutcome::Passed, 12),
            b1,
        );

        let mut b2 = SlotBitSet::new();
        b2.set(1);
        b2.set(2);
        recorder.record(
            TestCaseInfo::new(t2, "beta", TestOutcome::Failed, 30),
            b2,
        );

        let unique = recorder.unique_provider(t1).unwrap();
        assert!(unique.is_hit(0)); // only alpha
        assert!(!unique.is_hit(1)); // shared
        assert!(!unique.is_hit(2)); // only beta

        let aggregate = recorder.aggregate_provider();
        assert!(aggregate.is_hit(0));
        assert!(aggregate.is_hit(1));
        assert!(aggregate.is_hit(2));
    }

    #[test]
    fn test_recorder_stats_for_range() {
        let mut recorder = PerTestRecorder::new();
        let mut bits = SlotBitSet::new();
        bits.set(4);
        recorder.record(
            TestCaseInfo::new(TestId::new(), "hits", TestOutcome::Passed, 5),
            bits,
        );
        let mut far = SlotBitSet::new();
        far.set(90);
        recorder.record(
            TestCaseInfo::new(TestId::new(), "misses", TestOutcome::Failed, 7),
            far,
        );

        let stats = recorder.stats_for(SlotRange::new(0, 10));
        assert_eq!(stats.tests_run, 1);
        assert_eq!(stats.tests_passed, 1);
        assert_eq!(stats.tests_failed, 0);
        assert_eq!(stats.test_time_ms, 5);
    }

    #[test]
    fn test_rerecording_replaces_entry() {
        let mut recorder = PerTestRecorder::new();
        let id = TestId::new();
        let mut first = SlotBitSet::new();
        first.set(0);
        recorder.record(
            TestCaseInfo::new(id, "flaky", TestOutcome::Failed, 10),
            first,
        );
        let mut second = SlotBitSet::new();
        second.set(1);
        recorder.record(
            TestCaseInfo::new(id, "flaky", TestOutcome::Passed, 8),
            second,
        );

        assert_eq!(recorder.len(), 1);
        let bits = recorder.coverage_of(id).unwrap();
        assert!(!bits.get(0));
        assert!(bits.get(1));
    }
}
