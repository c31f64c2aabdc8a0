//! The bounded buffer of sequences that are ambiguous or insufficiently representative
//! to label immediately.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::sequence::{ClusterId, Sequence, SequenceHash, Tick};

/// Holds sequences awaiting a final assignment, together with the set of clusters each
/// one is a candidate for.
#[derive(Default, Clone)]
pub struct CandidateBuffer {
    entries: FxHashMap<SequenceHash, (Sequence, FxHashSet<ClusterId>)>,
    last_update: FxHashMap<SequenceHash, Tick>,
    capacity: usize,
}

impl CandidateBuffer {
    /// Creates an empty buffer with the given capacity. A capacity of `0` is legal and
    /// means every sequence is labelled immediately, never buffered.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: FxHashMap::default(),
            last_update: FxHashMap::default(),
            capacity,
        }
    }

    /// Number of sequences currently buffered.
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    /// Whether the buffer is at capacity.
    pub fn full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    /// Adds `hash` as a candidate for `cluster`, merging into an existing entry's
    /// candidacy set if the sequence is already buffered for a different cluster.
    pub fn add(&mut self, hash: SequenceHash, data: Sequence, cluster: ClusterId, tick: Tick) {
        self.entries
            .entry(hash.clone())
            .and_modify(|(_, clusters)| {
                clusters.insert(cluster);
            })
            .or_insert_with(|| {
                let mut clusters = FxHashSet::default();
                clusters.insert(cluster);
                (data, clusters)
            });
        self.last_update.insert(hash, tick);
    }

    /// Looks up a buffered entry by hash.
    pub fn get(&self, hash: &SequenceHash) -> Option<&(Sequence, FxHashSet<ClusterId>)> {
        self.entries.get(hash)
    }

    /// Whether `hash` is currently buffered.
    pub fn contains(&self, hash: &SequenceHash) -> bool {
        self.entries.contains_key(hash)
    }

    /// Tick at which `hash` was last added to or updated in the buffer.
    pub fn last_update(&self, hash: &SequenceHash) -> Option<Tick> {
        self.last_update.get(hash).copied()
    }

    /// Removes and returns a buffered entry, e.g. once it has been labelled.
    pub fn remove(&mut self, hash: &SequenceHash) -> Option<(Sequence, FxHashSet<ClusterId>)> {
        self.last_update.remove(hash);
        self.entries.remove(hash)
    }

    /// Iterates over every currently buffered entry.
    pub fn iter(&self) -> impl Iterator<Item = (&SequenceHash, &(Sequence, FxHashSet<ClusterId>))> {
        self.entries.iter()
    }

    /// Every hash currently buffered, snapshotted (used when the caller needs to
    /// mutate the buffer while iterating over what was in it).
    pub fn hashes(&self) -> Vec<SequenceHash> {
        self.entries.keys().cloned().collect()
    }
}
