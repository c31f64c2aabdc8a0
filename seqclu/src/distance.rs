//! Pairwise distance computation and memoization.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::sequence::{Sequence, SequenceHash};

/// A distance function between two sequences.
///
/// May be pure and stateless, or may carry its own internal bookkeeping (the original
/// implementation's DTW measure keeps an invocation counter); the engine never inspects
/// anything beyond the returned distance.
pub trait DistanceMeasure {
    /// Returns the distance between `a` and `b`. Expected, but not enforced by the
    /// oracle, to be symmetric and non-negative.
    fn distance(&self, a: &Sequence, b: &Sequence) -> f64;
}

/// Memoizes pairwise distances for one cluster's prototype set so that repeated
/// lookups of the same pair never re-invoke the underlying [`DistanceMeasure`].
///
/// The cache key is the pair of hashes sorted into a canonical order, so `(a, b)` and
/// `(b, a)` share a single entry — symmetry is structural, not merely expected.
#[derive(Clone)]
pub struct DistanceOracle {
    measure: Arc<dyn DistanceMeasure>,
    cache: FxHashMap<(SequenceHash, SequenceHash), f64>,
}

impl DistanceOracle {
    /// Builds an oracle around the given distance function. Takes an `Arc` rather than
    /// a `Box` because every cluster's oracle shares the same underlying measure.
    pub fn new(measure: Arc<dyn DistanceMeasure>) -> Self {
        Self {
            measure,
            cache: FxHashMap::default(),
        }
    }

    fn key(a: &SequenceHash, b: &SequenceHash) -> (SequenceHash, SequenceHash) {
        if a <= b {
            (a.clone(), b.clone())
        } else {
            (b.clone(), a.clone())
        }
    }

    /// Returns the distance between the two sequences, computing and caching it on
    /// first use. Equal hashes short-circuit to `0.0` without consulting the cache or
    /// the underlying measure.
    pub fn pairwise(
        &mut self,
        hash_a: &SequenceHash,
        seq_a: &Sequence,
        hash_b: &SequenceHash,
        seq_b: &Sequence,
    ) -> f64 {
        if hash_a == hash_b {
            return 0.0;
        }
        let key = Self::key(hash_a, hash_b);
        if let Some(&d) = self.cache.get(&key) {
            return d;
        }
        let d = self.measure.distance(seq_a, seq_b);
        self.cache.insert(key, d);
        d
    }

    /// Drops every cache entry that references `hash`. Required to bound memory when a
    /// sequence leaves a cluster's working set (prototype replacement, cluster reset).
    pub fn purge(&mut self, hash: &SequenceHash) {
        self.cache.retain(|(a, b), _| a != hash && b != hash);
    }

    /// Every already-memoized pair involving `hash`, yielded as the hash on the other
    /// end of the pair together with the cached distance. Used to pick the nearest
    /// prototype among only the distances already computed for a sequence, rather than
    /// invoking the measure again against every prototype.
    pub fn cached_peers<'a>(
        &'a self,
        hash: &'a SequenceHash,
    ) -> impl Iterator<Item = (&'a SequenceHash, f64)> + 'a {
        self.cache.iter().filter_map(move |((a, b), &d)| {
            if a == hash {
                Some((b, d))
            } else if b == hash {
                Some((a, d))
            } else {
                None
            }
        })
    }

    /// Number of memoized pairs currently held.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
