//! A single cluster's prototypes, votes, distance cache, and the derived statistics
//! computed from them.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::distance::{DistanceMeasure, DistanceOracle};
use crate::error::Result;
use crate::frequencies::FrequencyStore;
use crate::prototypes::PrototypeStore;
use crate::sequence::{ClusterId, Sequence, SequenceHash, Tick};

/// Statistics derived from a cluster's current prototype set. Memoized as a unit:
/// any prototype change invalidates all of them together, since they are computed
/// from the same pass over the prototype set.
#[derive(Debug, Clone, Copy)]
struct DerivedStats {
    avg_sum_distances: f64,
    avg_distance: f64,
    avg_sum_rep_to_non_rep: f64,
    avg_dist_rep_to_non_rep: f64,
    avg_representativeness: f64,
    error: f64,
    upper_bound: f64,
}

/// Everything the engine tracks for one cluster.
#[derive(Clone)]
pub struct ClusterState {
    /// This cluster's identity.
    pub id: ClusterId,
    prototypes: PrototypeStore,
    frequencies: FrequencyStore,
    oracle: DistanceOracle,
    min_representativeness: f64,
    derived: Option<DerivedStats>,
    /// `sumsOfDistances[(hash, representatives_only)]`, cleared en bloc whenever
    /// `derived` is invalidated since both are functions of the current prototype set.
    sums_of_distances: FxHashMap<(SequenceHash, bool), f64>,
}

impl ClusterState {
    /// Creates a new, empty cluster.
    pub fn new(
        id: ClusterId,
        p: usize,
        r: usize,
        min_representativeness: f64,
        measure: Arc<dyn DistanceMeasure>,
    ) -> Self {
        Self {
            id,
            prototypes: PrototypeStore::new(p, r),
            frequencies: FrequencyStore::new(),
            oracle: DistanceOracle::new(measure),
            min_representativeness,
            derived: None,
            sums_of_distances: FxHashMap::default(),
        }
    }

    /// Whether this cluster's prototype set is at full capacity.
    pub fn fully_initialized(&self) -> bool {
        self.prototypes.fully_initialized()
    }

    /// The prototype store, for read access by the clusterer.
    pub fn prototypes(&self) -> &PrototypeStore {
        &self.prototypes
    }

    /// Adds a single prototype while the cluster is still being seeded.
    pub fn add_prototype(
        &mut self,
        hash: SequenceHash,
        data: Sequence,
        representative: bool,
        tick: Tick,
    ) -> Result<()> {
        self.prototypes.add(hash, data, representative, None, tick)?;
        self.derived = None;
        self.sums_of_distances.clear();
        Ok(())
    }

    /// Distance between two sequences, via this cluster's memoized oracle.
    pub fn pairwise_distance(
        &mut self,
        hash_a: &SequenceHash,
        seq_a: &Sequence,
        hash_b: &SequenceHash,
        seq_b: &Sequence,
    ) -> f64 {
        self.oracle.pairwise(hash_a, seq_a, hash_b, seq_b)
    }

    /// Sum of the distances from `(hash, data)` to every current prototype, or just the
    /// representative half when `representatives_only` is set. Memoized per
    /// `(hash, representatives_only)` pair and invalidated whenever the prototype set
    /// changes, since both the oracle lookups and the candidate set depend on it.
    pub fn sum_of_distances(
        &mut self,
        hash: &SequenceHash,
        data: &Sequence,
        representatives_only: bool,
    ) -> f64 {
        let memo_key = (hash.clone(), representatives_only);
        if let Some(&sum) = self.sums_of_distances.get(&memo_key) {
            return sum;
        }
        let prototypes: Vec<(SequenceHash, Sequence)> = if representatives_only {
            self.prototypes
                .representatives()
                .iter()
                .map(|(h, d)| (h.clone(), d.clone()))
                .collect()
        } else {
            self.prototypes
                .representatives()
                .iter()
                .chain(self.prototypes.non_representatives().iter())
                .map(|(h, d)| (h.clone(), d.clone()))
                .collect()
        };
        let sum: f64 = prototypes
            .iter()
            .map(|(h, d)| self.oracle.pairwise(hash, data, h, d))
            .sum();
        self.sums_of_distances.insert(memo_key, sum);
        sum
    }

    /// How representative `(hash, data)` is of this cluster: the ratio of the
    /// cluster's average pairwise prototype distance to twice this sequence's summed
    /// distance to every prototype. Higher means more central.
    pub fn representativeness(&mut self, hash: &SequenceHash, data: &Sequence) -> f64 {
        let avg_sum_distances = self.derived_stats().avg_sum_distances;
        let sum = self.sum_of_distances(hash, data, false);
        if sum == 0.0 {
            return 1.0;
        }
        avg_sum_distances / (2.0 * sum)
    }

    /// The error-bounded upper limit used for approximate distance-to-cluster
    /// comparisons (see [`crate::clusterer::Clusterer`]).
    pub fn upper_bound(&mut self) -> f64 {
        self.derived_stats().upper_bound
    }

    /// The cluster's average pairwise prototype distance.
    pub fn avg_distance(&mut self) -> f64 {
        self.derived_stats().avg_distance
    }

    /// The error term alone (the gap between `upper_bound` and `avg_distance`), used
    /// to decide whether two clusters are close enough to be ambiguous.
    pub fn error_bound(&mut self) -> f64 {
        self.derived_stats().error
    }

    /// This cluster's average representativeness across its representative
    /// prototypes, the gate used to decide whether the approximate (representative-
    /// only) distance path is trustworthy enough to use.
    pub fn avg_representativeness(&mut self) -> f64 {
        self.derived_stats().avg_representativeness
    }

    /// Distance from `(hash, data)` to this cluster: the average distance to the
    /// representative prototypes alone when `approximate_ok` is set and this cluster's
    /// average representativeness clears `min_representativeness`, otherwise the
    /// average distance to every prototype. Returns whether the approximate path was
    /// used alongside the distance.
    pub fn distance_to_cluster(
        &mut self,
        hash: &SequenceHash,
        data: &Sequence,
        approximate_ok: bool,
    ) -> (f64, bool) {
        if approximate_ok && self.avg_representativeness() >= self.min_representativeness {
            let r = self.prototypes.representatives().len().max(1);
            let sum = self.sum_of_distances(hash, data, true);
            (sum / r as f64, true)
        } else {
            let p = self.prototypes.len().max(1);
            let sum = self.sum_of_distances(hash, data, false);
            (sum / p as f64, false)
        }
    }

    /// Whether `(hash, data)` is a candidate for this cluster: its distance (via
    /// [`Self::distance_to_cluster`]) falls under `upper_bound` when the approximate
    /// path was used, or under `avg_distance` otherwise. Returns the distance and
    /// whether the approximate path was used alongside the candidacy verdict.
    pub fn is_candidate(
        &mut self,
        hash: &SequenceHash,
        data: &Sequence,
        approximate_ok: bool,
    ) -> (f64, bool, bool) {
        let (distance, is_approximation) = self.distance_to_cluster(hash, data, approximate_ok);
        let threshold = if is_approximation {
            self.upper_bound()
        } else {
            self.avg_distance()
        };
        (distance, distance < threshold, is_approximation)
    }

    /// This hash's share of the cluster's total vote, or `0.0` if untracked.
    pub fn weight(&self, hash: &SequenceHash) -> f64 {
        self.frequencies.weight(hash)
    }

    fn derived_stats(&mut self) -> DerivedStats {
        if let Some(stats) = self.derived {
            return stats;
        }
        let prototypes: Vec<(SequenceHash, Sequence, bool)> = self
            .prototypes
            .representatives()
            .iter()
            .map(|(h, d)| (h.clone(), d.clone(), true))
            .chain(
                self.prototypes
                    .non_representatives()
                    .iter()
                    .map(|(h, d)| (h.clone(), d.clone(), false)),
            )
            .collect();
        let p = prototypes.len().max(1);

        let representative_count = prototypes.iter().filter(|(_, _, rep)| *rep).count().max(1);
        let non_representative_count = (p - representative_count).max(1);

        // Sum of distances from each prototype to every other prototype.
        let per_prototype_sum: Vec<f64> = prototypes
            .iter()
            .map(|(hash, data, _)| {
                prototypes
                    .iter()
                    .filter(|(h, _, _)| h != hash)
                    .map(|(h, d, _)| self.oracle.pairwise(hash, data, h, d))
                    .sum()
            })
            .collect();

        let sum_distances_total: f64 = per_prototype_sum.iter().sum();
        let avg_sum_distances = sum_distances_total / p as f64;
        let avg_distance = if p > 1 {
            avg_sum_distances / (p - 1) as f64
        } else {
            0.0
        };

        let sum_rep_to_non_rep_total: f64 = prototypes
            .iter()
            .filter(|(_, _, rep)| *rep)
            .map(|(hash, data, _)| {
                prototypes
                    .iter()
                    .filter(|(_, _, rep)| !*rep)
                    .map(|(h, d, _)| self.oracle.pairwise(hash, data, h, d))
                    .sum::<f64>()
            })
            .sum();
        let avg_sum_rep_to_non_rep = sum_rep_to_non_rep_total / representative_count as f64;
        let avg_dist_rep_to_non_rep = avg_sum_rep_to_non_rep / non_representative_count as f64;

        let avg_representativeness = prototypes
            .iter()
            .zip(per_prototype_sum.iter())
            .filter(|((_, _, rep), _)| *rep)
            .map(|(_, &sum)| {
                if sum == 0.0 {
                    1.0
                } else {
                    avg_sum_distances / (2.0 * sum)
                }
            })
            .sum::<f64>()
            / representative_count as f64;

        let error = (1.0 - avg_representativeness) * avg_dist_rep_to_non_rep;
        let upper_bound = avg_distance + error;

        let stats = DerivedStats {
            avg_sum_distances,
            avg_distance,
            avg_sum_rep_to_non_rep,
            avg_dist_rep_to_non_rep,
            avg_representativeness,
            error,
            upper_bound,
        };
        self.derived = Some(stats);
        stats
    }

    /// Records that `hash` was assigned to this cluster: awards a vote to the nearest
    /// current prototype *among those already present in the distance cache* for
    /// `hash` (populated by the `distanceToCluster`/`isCandidate` calls that preceded
    /// this one), then purges any oracle cache entries referencing `hash` itself (it is
    /// not a prototype, so nothing should still reference it).
    ///
    /// Deliberately does not compute fresh distances against every prototype: when the
    /// approximate path was used, only representative distances were ever cached, so
    /// the vote must be restricted to that same cached set rather than silently
    /// widening to non-representatives the approximation never looked at.
    pub fn process_sequence_indefinitely(&mut self, hash: &SequenceHash) {
        let nearest = self
            .oracle
            .cached_peers(hash)
            .filter(|(other, _)| self.prototypes.contains(other))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(h, _)| h.clone());
        if let Some(nearest) = nearest {
            self.frequencies.closest_prototype_observed(&nearest);
        }
        self.oracle.purge(hash);
        self.sums_of_distances.retain(|(h, _), _| h != hash);
    }

    /// Replaces this cluster's prototype set wholesale. Redistributes the votes of
    /// every removed prototype across the incoming set before installing it, then
    /// invalidates every derived statistic.
    pub fn update_prototypes(
        &mut self,
        new_representatives: Vec<(SequenceHash, Sequence)>,
        new_non_representatives: Vec<(SequenceHash, Sequence)>,
        tick: Tick,
    ) -> Result<()> {
        let current: FxHashSet<SequenceHash> = self
            .prototypes
            .representatives()
            .keys()
            .chain(self.prototypes.non_representatives().keys())
            .cloned()
            .collect();
        let incoming: FxHashMap<SequenceHash, Sequence> = new_representatives
            .iter()
            .chain(new_non_representatives.iter())
            .cloned()
            .collect();
        let incoming_hashes: Vec<SequenceHash> = incoming.keys().cloned().collect();
        let incoming_key_set: FxHashSet<SequenceHash> = incoming_hashes.iter().cloned().collect();
        let removed: Vec<SequenceHash> = current.difference(&incoming_key_set).cloned().collect();

        let oracle = &mut self.oracle;
        let frequencies = &mut self.frequencies;
        for removed_hash in &removed {
            frequencies.remove_and_redistribute(removed_hash, &incoming_hashes, |a, b| {
                let sa = incoming.get(a).expect("new prototype hash must resolve");
                let sb = incoming.get(b).expect("new prototype hash must resolve");
                oracle.pairwise(a, sa, b, sb)
            });
            oracle.purge(removed_hash);
        }

        self.prototypes.update(
            new_representatives.into_iter().collect(),
            new_non_representatives.into_iter().collect(),
            tick,
        )?;
        self.derived = None;
        self.sums_of_distances.clear();
        tracing::debug!(cluster = %self.id, removed = removed.len(), "prototypes replaced");
        Ok(())
    }
}
