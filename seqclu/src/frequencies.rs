//! Per-cluster prototype vote counts and their redistribution when a prototype is
//! replaced.

use rustc_hash::FxHashMap;

use crate::sequence::SequenceHash;

/// Tracks how many sequences have been assigned (by minimum distance) to each of a
/// cluster's current prototypes.
///
/// Votes drive [`crate::cluster::ClusterState::representativeness`] via `weight` and
/// are carried forward, in fractional form, when a prototype is swapped out for a new
/// one (see [`FrequencyStore::remove_and_redistribute`]).
#[derive(Debug, Default, Clone)]
pub struct FrequencyStore {
    votes: FxHashMap<SequenceHash, u64>,
}

impl FrequencyStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a freshly added prototype with an explicit vote count (used when a
    /// prototype enters the store already carrying redistributed votes).
    pub fn initialize(&mut self, hash: SequenceHash, votes: u64) {
        self.votes.insert(hash, votes);
    }

    /// Records that `hash` was the nearest prototype for an incoming sequence,
    /// initializing its count to one vote the first time it is observed.
    pub fn closest_prototype_observed(&mut self, hash: &SequenceHash) {
        *self.votes.entry(hash.clone()).or_insert(0) += 1;
    }

    /// Total votes across every tracked prototype.
    pub fn total(&self) -> u64 {
        self.votes.values().sum()
    }

    /// This prototype's share of the total vote, or `0.0` if no votes have been cast
    /// yet for the cluster.
    pub fn weight(&self, hash: &SequenceHash) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.votes.get(hash).copied().unwrap_or(0) as f64 / total as f64
    }

    /// Removes `removed`'s votes and redistributes them across `new_hashes`, weighted
    /// by how *far* each new prototype is from the removed one (a new prototype
    /// distant from the one it replaces is assumed to serve a different part of the
    /// cluster and inherits a larger share of the removed prototype's votes).
    ///
    /// `distance` computes the pairwise distance between two hashes; it is expected to
    /// be backed by the cluster's [`crate::distance::DistanceOracle`] so repeated calls
    /// here are cache hits. Vote shares are floor-truncated to integers; the resulting
    /// truncation residue is discarded rather than redistributed again, which is an
    /// intentional, documented bias rather than a bug.
    #[tracing::instrument(level = "trace", skip(self, distance), fields(removed = %removed))]
    pub fn remove_and_redistribute(
        &mut self,
        removed: &SequenceHash,
        new_hashes: &[SequenceHash],
        mut distance: impl FnMut(&SequenceHash, &SequenceHash) -> f64,
    ) {
        let votes = self.votes.remove(removed).unwrap_or(0);
        if votes == 0 || new_hashes.is_empty() {
            return;
        }

        if new_hashes.len() == 1 {
            self.initialize(new_hashes[0].clone(), votes);
            return;
        }

        let sum_of_distances: f64 = new_hashes
            .iter()
            .flat_map(|a| new_hashes.iter().map(move |b| (a, b)))
            .filter(|(a, b)| a != b)
            .map(|(a, b)| distance(a, b))
            .sum();

        if sum_of_distances == 0.0 {
            // Every new prototype coincides; split the votes evenly.
            let share = votes / new_hashes.len() as u64;
            for hash in new_hashes {
                *self.votes.entry(hash.clone()).or_insert(0) += share;
            }
            return;
        }

        let raw: Vec<f64> = new_hashes
            .iter()
            .map(|n| 1.0 - distance(removed, n) / sum_of_distances)
            .collect();
        let raw_total: f64 = raw.iter().sum();

        for (hash, r) in new_hashes.iter().zip(raw.iter()) {
            let transferred = r / raw_total;
            let added = (transferred * votes as f64).floor() as u64;
            if added > 0 {
                *self.votes.entry(hash.clone()).or_insert(0) += added;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weight_is_zero_with_no_votes() {
        let store = FrequencyStore::new();
        assert_eq!(store.weight(&SequenceHash::new("a")), 0.0);
    }

    #[test]
    fn closest_prototype_observed_accumulates() {
        let mut store = FrequencyStore::new();
        let a = SequenceHash::new("a");
        store.closest_prototype_observed(&a);
        store.closest_prototype_observed(&a);
        assert_eq!(store.total(), 2);
        assert_eq!(store.weight(&a), 1.0);
    }

    #[test]
    fn redistribution_preserves_total_minus_truncation_residue() {
        let mut store = FrequencyStore::new();
        let removed = SequenceHash::new("removed");
        let (n0, n1, n2) = (
            SequenceHash::new("n0"),
            SequenceHash::new("n1"),
            SequenceHash::new("n2"),
        );
        store.initialize(removed.clone(), 10);
        store.initialize(n0.clone(), 1);
        store.initialize(n1.clone(), 1);
        store.initialize(n2.clone(), 1);

        let new_hashes = [n0.clone(), n1.clone(), n2.clone()];
        let dist = |a: &SequenceHash, b: &SequenceHash| -> f64 {
            match (a.as_str(), b.as_str()) {
                ("removed", "n0") | ("n0", "removed") => 1.0,
                ("removed", "n1") | ("n1", "removed") => 2.0,
                ("removed", "n2") | ("n2", "removed") => 3.0,
                _ => 1.0,
            }
        };
        store.remove_and_redistribute(&removed, &new_hashes, dist);

        assert!(!store.weight(&removed).is_nan());
        assert_eq!(store.weight(&removed), 0.0);
        let redistributed_total = store.total();
        // 3 pre-existing votes on n0..n2 plus at most 10 redistributed, minus residue.
        assert!(redistributed_total <= 13);
        assert!(redistributed_total > 3);
    }

    #[test]
    fn redistribution_to_a_single_new_prototype_transfers_all_votes() {
        let mut store = FrequencyStore::new();
        let removed = SequenceHash::new("removed");
        let only = SequenceHash::new("only");
        store.initialize(removed.clone(), 7);
        store.remove_and_redistribute(&removed, &[only.clone()], |_, _| 1.0);
        assert_eq!(store.weight(&only), 1.0);
        assert_eq!(store.total(), 7);
    }
}
