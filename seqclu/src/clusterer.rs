//! The orchestrator: assigns incoming sequences to clusters, buffers ambiguous ones,
//! and periodically re-selects each cluster's prototype set from its candidates.

use std::sync::Arc;

use itertools::Itertools;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::candidates::CandidateBuffer;
use crate::cluster::ClusterState;
use crate::config::Config;
use crate::distance::DistanceMeasure;
use crate::error::{Result, SeqCluError};
use crate::hashing::SequenceHasher;
use crate::outputs::RunOutputs;
use crate::sequence::{hash_order, ClusterId, Sequence, SequenceHash, Tick};
use crate::value::PrototypeValueHeuristic;

/// Owns the full set of clusters and the candidate buffer shared between them, and
/// implements the engine's core per-sequence and per-flush operations.
#[derive(Clone)]
pub struct Clusterer {
    config: Config,
    clusters: Vec<ClusterState>,
    buffer: CandidateBuffer,
    labels: FxHashMap<SequenceHash, ClusterId>,
    clustered_by_approximation: FxHashSet<SequenceHash>,
    /// Every hash that has ever entered the candidate buffer, kept even after it is
    /// flushed out — this is the "sequences that transited the buffer" run output,
    /// distinct from what the buffer currently holds.
    transited_buffer: FxHashSet<SequenceHash>,
    hasher: Arc<dyn SequenceHasher>,
    value_heuristic: Arc<dyn PrototypeValueHeuristic>,
    tick: Tick,
}

impl Clusterer {
    /// Builds a fresh clusterer with `config.k` empty clusters, all sharing `measure`.
    pub fn new(
        config: Config,
        measure: Arc<dyn DistanceMeasure>,
        hasher: Arc<dyn SequenceHasher>,
        value_heuristic: Arc<dyn PrototypeValueHeuristic>,
    ) -> Result<Self> {
        config.validate()?;
        let clusters = (0..config.k)
            .map(|i| {
                ClusterState::new(
                    ClusterId(i),
                    config.p,
                    config.r,
                    config.min_representativeness,
                    measure.clone(),
                )
            })
            .collect();
        Ok(Self {
            buffer: CandidateBuffer::new(config.buffer_capacity),
            config,
            clusters,
            labels: FxHashMap::default(),
            clustered_by_approximation: FxHashSet::default(),
            transited_buffer: FxHashSet::default(),
            hasher,
            value_heuristic,
            tick: Tick::INITIAL,
        })
    }

    /// The active configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The current tick.
    pub fn tick(&self) -> Tick {
        self.tick
    }

    /// Advances the tick counter. Called once per scheduler step.
    pub fn advance_tick(&mut self) {
        self.tick = self.tick.next();
    }

    /// Whether the candidate buffer is at capacity.
    pub fn buffer_full(&self) -> bool {
        self.buffer.full()
    }

    /// Whether `hash` is currently sitting in the candidate buffer (as opposed to
    /// [`RunOutputs::buffered_sequences`], which tracks every hash that *ever* did).
    pub fn is_buffered(&self, hash: &SequenceHash) -> bool {
        self.buffer.contains(hash)
    }

    /// Hashes a sequence using this clusterer's configured hasher.
    pub fn hash(&self, data: &Sequence) -> SequenceHash {
        self.hasher.hash(data)
    }

    fn first_uninitialized_cluster(&self) -> Option<usize> {
        self.clusters.iter().position(|c| !c.fully_initialized())
    }

    /// Whether `hash` is already a prototype of any cluster, not just the one a caller
    /// happens to be checking against.
    fn is_prototype_anywhere(&self, hash: &SequenceHash) -> bool {
        self.clusters.iter().any(|c| c.prototypes().contains(hash))
    }

    /// Ingests one sequence. A hash already labelled, already buffered, or already a
    /// prototype of some cluster is a duplicate and is silently skipped.
    #[tracing::instrument(level = "trace", skip(self, data), fields(hash = %hash))]
    pub fn process_sequence(&mut self, hash: SequenceHash, data: Sequence) -> Result<()> {
        if self.labels.contains_key(&hash) || self.buffer.contains(&hash) || self.is_prototype_anywhere(&hash) {
            tracing::trace!("duplicate sequence, skipping");
            return Ok(());
        }

        if let Some(idx) = self.first_uninitialized_cluster() {
            let representative = self.clusters[idx].prototypes().representatives().len() < self.config.r;
            self.clusters[idx].add_prototype(hash.clone(), data, representative, self.tick)?;
            self.labels.insert(hash, self.clusters[idx].id);
            return Ok(());
        }

        let evals = self.evaluate_clusters(&hash, &data, true);
        let candidate_for: FxHashSet<ClusterId> = evals
            .iter()
            .filter(|(_, _, candidacy, _)| {
                *candidacy && !self.is_prototype_anywhere(&hash) && !self.buffer.contains(&hash)
            })
            .map(|(id, _, _, _)| *id)
            .collect();

        if candidate_for.is_empty() {
            self.label_sequence(hash, data, &evals, self.config.approximate_cluster_assignment)?;
            return Ok(());
        }

        for cluster_id in &candidate_for {
            self.buffer
                .add(hash.clone(), data.clone(), *cluster_id, self.tick);
        }
        if self.config.buffering_enabled {
            self.transited_buffer.insert(hash);
        }
        if self.buffer.full() || !self.config.buffering_enabled {
            self.flush_buffer()?;
        }
        Ok(())
    }

    /// Computes `(cluster, distance, candidacy, is_approximation)` for every cluster.
    /// When `consider_candidacy` is set, this is `isCandidate`; otherwise it is plain
    /// `distanceToCluster` with candidacy left `false` (used by `flush_buffer`'s
    /// no-candidacy labelling pass over whatever the buffer has left over).
    fn evaluate_clusters(
        &mut self,
        hash: &SequenceHash,
        data: &Sequence,
        consider_candidacy: bool,
    ) -> Vec<(ClusterId, f64, bool, bool)> {
        let approximate_ok = self.config.approximate_cluster_assignment;
        (0..self.clusters.len())
            .map(|idx| {
                let id = self.clusters[idx].id;
                if consider_candidacy {
                    let (distance, candidacy, is_approx) =
                        self.clusters[idx].is_candidate(hash, data, approximate_ok);
                    (id, distance, candidacy, is_approx)
                } else {
                    let (distance, is_approx) =
                        self.clusters[idx].distance_to_cluster(hash, data, approximate_ok);
                    (id, distance, false, is_approx)
                }
            })
            .collect()
    }

    /// Picks the winning cluster from a set of `(cluster, distance, candidacy,
    /// is_approximation)` evaluations already computed for `hash`.
    ///
    /// When approximation is disabled, the winner is simply the minimum-distance
    /// cluster. Otherwise an ambiguity set is built around the best cluster: every
    /// other cluster whose distance is within `max(err_best, err_other)` of the best
    /// distance. A singleton ambiguity set is accepted on the strength of the error
    /// bound alone (flagged as approximated); a larger one is re-resolved by exact
    /// distance to just those clusters (not flagged). Ties are broken by ascending
    /// cluster id throughout.
    fn pick_winner(
        &mut self,
        hash: &SequenceHash,
        data: &Sequence,
        evals: &[(ClusterId, f64, bool, bool)],
        resolve_ambiguity: bool,
    ) -> (ClusterId, bool) {
        let mut sorted = evals.to_vec();
        sorted.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

        if !resolve_ambiguity {
            return (sorted[0].0, false);
        }

        let (best_id, best_distance, _, _) = sorted[0];
        let best_error = self.clusters[best_id.0].error_bound();
        let ambiguous: Vec<ClusterId> = sorted
            .iter()
            .filter(|(id, distance, _, _)| {
                let error = self.clusters[id.0].error_bound();
                (distance - best_distance).abs() <= best_error.max(error)
            })
            .map(|(id, _, _, _)| *id)
            .collect();

        if ambiguous.len() <= 1 {
            return (best_id, true);
        }

        let mut exact: Vec<(ClusterId, f64)> = ambiguous
            .iter()
            .map(|id| {
                let (distance, _) = self.clusters[id.0].distance_to_cluster(hash, data, false);
                (*id, distance)
            })
            .collect();
        exact.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        (exact[0].0, false)
    }

    fn label_sequence(
        &mut self,
        hash: SequenceHash,
        data: Sequence,
        evals: &[(ClusterId, f64, bool, bool)],
        resolve_ambiguity: bool,
    ) -> Result<()> {
        let (cluster_id, approximated) = self.pick_winner(&hash, &data, evals, resolve_ambiguity);
        self.labels.insert(hash.clone(), cluster_id);
        if approximated {
            self.clustered_by_approximation.insert(hash.clone());
        }
        self.clusters[cluster_id.0].process_sequence_indefinitely(&hash);
        tracing::trace!(
            hash = %hash,
            cluster = %cluster_id,
            approximated,
            "sequence labelled"
        );
        Ok(())
    }

    /// Labels a sequence with no candidacy or ambiguity handling: plain
    /// `distanceToCluster` per cluster, winner is the minimum distance. Used for
    /// whatever is still in the buffer once every cluster's candidates have been
    /// processed during a flush.
    fn label_sequence_plain(&mut self, hash: SequenceHash, data: Sequence) -> Result<()> {
        let evals = self.evaluate_clusters(&hash, &data, false);
        self.label_sequence(hash, data, &evals, false)
    }

    /// Re-selects every cluster's prototype set from its current prototypes plus
    /// whatever candidates were buffered for it, then labels and evicts every
    /// remaining buffered sequence.
    ///
    /// A removed prototype is labelled to the cluster that removed it, even if it is
    /// also a candidate for another cluster — preserved deliberately rather than
    /// cross-checked against other clusters' prototype sets.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn flush_buffer(&mut self) -> Result<()> {
        let mut promoted_this_flush = FxHashSet::default();
        for idx in 0..self.clusters.len() {
            self.process_candidates_for_cluster(idx, &mut promoted_this_flush)?;
        }

        for hash in self.buffer.hashes() {
            if let Some((data, _)) = self.buffer.remove(&hash) {
                self.label_sequence_plain(hash, data)?;
            }
        }
        tracing::info!(tick = %self.tick, "candidate buffer flushed");
        Ok(())
    }

    fn process_candidates_for_cluster(
        &mut self,
        idx: usize,
        promoted_this_flush: &mut FxHashSet<SequenceHash>,
    ) -> Result<()> {
        let cluster_id = self.clusters[idx].id;

        let old_hashes: FxHashSet<SequenceHash> = self.clusters[idx]
            .prototypes()
            .representatives()
            .keys()
            .chain(self.clusters[idx].prototypes().non_representatives().keys())
            .cloned()
            .collect();

        let mut pool: FxHashMap<SequenceHash, Sequence> = self.clusters[idx]
            .prototypes()
            .representatives()
            .iter()
            .chain(self.clusters[idx].prototypes().non_representatives().iter())
            .map(|(h, d)| (h.clone(), d.clone()))
            .collect();

        let candidate_hashes: Vec<SequenceHash> = self
            .buffer
            .iter()
            .filter(|(_, (_, clusters))| clusters.contains(&cluster_id))
            .map(|(h, (d, _))| {
                pool.insert(h.clone(), d.clone());
                h.clone()
            })
            .collect();

        // selectNewPrototypes only runs when this cluster actually has candidates
        // buffered for it; otherwise its prototype set is left untouched rather than
        // re-scored among only its existing incumbents.
        if candidate_hashes.is_empty() {
            return Ok(());
        }

        let scored: Vec<(SequenceHash, f64)> = pool
            .iter()
            .map(|(hash, data)| {
                let representativeness = self.clusters[idx].representativeness(hash, data);
                let weight = self.clusters[idx].weight(hash);
                (hash.clone(), self.value_heuristic.evaluate(representativeness, weight))
            })
            .sorted_by(|a, b| a.1.total_cmp(&b.1).then_with(|| hash_order(&a.0, &b.0)))
            .collect();

        let p = self.config.p;
        let r = self.config.r;
        let take = scored.len().min(p);
        let winners = &scored[scored.len() - take..];
        let split = winners.len().saturating_sub(r);
        let (non_rep_winners, rep_winners) = winners.split_at(split);

        for (hash, _) in rep_winners.iter().chain(non_rep_winners.iter()) {
            if candidate_hashes.contains(hash) && !promoted_this_flush.insert(hash.clone()) {
                return Err(SeqCluError::Invariant(format!(
                    "{hash} was selected as a prototype by more than one cluster in the same flush"
                )));
            }
        }

        let new_representatives: Vec<(SequenceHash, Sequence)> = rep_winners
            .iter()
            .map(|(h, _)| (h.clone(), pool[h].clone()))
            .collect();
        let new_non_representatives: Vec<(SequenceHash, Sequence)> = non_rep_winners
            .iter()
            .map(|(h, _)| (h.clone(), pool[h].clone()))
            .collect();

        let winner_set: FxHashSet<SequenceHash> = new_representatives
            .iter()
            .chain(new_non_representatives.iter())
            .map(|(h, _)| h.clone())
            .collect();

        for removed in old_hashes.difference(&winner_set) {
            self.labels.insert(removed.clone(), cluster_id);
        }

        self.clusters[idx].update_prototypes(new_representatives, new_non_representatives, self.tick)?;

        for hash in &candidate_hashes {
            if winner_set.contains(hash) {
                self.buffer.remove(hash);
                self.labels.insert(hash.clone(), cluster_id);
            }
        }

        Ok(())
    }

    /// Snapshots the current state of a completed or in-progress run.
    pub fn outputs(&self) -> RunOutputs {
        let prototypes_by_cluster = self
            .clusters
            .iter()
            .map(|c| {
                let hashes: FxHashSet<SequenceHash> = c
                    .prototypes()
                    .representatives()
                    .keys()
                    .chain(c.prototypes().non_representatives().keys())
                    .cloned()
                    .collect();
                (c.id, hashes)
            })
            .collect();
        RunOutputs {
            labels: self.labels.clone(),
            prototypes_by_cluster,
            clustered_by_approximation: self.clustered_by_approximation.clone(),
            buffered_sequences: self.transited_buffer.clone(),
        }
    }

    /// Computes outputs as they would look after a flush, without mutating this
    /// clusterer's actual state. Clones the full cluster and buffer state (cheap:
    /// sequence payloads are `Arc`-shared, not duplicated) and flushes the clone.
    pub fn peek_outputs_after_flush(&self) -> Result<RunOutputs> {
        let mut speculative = self.clone();
        speculative.flush_buffer()?;
        Ok(speculative.outputs())
    }
}
