//! Per-cluster prototype storage: the representative/non-representative split that
//! grounds a cluster's identity.

use rustc_hash::FxHashMap;

use crate::error::{Result, SeqCluError};
use crate::sequence::{Sequence, SequenceHash, Tick};

/// Holds a cluster's `p` prototypes, split into `r` representatives and `p - r`
/// non-representatives.
///
/// A cluster is "fully initialized" once both halves are at capacity; until then,
/// [`PrototypeStore::add`] accepts single prototypes one at a time (mirroring how a
/// fresh cluster is seeded from the stream before candidacy processing begins).
/// Afterwards, prototypes only change via wholesale replacement through
/// [`PrototypeStore::update`].
#[derive(Clone)]
pub struct PrototypeStore {
    p: usize,
    r: usize,
    representatives: FxHashMap<SequenceHash, Sequence>,
    non_representatives: FxHashMap<SequenceHash, Sequence>,
    last_updated: FxHashMap<SequenceHash, Tick>,
}

impl PrototypeStore {
    /// Creates an empty store with the given capacities. `p` is the total prototype
    /// count, `r` the representative share; `0 < r < p` is a caller invariant
    /// (enforced upstream by [`crate::config::Config::validate`]).
    pub fn new(p: usize, r: usize) -> Self {
        Self {
            p,
            r,
            representatives: FxHashMap::default(),
            non_representatives: FxHashMap::default(),
            last_updated: FxHashMap::default(),
        }
    }

    /// Whether both halves are at capacity.
    pub fn fully_initialized(&self) -> bool {
        self.representatives.len() == self.r && self.non_representatives.len() == self.p - self.r
    }

    /// Total prototypes currently held.
    pub fn len(&self) -> usize {
        self.representatives.len() + self.non_representatives.len()
    }

    /// Whether no prototypes are held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Looks up a prototype's data by hash, whichever half it is in.
    pub fn get(&self, hash: &SequenceHash) -> Option<&Sequence> {
        self.representatives
            .get(hash)
            .or_else(|| self.non_representatives.get(hash))
    }

    /// Whether `hash` names a current prototype.
    pub fn contains(&self, hash: &SequenceHash) -> bool {
        self.representatives.contains_key(hash) || self.non_representatives.contains_key(hash)
    }

    /// The representative half.
    pub fn representatives(&self) -> &FxHashMap<SequenceHash, Sequence> {
        &self.representatives
    }

    /// The non-representative half.
    pub fn non_representatives(&self) -> &FxHashMap<SequenceHash, Sequence> {
        &self.non_representatives
    }

    /// Tick at which the given prototype last changed half or entered the store, or
    /// `None` if `hash` is not a current prototype.
    pub fn last_update(&self, hash: &SequenceHash) -> Option<Tick> {
        self.last_updated.get(hash).copied()
    }

    /// Adds a single prototype before the store is fully initialized, optionally
    /// replacing an existing one. Returns [`SeqCluError::Invariant`] if called once
    /// already full without a `replace` hash, if `replace` names a hash this store
    /// does not hold, or if the target half is already at capacity.
    #[tracing::instrument(level = "trace", skip(self, data), fields(hash = %hash))]
    pub fn add(
        &mut self,
        hash: SequenceHash,
        data: Sequence,
        representative: bool,
        replace: Option<&SequenceHash>,
        tick: Tick,
    ) -> Result<()> {
        let half = if representative {
            &mut self.representatives
        } else {
            &mut self.non_representatives
        };
        let capacity = if representative { self.r } else { self.p - self.r };

        if let Some(replace_hash) = replace {
            if !half.contains_key(replace_hash) {
                return Err(SeqCluError::Invariant(format!(
                    "cannot replace {replace_hash}: not a current prototype in this half"
                )));
            }
            half.remove(replace_hash);
            self.last_updated.remove(replace_hash);
        } else if half.len() >= capacity {
            return Err(SeqCluError::Invariant(
                "cannot add a prototype to a full half without a replacement".into(),
            ));
        }

        self.last_updated.insert(hash.clone(), tick);
        half.insert(hash, data);
        if self.fully_initialized() {
            tracing::info!("prototype store fully initialized");
        } else if self.representatives.len() == self.r {
            tracing::debug!("representative half fully initialized");
        }
        Ok(())
    }

    /// Wholesale replacement of both halves, used when candidacy processing selects a
    /// new prototype set for the cluster. `new_representatives` and
    /// `new_non_representatives` must together be disjoint and match this store's
    /// configured sizes (`r` and `p - r` respectively); any mismatch is an
    /// [`SeqCluError::Invariant`].
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn update(
        &mut self,
        new_representatives: FxHashMap<SequenceHash, Sequence>,
        new_non_representatives: FxHashMap<SequenceHash, Sequence>,
        tick: Tick,
    ) -> Result<()> {
        if new_representatives.len() != self.r {
            return Err(SeqCluError::Invariant(format!(
                "expected {} representatives, got {}",
                self.r,
                new_representatives.len()
            )));
        }
        if new_non_representatives.len() != self.p - self.r {
            return Err(SeqCluError::Invariant(format!(
                "expected {} non-representatives, got {}",
                self.p - self.r,
                new_non_representatives.len()
            )));
        }
        if new_representatives
            .keys()
            .any(|h| new_non_representatives.contains_key(h))
        {
            return Err(SeqCluError::Invariant(
                "representative and non-representative sets must be disjoint".into(),
            ));
        }
        let mut next_last_updated = FxHashMap::default();
        for hash in new_representatives.keys() {
            let kept_tick = self
                .representatives
                .contains_key(hash)
                .then(|| self.last_updated.get(hash).copied())
                .flatten();
            next_last_updated.insert(hash.clone(), kept_tick.unwrap_or(tick));
        }
        for hash in new_non_representatives.keys() {
            let kept_tick = self
                .non_representatives
                .contains_key(hash)
                .then(|| self.last_updated.get(hash).copied())
                .flatten();
            next_last_updated.insert(hash.clone(), kept_tick.unwrap_or(tick));
        }
        self.last_updated = next_last_updated;

        self.representatives = new_representatives;
        self.non_representatives = new_non_representatives;
        tracing::debug!(tick = %tick, "prototypes updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn seq(v: f64) -> Sequence {
        Arc::new(vec![vec![v]])
    }

    #[test]
    fn add_fills_both_halves_then_reports_fully_initialized() {
        let mut store = PrototypeStore::new(3, 1);
        store
            .add(SequenceHash::new("r0"), seq(0.0), true, None, Tick::INITIAL)
            .unwrap();
        assert!(!store.fully_initialized());
        store
            .add(SequenceHash::new("n0"), seq(1.0), false, None, Tick::INITIAL)
            .unwrap();
        store
            .add(SequenceHash::new("n1"), seq(2.0), false, None, Tick::INITIAL)
            .unwrap();
        assert!(store.fully_initialized());
    }

    #[test]
    fn add_without_replace_on_a_full_half_is_an_invariant_error() {
        let mut store = PrototypeStore::new(2, 1);
        store
            .add(SequenceHash::new("r0"), seq(0.0), true, None, Tick::INITIAL)
            .unwrap();
        let err = store.add(SequenceHash::new("r1"), seq(1.0), true, None, Tick::INITIAL);
        assert!(err.is_err());
    }

    #[test]
    fn update_rejects_wrong_sized_halves() {
        let mut store = PrototypeStore::new(3, 1);
        let mut reps = FxHashMap::default();
        reps.insert(SequenceHash::new("r0"), seq(0.0));
        reps.insert(SequenceHash::new("r1"), seq(1.0));
        let mut non_reps = FxHashMap::default();
        non_reps.insert(SequenceHash::new("n0"), seq(2.0));
        assert!(store.update(reps, non_reps, Tick::INITIAL).is_err());
    }

    #[test]
    fn update_rejects_overlapping_halves() {
        let mut store = PrototypeStore::new(2, 1);
        let shared = SequenceHash::new("shared");
        let mut reps = FxHashMap::default();
        reps.insert(shared.clone(), seq(0.0));
        let mut non_reps = FxHashMap::default();
        non_reps.insert(shared, seq(1.0));
        assert!(store.update(reps, non_reps, Tick::INITIAL).is_err());
    }

    #[test]
    fn update_replaces_wholesale() {
        let mut store = PrototypeStore::new(2, 1);
        let mut reps = FxHashMap::default();
        reps.insert(SequenceHash::new("r0"), seq(0.0));
        let mut non_reps = FxHashMap::default();
        non_reps.insert(SequenceHash::new("n0"), seq(1.0));
        store.update(reps, non_reps, Tick(5)).unwrap();
        assert!(store.contains(&SequenceHash::new("r0")));
        assert_eq!(store.last_update(&SequenceHash::new("r0")), Some(Tick(5)));

        let mut reps2 = FxHashMap::default();
        reps2.insert(SequenceHash::new("r0"), seq(0.0));
        let mut non_reps2 = FxHashMap::default();
        non_reps2.insert(SequenceHash::new("n1"), seq(3.0));
        store.update(reps2, non_reps2, Tick(6)).unwrap();
        assert!(store.contains(&SequenceHash::new("r0")));
        // r0 stayed a representative across the update, so its tick is unchanged.
        assert_eq!(store.last_update(&SequenceHash::new("r0")), Some(Tick(5)));
        assert_eq!(store.last_update(&SequenceHash::new("n1")), Some(Tick(6)));
    }

    #[test]
    fn update_refreshes_tick_when_a_prototype_switches_halves() {
        let mut store = PrototypeStore::new(2, 1);
        let mut reps = FxHashMap::default();
        reps.insert(SequenceHash::new("a"), seq(0.0));
        let mut non_reps = FxHashMap::default();
        non_reps.insert(SequenceHash::new("b"), seq(1.0));
        store.update(reps, non_reps, Tick(1)).unwrap();

        // "a" and "b" swap halves: both count as changing half, so both refresh.
        let mut reps2 = FxHashMap::default();
        reps2.insert(SequenceHash::new("b"), seq(1.0));
        let mut non_reps2 = FxHashMap::default();
        non_reps2.insert(SequenceHash::new("a"), seq(0.0));
        store.update(reps2, non_reps2, Tick(2)).unwrap();
        assert_eq!(store.last_update(&SequenceHash::new("a")), Some(Tick(2)));
        assert_eq!(store.last_update(&SequenceHash::new("b")), Some(Tick(2)));
    }
}
