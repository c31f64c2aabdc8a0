//! Sequence hashing.

use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;

use crate::sequence::{Sequence, SequenceHash};

/// Computes a stable identifier for a sequence.
///
/// Implementations only need to be stable and collision-resistant enough for the
/// workload; nothing in the engine depends on a specific algorithm.
pub trait SequenceHasher {
    /// Hashes the given sequence.
    fn hash(&self, seq: &Sequence) -> SequenceHash;
}

/// Default [`SequenceHasher`], built on the same `rustc-hash` crate already used for
/// the engine's internal maps.
///
/// This is a replaceable stand-in, not a contractual hash algorithm: hosts that need
/// cryptographic collision resistance should supply their own implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultSequenceHasher;

impl SequenceHasher for DefaultSequenceHasher {
    fn hash(&self, seq: &Sequence) -> SequenceHash {
        let mut hasher = FxHasher::default();
        for point in seq.iter() {
            for coordinate in point {
                coordinate.to_bits().hash(&mut hasher);
            }
            // Separator so `[[1.0], [2.0]]` and `[[1.0, 2.0]]` don't collide.
            0u64.hash(&mut hasher);
        }
        SequenceHash::new(format!("{:016x}", hasher.finish()))
    }
}
