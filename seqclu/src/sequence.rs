//! Core value types: sequences, their hashes, ticks, and cluster identifiers.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A sequence of `d`-dimensional points. Cheaply cloned: the same payload is shared
/// between the stream, the candidate buffer, and (once promoted) a prototype store.
pub type Sequence = Arc<Vec<Vec<f64>>>;

/// Stable identifier for a sequence, produced by a [`crate::hashing::SequenceHasher`].
///
/// Ordered lexicographically by its underlying bytes so that value ties (e.g. between
/// two clusters at equal distance) can be broken deterministically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SequenceHash(Arc<str>);

// Serialized as a plain string rather than deriving through `Arc<str>`, so reading
// `rc`-feature support into `serde` isn't needed for what is otherwise the crate's only
// `Arc`-backed serializable field.
impl Serialize for SequenceHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for SequenceHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(SequenceHash::new)
    }
}

impl SequenceHash {
    /// Wraps an already-computed hash string.
    pub fn new(digest: impl Into<Arc<str>>) -> Self {
        Self(digest.into())
    }

    /// Borrows the underlying digest string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SequenceHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Monotonic tick counter, incremented once per batch pulled from the stream.
///
/// Backed by `u64` rather than a signed integer, so pre-initialization state (the
/// original implementation's `tick = -1` sentinel) is represented with `Option<Tick>`
/// at call sites instead of a negative tick value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tick(pub u64);

impl Tick {
    /// The tick used for the very first batch pulled from the stream.
    pub const INITIAL: Tick = Tick(0);

    /// Returns the next tick.
    pub fn next(self) -> Tick {
        Tick(self.0 + 1)
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies one of the `K` clusters the engine maintains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClusterId(pub usize);

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A reference to a sequence that may be known only by hash, only by its data, or by
/// both. Call sites that only have a hash (e.g. a prototype already stored elsewhere)
/// resolve through a lookup table; call sites fed directly from the stream carry both.
///
/// Generalizes the Python source's `(Optional[hash], Optional[data])` tuple threading
/// into a single owned value with an explicit resolution step.
#[derive(Debug, Clone)]
pub enum SeqRef {
    /// Only the hash is known; the data must be looked up.
    ByHash(SequenceHash),
    /// Only the data is known; the hash has not been computed yet.
    ByData(Sequence),
    /// Both are already known, so no lookup or hashing is needed.
    Both(SequenceHash, Sequence),
}

impl SeqRef {
    /// The hash, if already known without a lookup.
    pub fn hash(&self) -> Option<&SequenceHash> {
        match self {
            SeqRef::ByHash(h) | SeqRef::Both(h, _) => Some(h),
            SeqRef::ByData(_) => None,
        }
    }

    /// The sequence data, if already known without a lookup.
    pub fn data(&self) -> Option<&Sequence> {
        match self {
            SeqRef::ByData(d) | SeqRef::Both(_, d) => Some(d),
            SeqRef::ByHash(_) => None,
        }
    }
}

/// Resolves a [`SeqRef`] to its hash and data, hashing or looking up whichever half is
/// missing. Mirrors `ClusterStore._getSequence` / `SeqClu._getSequence`, which raise on
/// an unresolvable reference; here that is a caller bug (an invariant), not data the
/// engine should tolerate, so it is asserted via `debug_assert` rather than surfaced as
/// a recoverable error — every call site in this crate always has access to enough
/// context to resolve any `SeqRef` it constructs.
pub fn resolve<'a>(
    seq_ref: &'a SeqRef,
    lookup: impl FnOnce(&SequenceHash) -> Option<&'a Sequence>,
    hasher: impl FnOnce(&Sequence) -> SequenceHash,
) -> (SequenceHash, &'a Sequence) {
    match seq_ref {
        SeqRef::Both(h, d) => (h.clone(), d),
        SeqRef::ByData(d) => (hasher(d), d),
        SeqRef::ByHash(h) => {
            let data = lookup(h).expect("hash-only SeqRef must be resolvable by the caller");
            (h.clone(), data)
        }
    }
}

/// Orders two sequence hashes, used for the lexicographic tie-break rule.
pub fn hash_order(a: &SequenceHash, b: &SequenceHash) -> Ordering {
    a.cmp(b)
}
