//! The artefacts a completed (or interrupted) run hands back to its host.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::sequence::{ClusterId, SequenceHash};

/// Everything a caller gets out of a run: final labels, the surviving prototype sets,
/// which assignments used the approximate distance path, and every sequence that ever
/// passed through the candidate buffer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunOutputs {
    /// Final cluster assignment for every labelled sequence.
    pub labels: FxHashMap<SequenceHash, ClusterId>,
    /// Each cluster's prototype hashes at the end of the run.
    pub prototypes_by_cluster: FxHashMap<ClusterId, FxHashSet<SequenceHash>>,
    /// Hashes whose final assignment used the error-bounded approximate comparison
    /// rather than an exact distance computed against every cluster.
    pub clustered_by_approximation: FxHashSet<SequenceHash>,
    /// Every hash that transited the candidate buffer during the run, whether it was
    /// ultimately promoted to a prototype or labelled as an ordinary member.
    pub buffered_sequences: FxHashSet<SequenceHash>,
}
