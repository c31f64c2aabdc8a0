//! Online sequence clustering with prototype voting, an error-bounded approximate
//! distance-to-cluster, and a bounded buffer for ambiguous sequences.
//!
//! The entry points are [`config::Config`], which a host builds and validates, and
//! [`scheduler::Scheduler`], which drives a [`clusterer::Clusterer`] over a
//! [`stream::StreamSource`] one batch at a time until the stream is exhausted.
//! [`build_default_engine`] wires the three together using this crate's reference
//! [`hashing::SequenceHasher`] and [`value::PrototypeValueHeuristic`] implementations,
//! for hosts that only need to supply a [`distance::DistanceMeasure`] and a stream.

pub mod candidates;
pub mod cluster;
pub mod clusterer;
pub mod config;
pub mod distance;
pub mod error;
pub mod frequencies;
pub mod hashing;
pub mod outputs;
pub mod prototypes;
pub mod scheduler;
pub mod sequence;
pub mod stream;
pub mod value;

use std::sync::Arc;

pub use clusterer::Clusterer;
pub use config::Config;
pub use distance::DistanceMeasure;
pub use error::{Result, SeqCluError};
pub use outputs::RunOutputs;
pub use scheduler::Scheduler;
pub use stream::StreamSource;

use hashing::DefaultSequenceHasher;
use value::LinearPrototypeValue;

/// Builds a [`Scheduler`] using this crate's default hasher and prototype-value
/// heuristic, so a host need only supply a distance measure and a stream.
///
/// `config.alpha` is forwarded as the [`LinearPrototypeValue`] ratio. Hosts that need
/// a different hasher or heuristic should construct a [`Clusterer`] directly instead.
pub fn build_default_engine(
    config: Config,
    measure: Arc<dyn DistanceMeasure>,
    source: Box<dyn StreamSource>,
) -> Result<Scheduler> {
    let ratio = config.alpha;
    let clusterer = Clusterer::new(
        config,
        measure,
        Arc::new(DefaultSequenceHasher),
        Arc::new(LinearPrototypeValue { ratio }),
    )?;
    Ok(Scheduler::new(source, clusterer))
}
