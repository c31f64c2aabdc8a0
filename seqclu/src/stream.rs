//! The stream of sequences the engine clusters.

use crate::sequence::{Sequence, SequenceHash};

/// A source of batches of (already hashed) sequences, pulled one tick at a time.
///
/// An empty returned batch signals the stream has nothing more *right now*, not
/// necessarily that it is exhausted forever (see [`crate::scheduler::Scheduler`], which
/// terminates only after two consecutive empty batches).
pub trait StreamSource {
    /// Pulls the next batch. Returns an empty vector if nothing is currently
    /// available.
    fn advance_tick(&mut self) -> Vec<(SequenceHash, Sequence)>;
}

/// Replays a pre-built sequence of batches. The reference `StreamSource` used in tests
/// and as a starting point for a host's real stream adapter (sockets, a file tailer, a
/// message queue consumer).
#[derive(Debug, Clone)]
pub struct VecStreamSource {
    batches: std::vec::IntoIter<Vec<(SequenceHash, Sequence)>>,
}

impl VecStreamSource {
    /// Builds a source that replays `batches` in order, one per tick, then returns
    /// empty batches forever after.
    pub fn new(batches: Vec<Vec<(SequenceHash, Sequence)>>) -> Self {
        Self {
            batches: batches.into_iter(),
        }
    }
}

impl StreamSource for VecStreamSource {
    fn advance_tick(&mut self) -> Vec<(SequenceHash, Sequence)> {
        self.batches.next().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn replays_batches_in_order_then_goes_empty() {
        let hash = SequenceHash::new("a");
        let data: Sequence = Arc::new(vec![vec![1.0]]);
        let mut source = VecStreamSource::new(vec![vec![(hash.clone(), data.clone())], vec![]]);
        assert_eq!(source.advance_tick().len(), 1);
        assert_eq!(source.advance_tick().len(), 0);
        assert_eq!(source.advance_tick().len(), 0);
    }
}
