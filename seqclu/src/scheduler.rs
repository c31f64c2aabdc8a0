//! The single-threaded tick loop that pulls batches from a stream and drives a
//! [`Clusterer`].

use crate::clusterer::Clusterer;
use crate::error::Result;
use crate::outputs::RunOutputs;
use crate::stream::StreamSource;

/// Steps a [`Clusterer`] forward one batch at a time.
///
/// Terminates once the stream returns an empty batch twice in a row — a single empty
/// batch is treated as "nothing available this tick", not end-of-stream, so a source
/// with irregular arrival gaps is not mistaken for exhausted.
pub struct Scheduler {
    source: Box<dyn StreamSource>,
    clusterer: Clusterer,
    consecutive_empty_batches: u32,
    finished: bool,
}

impl Scheduler {
    /// Builds a scheduler over the given stream and clusterer.
    pub fn new(source: Box<dyn StreamSource>, clusterer: Clusterer) -> Self {
        Self {
            source,
            clusterer,
            consecutive_empty_batches: 0,
            finished: false,
        }
    }

    /// Whether the stream has been exhausted and the final flush has run.
    pub fn finished(&self) -> bool {
        self.finished
    }

    /// Read-only access to the driven clusterer, e.g. to inspect outputs mid-run.
    pub fn clusterer(&self) -> &Clusterer {
        &self.clusterer
    }

    /// Pulls and processes one batch. Returns `Ok(true)` if the scheduler should be
    /// stepped again, `Ok(false)` once it has finished (the final flush has already
    /// run by the time this returns `false`).
    #[tracing::instrument(level = "trace", skip(self), fields(tick = %self.clusterer.tick()))]
    pub fn step(&mut self) -> Result<bool> {
        if self.finished {
            return Ok(false);
        }

        let batch = self.source.advance_tick();

        if batch.is_empty() {
            self.consecutive_empty_batches += 1;
            if self.consecutive_empty_batches >= 2 {
                tracing::info!(tick = %self.clusterer.tick(), "stream exhausted, finishing");
                self.clusterer.flush_buffer()?;
                self.finished = true;
                return Ok(false);
            }
        } else {
            self.consecutive_empty_batches = 0;
            if batch.len() > self.clusterer.config().max_per_tick {
                tracing::warn!(
                    batch_size = batch.len(),
                    max_per_tick = self.clusterer.config().max_per_tick,
                    "batch exceeds max_per_tick"
                );
            }
            for (hash, data) in batch {
                self.clusterer.process_sequence(hash, data)?;
            }
            if self.clusterer.buffer_full() {
                self.clusterer.flush_buffer()?;
            }
        }

        self.clusterer.advance_tick();
        Ok(true)
    }

    /// Steps until the stream is exhausted.
    pub fn run_to_completion(&mut self) -> Result<()> {
        while self.step()? {}
        Ok(())
    }

    /// The current run's outputs.
    pub fn outputs(&self) -> RunOutputs {
        self.clusterer.outputs()
    }
}
