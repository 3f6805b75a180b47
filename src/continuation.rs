//! The continuation service seam.
//!
//! The generative sequence model is a black box behind [`Continuation`]:
//! given a primer of recent hits it returns a forecast sequence. Model
//! loading, inference quality and latency are the implementor's concern;
//! the engine only guarantees that the call runs off the live input path
//! (under `spawn_blocking`) and that a failure never costs a live hit.

use crate::hit::Hit;
use crate::Result;

/// A generative model that continues a primer sequence.
pub trait Continuation: Send + Sync {
    /// Generate roughly `duration_ms` of material continuing `primer`.
    ///
    /// `primer` hits carry engine-relative milliseconds ending at
    /// `start_ms`; returned hits carry offsets relative to `start_ms`,
    /// starting at zero. The call may block; the engine invokes it from a
    /// blocking task, never from the input or playback path.
    fn generate(
        &self,
        primer: &[Hit],
        start_ms: i64,
        duration_ms: i64,
        temperature: f32,
    ) -> Result<Vec<Hit>>;
}

/// One completed continuation, ready to be scheduled.
///
/// Offsets are relative to whatever base tick the sequence is scheduled
/// onto; the sequence itself is never mutated, only superseded by a newer
/// one.
#[derive(Debug, Clone)]
pub struct GeneratedSequence {
    hits: Vec<Hit>,
    duration_ms: i64,
}

impl GeneratedSequence {
    /// Build a sequence from service output, sorting by offset.
    ///
    /// Returns `None` for an empty result: there is nothing to schedule
    /// or loop, so the caller treats it as a failed generation.
    pub fn from_hits(mut hits: Vec<Hit>) -> Option<Self> {
        if hits.is_empty() {
            return None;
        }
        hits.sort_by_key(|h| h.tick_ms);
        let duration_ms = hits.last().map(|h| h.tick_ms).unwrap_or(0);
        Some(Self { hits, duration_ms })
    }

    /// The forecast hits, ordered by offset.
    pub fn hits(&self) -> &[Hit] {
        &self.hits
    }

    /// Offset of the last hit, i.e. the audible length of one loop iteration.
    pub fn duration_ms(&self) -> i64 {
        self.duration_ms
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}
