//! Hit events and the recent-hit history.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::kit::InstrumentId;

/// One instrument trigger, live or generated.
///
/// `tick_ms` is milliseconds relative to the engine's reference epoch for
/// live hits, or an offset from a sequence base for generated material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hit {
    pub instrument: InstrumentId,
    pub tick_ms: i64,
}

impl Hit {
    pub fn new(instrument: InstrumentId, tick_ms: i64) -> Self {
        Self { instrument, tick_ms }
    }
}

/// Time-bounded record of recent hits.
///
/// Feeds two consumers: the corrector's repetition penalty (the last few
/// entries) and the continuation service's primer (a snapshot of the whole
/// window). Entries older than the window are evicted on every push; a hard
/// length cap bounds the primer regardless of hit rate.
#[derive(Debug)]
pub struct History {
    window_ms: i64,
    max_hits: usize,
    hits: VecDeque<Hit>,
}

impl History {
    pub fn new(window_ms: i64, max_hits: usize) -> Self {
        Self {
            window_ms,
            max_hits,
            hits: VecDeque::new(),
        }
    }

    /// Append a hit and evict everything that fell out of the window
    /// relative to it.
    pub fn push(&mut self, hit: Hit) {
        self.hits.push_back(hit);
        let cutoff = hit.tick_ms - self.window_ms;
        while let Some(front) = self.hits.front() {
            if front.tick_ms < cutoff {
                self.hits.pop_front();
            } else {
                break;
            }
        }
        while self.hits.len() > self.max_hits {
            self.hits.pop_front();
        }
    }

    /// Replace the most recent hit's instrument with its corrected choice.
    pub fn replace_last(&mut self, instrument: InstrumentId) {
        if let Some(last) = self.hits.back_mut() {
            last.instrument = instrument;
        }
    }

    /// The instruments of the last `n` hits, oldest first.
    pub fn recent(&self, n: usize) -> Vec<InstrumentId> {
        let skip = self.hits.len().saturating_sub(n);
        self.hits.iter().skip(skip).map(|h| h.instrument).collect()
    }

    /// Snapshot of the whole window, for use as a generation primer.
    pub fn primer(&self) -> Vec<Hit> {
        self.hits.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn clear(&mut self) {
        self.hits.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(instrument: InstrumentId, tick_ms: i64) -> Hit {
        Hit::new(instrument, tick_ms)
    }

    #[test]
    fn test_window_eviction_on_push() {
        let mut history = History::new(2000, 500);
        history.push(hit(InstrumentId::Kick, 0));
        history.push(hit(InstrumentId::Snare, 1500));
        history.push(hit(InstrumentId::Crash, 2500));
        // The kick at t=0 fell out of the 2000 ms window behind t=2500.
        assert_eq!(
            history.recent(10),
            vec![InstrumentId::Snare, InstrumentId::Crash]
        );
    }

    #[test]
    fn test_length_cap() {
        let mut history = History::new(i64::MAX / 2, 3);
        for t in 0..10 {
            history.push(hit(InstrumentId::Kick, t));
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.primer()[0].tick_ms, 7);
    }

    #[test]
    fn test_replace_last_swaps_corrected_instrument() {
        let mut history = History::new(2000, 500);
        history.push(hit(InstrumentId::Kick, 10));
        history.push(hit(InstrumentId::Snare, 20));
        history.replace_last(InstrumentId::Ride);
        assert_eq!(
            history.recent(2),
            vec![InstrumentId::Kick, InstrumentId::Ride]
        );
        assert_eq!(history.primer()[1].tick_ms, 20);
    }

    #[test]
    fn test_recent_takes_the_tail() {
        let mut history = History::new(i64::MAX / 2, 500);
        history.push(hit(InstrumentId::Kick, 0));
        history.push(hit(InstrumentId::Snare, 1));
        history.push(hit(InstrumentId::Clap, 2));
        assert_eq!(
            history.recent(2),
            vec![InstrumentId::Snare, InstrumentId::Clap]
        );
        assert_eq!(history.recent(0), Vec::<InstrumentId>::new());
    }
}
