//! Observability counters.
//!
//! Recovered faults never propagate out of the engine, so they are counted
//! instead: stale events, channel contention and generation failures all
//! land here where a caller can watch them.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Atomic counters shared across the engine's workers.
#[derive(Debug, Default)]
pub struct EngineStats {
    pub(crate) hits_ingested: AtomicU64,
    pub(crate) hits_altered: AtomicU64,
    pub(crate) stale_dropped: AtomicU64,
    pub(crate) channel_exhausted: AtomicU64,
    pub(crate) triggers_dispatched: AtomicU64,
    pub(crate) generations_completed: AtomicU64,
    pub(crate) generations_failed: AtomicU64,
}

impl EngineStats {
    pub(crate) fn count(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// A point-in-time copy of every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            hits_ingested: self.hits_ingested.load(Ordering::Relaxed),
            hits_altered: self.hits_altered.load(Ordering::Relaxed),
            stale_dropped: self.stale_dropped.load(Ordering::Relaxed),
            channel_exhausted: self.channel_exhausted.load(Ordering::Relaxed),
            triggers_dispatched: self.triggers_dispatched.load(Ordering::Relaxed),
            generations_completed: self.generations_completed.load(Ordering::Relaxed),
            generations_failed: self.generations_failed.load(Ordering::Relaxed),
        }
    }
}

/// Counter snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Live hits accepted at the ingestion boundary.
    pub hits_ingested: u64,
    /// Hits whose corrected instrument differed from the raw input.
    pub hits_altered: u64,
    /// Events quantized behind the playback cursor and dropped.
    pub stale_dropped: u64,
    /// Dispatches dropped because every channel was busy.
    pub channel_exhausted: u64,
    /// Triggers actually delivered to the audio backend.
    pub triggers_dispatched: u64,
    /// Continuation calls that produced a usable sequence.
    pub generations_completed: u64,
    /// Continuation calls that failed or returned nothing.
    pub generations_failed: u64,
}
