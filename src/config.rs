//! Engine configuration.
//!
//! All tuning knobs live here as plain values so they can be adjusted per
//! instrument or performance. Defaults match the reference drum setup:
//! 16 ms ticks, a 500 ms correction lookahead, 60 s continuations looped
//! with a half-second gap.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    // --- Timing ---
    /// Tick resolution in milliseconds. Hits closer than half a tick
    /// quantize to the same tick. Default: 16.
    pub tick_ms: u32,

    /// Playback poll cadence in milliseconds. Must be shorter than a tick
    /// so no tick goes unpolled. Default: 2.
    pub poll_interval_ms: u32,

    // --- Correction ---
    /// Forward window of forecast events consulted when correcting a live
    /// hit, in milliseconds. Default: 500.
    pub lookahead_ms: i64,

    /// How long a hit stays in the recent-hit history, in milliseconds.
    /// Default: 2000.
    pub history_window_ms: i64,

    /// Hard cap on history length, bounding the primer sent to the
    /// continuation service. Default: 500.
    pub max_history_hits: usize,

    /// How many of the most recent hits feed the repetition penalty.
    /// Default: 4.
    pub context_window: usize,

    /// Additive weight on the performer's own instrument, so the forecast
    /// never fully overrides live intent. Default: 0.15.
    pub user_weight: f64,

    /// Multiplier applied once to each instrument present in the recent
    /// context, discouraging immediate repetition. Must be in (0, 1].
    /// Default: 0.5.
    pub recency_damping: f64,

    /// Seed for the correction sampler. `None` = OS entropy. Default: None.
    pub rng_seed: Option<u64>,

    // --- Generation ---
    /// Live hits accumulated before a continuation request is issued.
    /// Default: 32.
    pub generation_threshold: usize,

    /// Requested continuation length in milliseconds. Default: 60_000.
    pub generation_duration_ms: i64,

    /// Sampling temperature passed through to the continuation service.
    /// Default: 1.2.
    pub temperature: f32,

    /// When true, generated material loops until halted; when false it is
    /// scheduled exactly once per "go" gesture. Default: true.
    pub loop_playback: bool,

    /// Silence between loop iterations, in milliseconds. Default: 500.
    pub loop_gap_ms: i64,

    // --- Buffering ---
    /// Events further than this behind the playback cursor are pruned.
    /// Sized to keep a full 60 s looped segment resident. Default: 70_000.
    pub prune_window_ms: i64,

    // --- Channels ---
    /// Size of the playback channel pool. Default: 32.
    pub channel_count: usize,

    /// How long an acquired channel counts as busy, in milliseconds.
    /// Default: 250.
    pub channel_hold_ms: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_ms: 16,
            poll_interval_ms: 2,
            lookahead_ms: 500,
            history_window_ms: 2000,
            max_history_hits: 500,
            context_window: 4,
            user_weight: 0.15,
            recency_damping: 0.5,
            rng_seed: None,
            generation_threshold: 32,
            generation_duration_ms: 60_000,
            temperature: 1.2,
            loop_playback: true,
            loop_gap_ms: 500,
            prune_window_ms: 70_000,
            channel_count: 32,
            channel_hold_ms: 250,
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.tick_ms == 0 {
            return Err(Error::Config("tick_ms must be nonzero".into()));
        }
        if self.poll_interval_ms == 0 || self.poll_interval_ms >= self.tick_ms {
            return Err(Error::Config(format!(
                "poll_interval_ms ({}) must be nonzero and shorter than tick_ms ({})",
                self.poll_interval_ms, self.tick_ms
            )));
        }
        if self.lookahead_ms <= 0 {
            return Err(Error::Config("lookahead_ms must be positive".into()));
        }
        if self.user_weight < 0.0 {
            return Err(Error::Config("user_weight must be non-negative".into()));
        }
        if !(self.recency_damping > 0.0 && self.recency_damping <= 1.0) {
            return Err(Error::Config(format!(
                "recency_damping ({}) must be in (0, 1]",
                self.recency_damping
            )));
        }
        if self.generation_threshold == 0 {
            return Err(Error::Config("generation_threshold must be nonzero".into()));
        }
        if self.channel_count == 0 {
            return Err(Error::Config("channel_count must be nonzero".into()));
        }
        Ok(())
    }

    /// Number of ticks spanned by `ms`, rounded to nearest, at least one.
    pub(crate) fn ticks_for_ms(&self, ms: i64) -> i64 {
        ((ms as f64 / self.tick_ms as f64).round() as i64).max(1)
    }
}
