//! The playback scheduler.
//!
//! A single long-lived task polls the clock on a tight interval, drains the
//! tick that just became current, and fires each due instrument on its own
//! task so simultaneous hits sound simultaneous instead of queuing behind
//! one another. Each dispatch independently takes a channel from the pool;
//! when the pool is exhausted the trigger is dropped and counted; the
//! scheduler itself never blocks on anything but its poll sleep.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::channels::ChannelId;
use crate::clock::Tick;
use crate::engine::Shared;
use crate::kit::InstrumentId;
use crate::stats::EngineStats;

/// The audio output primitive.
///
/// `trigger` is assumed synchronous-but-fast: it starts a sound and
/// returns. Sample decoding and mixing live behind this seam.
pub trait AudioBackend: Send + Sync {
    fn trigger(&self, channel: ChannelId, instrument: InstrumentId);
}

/// Poll-drain-dispatch loop. Runs until the engine signals stop.
///
/// Ticks are only ever drained at exactly the current tick, in
/// non-decreasing order as the clock advances; an event inserted behind
/// the cursor after its tick has drained is skipped for good. While the
/// clock is cold the loop just idles at poll cadence.
pub(crate) async fn run_playback(shared: Arc<Shared>, backend: Arc<dyn AudioBackend>) {
    let mut interval = tokio::time::interval(Duration::from_millis(
        shared.config.poll_interval_ms as u64,
    ));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tracing::info!(
        poll_ms = shared.config.poll_interval_ms,
        tick_ms = shared.config.tick_ms,
        "playback scheduler started"
    );

    loop {
        interval.tick().await;
        if shared.stopping() {
            break;
        }
        let Some(now) = shared.clock.try_current_tick() else {
            continue;
        };
        let Some(instruments) = shared.lock_buffer().pop_due(now) else {
            continue;
        };
        for instrument in instruments {
            let shared = Arc::clone(&shared);
            let backend = Arc::clone(&backend);
            tokio::spawn(async move {
                dispatch(&shared, backend.as_ref(), now, instrument);
            });
        }
    }
    tracing::info!("playback scheduler stopped");
}

/// Fire one instrument: take a channel, trigger the backend.
pub(crate) fn dispatch(
    shared: &Shared,
    backend: &dyn AudioBackend,
    now: Tick,
    instrument: InstrumentId,
) {
    let hold = shared.config.ticks_for_ms(shared.config.channel_hold_ms);
    match shared.lock_channels().acquire(now, hold) {
        Some(channel) => {
            EngineStats::count(&shared.stats.triggers_dispatched);
            backend.trigger(channel, instrument);
        }
        None => {
            EngineStats::count(&shared.stats.channel_exhausted);
            tracing::debug!(%instrument, "no free channel, trigger dropped");
        }
    }
}
