//! Engine wiring and the ingestion path.
//!
//! [`Engine::start`] validates configuration, allocates the channel pool
//! (the one fatal failure path) and spawns the two resident workers: the
//! playback scheduler and the generation worker. Input sources then feed
//! hits through a single ingestion function from any thread; everything
//! downstream (correction, scheduling, generation triggering) happens
//! inline under short per-resource locks, with the long-latency
//! continuation call pushed onto the worker's queue.
//!
//! Teardown is cooperative: [`Engine::shutdown`] raises the stop flag,
//! wakes every sleeper and joins all workers before returning.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

use crate::buffer::EventBuffer;
use crate::channels::ChannelPool;
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::continuation::Continuation;
use crate::correction::Corrector;
use crate::generation::{
    run_generation, run_loop, schedule_sequence, GenerationRequest, GenerationState,
    GenerationTrigger, HitAction,
};
use crate::hit::{History, Hit};
use crate::kit::InstrumentId;
use crate::playback::{run_playback, AudioBackend};
use crate::stats::{EngineStats, StatsSnapshot};
use crate::{Error, Result};

/// State shared between the ingestion path and the background workers.
///
/// Each mutable resource sits behind its own lock and no lock is ever held
/// across an await or a continuation call; primers are copied out first.
pub(crate) struct Shared {
    pub(crate) config: EngineConfig,
    pub(crate) clock: Clock,
    pub(crate) stats: EngineStats,
    pub(crate) trigger: GenerationTrigger,
    /// Wakes sleeping workers (the loop task's inter-iteration wait) so
    /// stop and halt requests take effect promptly.
    pub(crate) notify: Notify,
    stop: AtomicBool,
    buffer: Mutex<EventBuffer>,
    history: Mutex<History>,
    channels: Mutex<ChannelPool>,
    corrector: Mutex<Corrector>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    pub(crate) fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let channels = ChannelPool::new(config.channel_count)?;
        let corrector = Corrector::new(
            config.user_weight,
            config.recency_damping,
            config.context_window,
            config.rng_seed,
        );
        Ok(Self {
            clock: Clock::new(config.tick_ms),
            stats: EngineStats::default(),
            trigger: GenerationTrigger::new(),
            notify: Notify::new(),
            stop: AtomicBool::new(false),
            buffer: Mutex::new(EventBuffer::new()),
            history: Mutex::new(History::new(config.history_window_ms, config.max_history_hits)),
            channels: Mutex::new(channels),
            corrector: Mutex::new(corrector),
            config,
        })
    }

    pub(crate) fn stopping(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    pub(crate) fn signal_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
        self.notify.notify_waiters();
    }

    pub(crate) fn lock_buffer(&self) -> MutexGuard<'_, EventBuffer> {
        lock(&self.buffer)
    }

    pub(crate) fn lock_history(&self) -> MutexGuard<'_, History> {
        lock(&self.history)
    }

    pub(crate) fn lock_channels(&self) -> MutexGuard<'_, ChannelPool> {
        lock(&self.channels)
    }

    fn lock_corrector(&self) -> MutexGuard<'_, Corrector> {
        lock(&self.corrector)
    }
}

/// The live performance engine.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use drumwise::{AudioBackend, Continuation, Engine, EngineConfig};
///
/// async fn run(service: Arc<dyn Continuation>, backend: Arc<dyn AudioBackend>) {
///     let engine = Engine::start(EngineConfig::default(), service, backend).unwrap();
///     engine.input_hit("kick", 1_723_000_000_000).unwrap();
///     engine.shutdown().await;
/// }
/// ```
pub struct Engine {
    shared: Arc<Shared>,
    runtime: tokio::runtime::Handle,
    gen_tx: mpsc::UnboundedSender<GenerationRequest>,
    playback: JoinHandle<()>,
    generation: JoinHandle<()>,
    loops: Mutex<Vec<JoinHandle<()>>>,
}

impl Engine {
    /// Validate the configuration, allocate the channel pool and spawn the
    /// background workers. Must be called from within a tokio runtime.
    pub fn start(
        config: EngineConfig,
        service: Arc<dyn Continuation>,
        backend: Arc<dyn AudioBackend>,
    ) -> Result<Self> {
        let shared = Arc::new(Shared::new(config)?);
        let (gen_tx, gen_rx) = mpsc::unbounded_channel();

        let runtime = tokio::runtime::Handle::current();
        let playback = runtime.spawn(run_playback(Arc::clone(&shared), backend));
        let generation = runtime.spawn(run_generation(Arc::clone(&shared), service, gen_rx));

        tracing::info!(
            channels = shared.config.channel_count,
            tick_ms = shared.config.tick_ms,
            threshold = shared.config.generation_threshold,
            "engine started"
        );
        Ok(Self {
            shared,
            runtime,
            gen_tx,
            playback,
            generation,
            loops: Mutex::new(Vec::new()),
        })
    }

    /// Ingest a live hit by instrument name. Returns the corrected
    /// instrument that was scheduled.
    pub fn input_hit(&self, name: &str, wall_ms: u64) -> Result<InstrumentId> {
        let instrument =
            InstrumentId::parse(name).ok_or_else(|| Error::InvalidInstrument(name.into()))?;
        self.input(instrument, wall_ms)
    }

    /// Ingest a live hit from a General MIDI drum pitch.
    pub fn input_midi(&self, pitch: u8, wall_ms: u64) -> Result<InstrumentId> {
        let instrument = InstrumentId::from_midi(pitch)
            .ok_or_else(|| Error::InvalidInstrument(format!("midi pitch {pitch}")))?;
        self.input(instrument, wall_ms)
    }

    /// Ingest an already-validated live hit.
    ///
    /// `wall_ms` is the input source's wall-clock timestamp in
    /// milliseconds; the first hit's timestamp becomes the reference
    /// epoch. Arbitrary call rates and out-of-order timestamps are
    /// tolerated; a hit that quantizes behind the playback cursor is
    /// counted and dropped rather than replayed.
    pub fn input(&self, raw: InstrumentId, wall_ms: u64) -> Result<InstrumentId> {
        if self.shared.stopping() {
            return Err(Error::Engine("engine is shutting down".into()));
        }
        let shared = &self.shared;
        if shared.clock.establish_reference(wall_ms) {
            tracing::info!(wall_ms, "reference epoch established");
        }
        let rel_ms = shared.clock.relative_ms(wall_ms)?;
        let hit_tick = shared.clock.quantize(rel_ms);
        EngineStats::count(&shared.stats.hits_ingested);

        // The raw hit enters history first; the corrected choice replaces
        // it below, so the primer sees what was actually played.
        shared.lock_history().push(Hit::new(raw, rel_ms));

        let lookahead = shared.config.ticks_for_ms(shared.config.lookahead_ms);
        let candidates = shared
            .lock_buffer()
            .candidates(hit_tick, hit_tick + lookahead);
        let recent = shared.lock_history().recent(shared.config.context_window);
        let corrected = shared.lock_corrector().correct(raw, &candidates, &recent);
        if corrected != raw {
            EngineStats::count(&shared.stats.hits_altered);
            tracing::debug!(%raw, %corrected, "hit corrected");
        }
        shared.lock_history().replace_last(corrected);

        let now_tick = shared.clock.current_tick()?;
        if hit_tick < now_tick {
            EngineStats::count(&shared.stats.stale_dropped);
            tracing::debug!(tick = hit_tick, now = now_tick, %corrected, "stale hit dropped");
        } else {
            shared.lock_buffer().insert(hit_tick, corrected);
        }

        let retention = shared.config.ticks_for_ms(shared.config.prune_window_ms);
        let removed = shared.lock_buffer().prune(now_tick - retention);
        if removed > 0 {
            tracing::debug!(removed, "pruned ticks behind the retention window");
        }

        self.observe_generation(rel_ms);
        Ok(corrected)
    }

    /// Feed the generation trigger and act on whatever it decides.
    fn observe_generation(&self, now_ms: i64) {
        let shared = &self.shared;
        let action = shared.trigger.observe_hit(
            shared.config.generation_threshold,
            shared.config.loop_playback,
        );
        match action {
            HitAction::None => {}
            HitAction::StartGeneration => {
                // Copy the primer out; the continuation call must never
                // run under the history lock.
                let primer = shared.lock_history().primer();
                let start_ms = primer.last().map(|h| h.tick_ms).unwrap_or(now_ms);
                let request = GenerationRequest { primer, start_ms };
                if self.gen_tx.send(request).is_err() {
                    tracing::warn!("generation worker gone, request dropped");
                    shared.trigger.fail();
                }
            }
            HitAction::Go(sequence) => {
                if shared.config.loop_playback {
                    let handle = self
                        .runtime
                        .spawn(run_loop(Arc::clone(shared), sequence));
                    lock(&self.loops).push(handle);
                } else {
                    match schedule_sequence(shared, &sequence) {
                        Ok(scheduled) => {
                            tracing::info!(scheduled, "generated sequence scheduled once");
                        }
                        Err(error) => {
                            tracing::warn!(%error, "could not schedule generated sequence");
                        }
                    }
                }
            }
        }
    }

    /// Current generation state.
    pub fn generation_state(&self) -> GenerationState {
        self.shared.trigger.state()
    }

    /// Observability counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Halt loop playback, returning the trigger to accumulation. Pending
    /// buffer entries keep draining. Returns whether a loop was running.
    pub fn stop_loop(&self) -> bool {
        let halted = self.shared.trigger.halt_loop();
        if halted {
            self.shared.notify.notify_waiters();
            tracing::info!("loop playback halt requested");
        }
        halted
    }

    /// Stop every worker and wait for them to finish.
    ///
    /// History is cleared and the generation trigger goes idle; the event
    /// buffer is left untouched so nothing is audibly cut off: pending
    /// entries simply never play once the scheduler is gone.
    pub async fn shutdown(self) {
        tracing::info!("engine shutting down");
        self.shared.signal_stop();
        drop(self.gen_tx);

        let _ = self.playback.await;
        let _ = self.generation.await;
        let loops: Vec<_> = lock(&self.loops).drain(..).collect();
        for handle in loops {
            let _ = handle.await;
        }

        self.shared.trigger.reset();
        self.shared.lock_history().clear();
        tracing::info!("engine stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::ChannelId;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingBackend {
        triggers: Mutex<Vec<InstrumentId>>,
    }

    impl RecordingBackend {
        fn seen(&self) -> Vec<InstrumentId> {
            lock(&self.triggers).clone()
        }
    }

    impl AudioBackend for RecordingBackend {
        fn trigger(&self, _channel: ChannelId, instrument: InstrumentId) {
            lock(&self.triggers).push(instrument);
        }
    }

    /// Returns a fixed cowbell riff, or errors when `fail` is set.
    struct StubContinuation {
        fail: bool,
    }

    impl Continuation for StubContinuation {
        fn generate(
            &self,
            _primer: &[Hit],
            _start_ms: i64,
            _duration_ms: i64,
            _temperature: f32,
        ) -> Result<Vec<Hit>> {
            if self.fail {
                return Err(Error::Generation("model unavailable".into()));
            }
            Ok(vec![
                Hit::new(InstrumentId::Cowbell, 0),
                Hit::new(InstrumentId::Cowbell, 48),
            ])
        }
    }

    fn test_config() -> EngineConfig {
        EngineConfig {
            generation_threshold: 1000, // keep generation out of the way
            rng_seed: Some(1),
            ..Default::default()
        }
    }

    async fn wait_for<F: Fn() -> bool>(what: &str, condition: F) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("timed out waiting for {what}");
    }

    #[tokio::test]
    async fn test_live_hit_reaches_the_backend() {
        let backend = Arc::new(RecordingBackend::default());
        let engine = Engine::start(
            test_config(),
            Arc::new(StubContinuation { fail: false }),
            backend.clone(),
        )
        .unwrap();

        let corrected = engine.input_hit("kick", 1_000).unwrap();
        // Empty buffer means no candidates: the corrector fails open.
        assert_eq!(corrected, InstrumentId::Kick);

        wait_for("the kick to play", || !backend.seen().is_empty()).await;
        assert_eq!(backend.seen(), vec![InstrumentId::Kick]);
        assert_eq!(engine.stats().triggers_dispatched, 1);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_unknown_input_is_rejected_at_the_boundary() {
        let backend = Arc::new(RecordingBackend::default());
        let engine = Engine::start(
            test_config(),
            Arc::new(StubContinuation { fail: false }),
            backend.clone(),
        )
        .unwrap();

        assert!(matches!(
            engine.input_hit("gong", 1_000),
            Err(Error::InvalidInstrument(_))
        ));
        assert!(matches!(
            engine.input_midi(0, 1_000),
            Err(Error::InvalidInstrument(_))
        ));
        assert_eq!(engine.stats().hits_ingested, 0);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_generation_cycle_schedules_on_go() {
        let backend = Arc::new(RecordingBackend::default());
        let config = EngineConfig {
            generation_threshold: 2,
            loop_playback: false,
            rng_seed: Some(1),
            ..Default::default()
        };
        let engine = Engine::start(
            config,
            Arc::new(StubContinuation { fail: false }),
            backend.clone(),
        )
        .unwrap();

        engine.input_hit("kick", 1_000).unwrap();
        engine.input_hit("snare", 1_050).unwrap();

        wait_for("the continuation to land", || {
            engine.generation_state() == GenerationState::Ready
        })
        .await;
        assert_eq!(engine.stats().generations_completed, 1);

        // The go gesture schedules the cowbell riff and restarts the cycle.
        engine.input_hit("kick", 1_100).unwrap();
        assert_eq!(engine.generation_state(), GenerationState::Accumulating);
        wait_for("the generated riff to play", || {
            backend.seen().contains(&InstrumentId::Cowbell)
        })
        .await;
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_generation_failure_recovers() {
        let backend = Arc::new(RecordingBackend::default());
        let config = EngineConfig {
            generation_threshold: 1,
            rng_seed: Some(1),
            ..Default::default()
        };
        let engine = Engine::start(
            config,
            Arc::new(StubContinuation { fail: true }),
            backend.clone(),
        )
        .unwrap();

        engine.input_hit("kick", 1_000).unwrap();
        wait_for("the failure to be recorded", || {
            engine.stats().generations_failed == 1
        })
        .await;
        assert_eq!(engine.generation_state(), GenerationState::Accumulating);

        // Live input keeps flowing regardless.
        engine.input_hit("snare", 1_020).unwrap();
        assert_eq!(engine.stats().hits_ingested, 2);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_loop_mode_repeats_and_halts() {
        let backend = Arc::new(RecordingBackend::default());
        let config = EngineConfig {
            generation_threshold: 1,
            loop_playback: true,
            loop_gap_ms: 10,
            rng_seed: Some(1),
            ..Default::default()
        };
        let engine = Engine::start(
            config,
            Arc::new(StubContinuation { fail: false }),
            backend.clone(),
        )
        .unwrap();

        engine.input_hit("kick", 1_000).unwrap();
        wait_for("the continuation to land", || {
            engine.generation_state() == GenerationState::Ready
        })
        .await;

        engine.input_hit("snare", 1_040).unwrap();
        assert_eq!(engine.generation_state(), GenerationState::Looping);
        // The 48 ms segment plus 10 ms gap loops fast; two iterations'
        // worth of cowbells is proof of re-scheduling.
        wait_for("the loop to repeat", || {
            backend
                .seen()
                .iter()
                .filter(|&&i| i == InstrumentId::Cowbell)
                .count()
                >= 4
        })
        .await;

        assert!(engine.stop_loop());
        assert_eq!(engine.generation_state(), GenerationState::Accumulating);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_joins_workers_and_clears_state() {
        let backend = Arc::new(RecordingBackend::default());
        let engine = Engine::start(
            test_config(),
            Arc::new(StubContinuation { fail: false }),
            backend.clone(),
        )
        .unwrap();
        engine.input_hit("kick", 1_000).unwrap();
        engine.shutdown().await;
    }
}
