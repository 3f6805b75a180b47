//! Generation triggering: the state machine that decides when the
//! continuation service runs and when its output enters the mix.
//!
//! Live hits accumulate until a threshold is reached, then one continuation
//! request goes to the background worker. The finished sequence is *not*
//! played automatically: the next live hit after it is ready acts as the
//! performer's "go" gesture, either scheduling it once or starting loop
//! playback. A failed generation logs, counts and falls back to
//! accumulating; live hits are unaffected either way because they reach the
//! playback buffer on their own path.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::continuation::{Continuation, GeneratedSequence};
use crate::engine::Shared;
use crate::hit::Hit;
use crate::stats::EngineStats;
use crate::Error;

/// Where the generation cycle currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationState {
    /// Torn down; nothing accumulates.
    Idle,
    /// Counting live hits toward the generation threshold.
    Accumulating,
    /// One continuation request in flight.
    Generating,
    /// A sequence is stored, waiting for the performer's go gesture.
    Ready,
    /// The stored sequence is being re-scheduled on a loop.
    Looping,
}

/// What the engine should do after a live hit has been observed.
#[derive(Debug)]
pub(crate) enum HitAction {
    /// Keep playing; nothing to kick off.
    None,
    /// Threshold reached: snapshot the history and queue a request.
    StartGeneration,
    /// Go gesture: put the stored sequence into play.
    Go(GeneratedSequence),
}

#[derive(Debug)]
struct TriggerInner {
    state: GenerationState,
    hits_seen: usize,
    sequence: Option<GeneratedSequence>,
}

/// Guarded generation state. All transitions happen under one mutex so a
/// burst of concurrent live hits can never start two requests.
#[derive(Debug)]
pub(crate) struct GenerationTrigger {
    inner: std::sync::Mutex<TriggerInner>,
}

impl GenerationTrigger {
    /// Construction goes straight to accumulating.
    pub(crate) fn new() -> Self {
        Self {
            inner: std::sync::Mutex::new(TriggerInner {
                state: GenerationState::Accumulating,
                hits_seen: 0,
                sequence: None,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TriggerInner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub(crate) fn state(&self) -> GenerationState {
        self.lock().state
    }

    /// Record one live hit and decide what it sets in motion.
    ///
    /// `loop_mode` picks the Ready transition: loop playback, or a single
    /// scheduling followed by a fresh accumulation cycle.
    pub(crate) fn observe_hit(&self, threshold: usize, loop_mode: bool) -> HitAction {
        let mut inner = self.lock();
        match inner.state {
            GenerationState::Accumulating => {
                inner.hits_seen += 1;
                if inner.hits_seen >= threshold {
                    inner.state = GenerationState::Generating;
                    HitAction::StartGeneration
                } else {
                    HitAction::None
                }
            }
            // A hit during generation must not spawn a second request.
            GenerationState::Generating => HitAction::None,
            GenerationState::Ready => match inner.sequence.clone() {
                Some(sequence) => {
                    if loop_mode {
                        inner.state = GenerationState::Looping;
                    } else {
                        inner.state = GenerationState::Accumulating;
                        inner.hits_seen = 0;
                    }
                    HitAction::Go(sequence)
                }
                None => {
                    // Ready without a sequence cannot normally happen;
                    // recover by accumulating again.
                    inner.state = GenerationState::Accumulating;
                    HitAction::None
                }
            },
            GenerationState::Looping | GenerationState::Idle => HitAction::None,
        }
    }

    /// Store a finished sequence. Only meaningful while generating.
    pub(crate) fn complete(&self, sequence: GeneratedSequence) {
        let mut inner = self.lock();
        if inner.state == GenerationState::Generating {
            inner.sequence = Some(sequence);
            inner.state = GenerationState::Ready;
        }
    }

    /// A generation attempt failed; go back to accumulating.
    ///
    /// The hit count is kept, so the very next live hit retries.
    pub(crate) fn fail(&self) {
        let mut inner = self.lock();
        if inner.state == GenerationState::Generating {
            inner.state = GenerationState::Accumulating;
        }
    }

    /// Halt loop playback, returning to accumulation. Returns whether a
    /// loop was actually running.
    pub(crate) fn halt_loop(&self) -> bool {
        let mut inner = self.lock();
        if inner.state == GenerationState::Looping {
            inner.state = GenerationState::Accumulating;
            inner.hits_seen = 0;
            true
        } else {
            false
        }
    }

    /// Teardown: everything stops and the stored sequence is dropped.
    pub(crate) fn reset(&self) {
        let mut inner = self.lock();
        inner.state = GenerationState::Idle;
        inner.hits_seen = 0;
        inner.sequence = None;
    }
}

/// One queued continuation request.
#[derive(Debug)]
pub(crate) struct GenerationRequest {
    pub primer: Vec<Hit>,
    pub start_ms: i64,
}

/// Background generation worker.
///
/// Requests are processed strictly one at a time; together with the
/// trigger's state guard this is what bounds the system to a single
/// continuation call in flight. The service call itself runs under
/// `spawn_blocking` so a slow model never stalls the runtime.
pub(crate) async fn run_generation(
    shared: Arc<Shared>,
    service: Arc<dyn Continuation>,
    mut rx: mpsc::UnboundedReceiver<GenerationRequest>,
) {
    while let Some(request) = rx.recv().await {
        if shared.stopping() {
            break;
        }
        let duration_ms = shared.config.generation_duration_ms;
        let temperature = shared.config.temperature;
        tracing::info!(
            primer_hits = request.primer.len(),
            duration_ms,
            "requesting continuation"
        );

        let call = {
            let service = Arc::clone(&service);
            tokio::task::spawn_blocking(move || {
                service.generate(&request.primer, request.start_ms, duration_ms, temperature)
            })
            .await
        };
        let outcome = match call {
            Ok(Ok(hits)) => GeneratedSequence::from_hits(hits)
                .ok_or_else(|| Error::Generation("service returned an empty sequence".into())),
            Ok(Err(error)) => Err(error),
            Err(join_error) => Err(Error::Generation(format!(
                "continuation task panicked: {join_error}"
            ))),
        };

        match outcome {
            Ok(sequence) => {
                tracing::info!(
                    hits = sequence.len(),
                    segment_ms = sequence.duration_ms(),
                    "continuation ready — waiting for go gesture"
                );
                shared.trigger.complete(sequence);
                EngineStats::count(&shared.stats.generations_completed);
            }
            Err(error) => {
                tracing::warn!(%error, "continuation failed — accumulating again");
                shared.trigger.fail();
                EngineStats::count(&shared.stats.generations_failed);
            }
        }
    }
    tracing::info!("generation worker shut down");
}

/// Loop playback: re-base the sequence onto the current tick, schedule it,
/// wait out the segment plus the configured gap, repeat.
///
/// Cancellation is cooperative: the halt flag and stop signal are checked
/// between iterations, and the inter-iteration sleep is cut short by the
/// engine's notify so teardown never waits out a 60 s segment.
pub(crate) async fn run_loop(shared: Arc<Shared>, sequence: GeneratedSequence) {
    tracing::info!(
        hits = sequence.len(),
        segment_ms = sequence.duration_ms(),
        gap_ms = shared.config.loop_gap_ms,
        "loop playback started"
    );
    loop {
        if shared.stopping() || shared.trigger.state() != GenerationState::Looping {
            break;
        }
        match schedule_sequence(&shared, &sequence) {
            Ok(scheduled) => tracing::debug!(scheduled, "loop iteration scheduled"),
            Err(error) => tracing::warn!(%error, "loop iteration skipped"),
        }
        let wait_ms = (sequence.duration_ms() + shared.config.loop_gap_ms).max(0) as u64;
        tokio::select! {
            _ = shared.notify.notified() => {}
            _ = tokio::time::sleep(Duration::from_millis(wait_ms)) => {}
        }
    }
    shared.trigger.halt_loop();
    tracing::info!("loop playback stopped");
}

/// Insert every hit of `sequence` into the playback buffer, offsets
/// re-based onto the current tick.
pub(crate) fn schedule_sequence(
    shared: &Shared,
    sequence: &GeneratedSequence,
) -> crate::Result<usize> {
    let now_ms = shared.clock.elapsed_ms()?;
    let mut buffer = shared.lock_buffer();
    for hit in sequence.hits() {
        let tick = shared.clock.quantize(now_ms + hit.tick_ms);
        buffer.insert(tick, hit.instrument);
    }
    Ok(sequence.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_starts_exactly_one_generation() {
        let trigger = GenerationTrigger::new();
        for _ in 0..3 {
            assert!(matches!(trigger.observe_hit(4, true), HitAction::None));
        }
        assert!(matches!(
            trigger.observe_hit(4, true),
            HitAction::StartGeneration
        ));
        assert_eq!(trigger.state(), GenerationState::Generating);

        // Hits during generation never spawn a second request.
        for _ in 0..10 {
            assert!(matches!(trigger.observe_hit(4, true), HitAction::None));
        }
        assert_eq!(trigger.state(), GenerationState::Generating);
    }

    #[test]
    fn test_concurrent_hits_start_one_generation() {
        let trigger = Arc::new(GenerationTrigger::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let trigger = Arc::clone(&trigger);
            handles.push(std::thread::spawn(move || {
                (0..100)
                    .filter(|_| {
                        matches!(trigger.observe_hit(50, true), HitAction::StartGeneration)
                    })
                    .count()
            }));
        }
        let started: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(started, 1);
    }

    #[test]
    fn test_ready_then_go_enters_loop_mode() {
        let trigger = GenerationTrigger::new();
        for _ in 0..2 {
            trigger.observe_hit(2, true);
        }
        let sequence = GeneratedSequence::from_hits(vec![Hit::new(
            crate::kit::InstrumentId::Kick,
            0,
        )])
        .unwrap();
        trigger.complete(sequence);
        assert_eq!(trigger.state(), GenerationState::Ready);

        assert!(matches!(trigger.observe_hit(2, true), HitAction::Go(_)));
        assert_eq!(trigger.state(), GenerationState::Looping);

        assert!(trigger.halt_loop());
        assert_eq!(trigger.state(), GenerationState::Accumulating);
    }

    #[test]
    fn test_go_without_loop_mode_restarts_accumulation() {
        let trigger = GenerationTrigger::new();
        trigger.observe_hit(1, false);
        let sequence = GeneratedSequence::from_hits(vec![Hit::new(
            crate::kit::InstrumentId::Snare,
            100,
        )])
        .unwrap();
        trigger.complete(sequence);
        assert!(matches!(trigger.observe_hit(1, false), HitAction::Go(_)));
        assert_eq!(trigger.state(), GenerationState::Accumulating);
    }

    #[test]
    fn test_failure_reverts_to_accumulating_and_retries() {
        let trigger = GenerationTrigger::new();
        assert!(matches!(
            trigger.observe_hit(1, true),
            HitAction::StartGeneration
        ));
        trigger.fail();
        assert_eq!(trigger.state(), GenerationState::Accumulating);
        // The kept hit count means the next hit retries immediately.
        assert!(matches!(
            trigger.observe_hit(1, true),
            HitAction::StartGeneration
        ));
    }

    #[test]
    fn test_reset_goes_idle_and_ignores_hits() {
        let trigger = GenerationTrigger::new();
        trigger.observe_hit(1, true);
        trigger.reset();
        assert_eq!(trigger.state(), GenerationState::Idle);
        assert!(matches!(trigger.observe_hit(1, true), HitAction::None));
    }
}
