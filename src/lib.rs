//! Real-time drum performance engine.
//!
//! Drives a live percussion instrument: physical triggers (motion sensors,
//! MIDI pads, key presses) produce discrete hits that are corrected toward
//! musically plausible choices using a background model's forecast,
//! scheduled for playback at tick-accurate relative timing, and extended
//! with model-generated continuations once enough live input has
//! accumulated.
//!
//! ## Architecture
//!
//! ```text
//! input source ──► Clock ──► Corrector ◄── forecast window ──┐
//!                              │                             │
//!                              ▼                             │
//!                         EventBuffer ◄── GenerationTrigger ─┘
//!                              │               ▲  │
//!                              ▼               │  ▼
//!                       playback loop     Continuation (black box)
//!                              │
//!                              ▼
//!                   ChannelPool ──► AudioBackend
//! ```
//!
//! The generative model itself, audio mixing and the physical transports
//! are external collaborators behind the [`Continuation`] and
//! [`AudioBackend`] seams.
//!
//! ## Modules
//!
//! - [`clock`] — reference epoch, monotonic elapsed time, tick quantization
//! - [`kit`] — the closed instrument vocabulary and its MIDI mapping
//! - [`buffer`] — tick-indexed playback buffer
//! - [`correction`] — weighted-sampling hit correction
//! - [`channels`] — round-robin playback channel pool
//! - [`generation`] — generation trigger state machine and workers
//! - [`playback`] — the poll-drain-dispatch scheduler
//! - [`engine`] — wiring, ingestion API and teardown

pub mod buffer;
pub mod channels;
pub mod clock;
pub mod config;
pub mod continuation;
pub mod correction;
pub mod engine;
pub mod generation;
pub mod hit;
pub mod kit;
pub mod playback;
pub mod stats;

mod error;

pub use config::EngineConfig;
pub use continuation::Continuation;
pub use engine::Engine;
pub use error::{Error, Result};
pub use generation::GenerationState;
pub use hit::Hit;
pub use kit::InstrumentId;
pub use playback::AudioBackend;
