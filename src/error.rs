//! Error types for drumwise.

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
///
/// Everything except [`Error::Config`] is recovered locally by the engine's
/// workers: an invalid instrument is dropped at the boundary, a cold clock is
/// a retryable precondition, channel exhaustion drops the trigger, and a
/// failed continuation call reverts the generation trigger without touching
/// live input. Only construction-time failures are fatal.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Unknown instrument name or MIDI pitch at the ingestion boundary.
    #[error("unknown instrument: {0}")]
    InvalidInstrument(String),

    /// The clock was queried before the first reference timestamp arrived.
    #[error("clock reference not established yet")]
    ClockNotEstablished,

    /// No free playback channel at dispatch time.
    #[error("all {0} playback channels busy")]
    ChannelExhausted(usize),

    /// The continuation service failed or returned nothing usable.
    #[error("generation: {0}")]
    Generation(String),

    /// Invalid configuration.
    #[error("config: {0}")]
    Config(String),

    /// The engine's background workers have shut down.
    #[error("engine: {0}")]
    Engine(String),

    /// JSON error (config parsing).
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}
