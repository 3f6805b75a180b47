//! Interactive drumwise demo: hits from stdin, logging audio backend.
//!
//! Runs the full engine against a stub continuation service (it echoes the
//! primer's pattern instead of calling a real model) and a backend that
//! logs triggers instead of making sound. Useful for exercising the
//! correction, scheduling and generation machinery end to end.
//!
//! Usage:
//!   cargo run --features cli --bin drumwise -- --threshold 8
//!
//! Commands (newline-delimited on stdin):
//!   kick | snare | hihat_closed | ...   — play a live hit
//!   state                               — print generation state
//!   stats                               — print counters as JSON
//!   stop-loop                           — halt loop playback
//!   q | quit                            — shut down

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use drumwise::channels::ChannelId;
use drumwise::{
    AudioBackend, Continuation, Engine, EngineConfig, Hit, InstrumentId, Result,
};

// ── CLI ──────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "drumwise",
    about = "Live drum engine demo: stdin hits, logged triggers, stub continuation"
)]
struct Args {
    /// Engine configuration as a JSON file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Correction sampler seed, for reproducible runs.
    #[arg(long)]
    seed: Option<u64>,

    /// Live hits before a continuation is requested.
    #[arg(long)]
    threshold: Option<usize>,

    /// Schedule generated material once instead of looping it.
    #[arg(long)]
    no_loop: bool,
}

// ── Stub collaborators ───────────────────────────────────────────────────

/// Logs every trigger instead of producing sound.
struct LogBackend;

impl AudioBackend for LogBackend {
    fn trigger(&self, channel: ChannelId, instrument: InstrumentId) {
        tracing::info!(channel, %instrument, "trigger");
    }
}

/// Echoes the primer's pattern over the requested duration.
///
/// A stand-in for a real sequence model: it tiles the primer end to end so
/// the scheduling and loop machinery has something rhythmic to chew on.
struct EchoContinuation;

impl Continuation for EchoContinuation {
    fn generate(
        &self,
        primer: &[Hit],
        _start_ms: i64,
        duration_ms: i64,
        _temperature: f32,
    ) -> Result<Vec<Hit>> {
        let pattern: Vec<Hit> = match primer {
            [] => vec![
                Hit::new(InstrumentId::Kick, 0),
                Hit::new(InstrumentId::Snare, 500),
            ],
            [first, rest @ ..] => {
                let base = first.tick_ms;
                std::iter::once(*first)
                    .chain(rest.iter().copied())
                    .map(|h| Hit::new(h.instrument, h.tick_ms - base))
                    .collect()
            }
        };
        let span = pattern.last().map(|h| h.tick_ms).unwrap_or(0).max(250);

        let mut hits = Vec::new();
        let mut offset = 0;
        while offset <= duration_ms {
            for hit in &pattern {
                hits.push(Hit::new(hit.instrument, offset + hit.tick_ms));
            }
            offset += span + 250;
        }
        Ok(hits)
    }
}

// ── Main ─────────────────────────────────────────────────────────────────

fn now_ms() -> anyhow::Result<u64> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock before the unix epoch")?
        .as_millis() as u64)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            EngineConfig::from_json_str(&json)?
        }
        None => EngineConfig::default(),
    };
    if args.seed.is_some() {
        config.rng_seed = args.seed;
    }
    if let Some(threshold) = args.threshold {
        config.generation_threshold = threshold;
    }
    if args.no_loop {
        config.loop_playback = false;
    }

    let engine = Engine::start(config, Arc::new(EchoContinuation), Arc::new(LogBackend))?;
    println!("ready. type an instrument name (kick, snare, ...), 'stats' or 'quit'");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "" => {}
            "q" | "quit" => break,
            "state" => println!("{:?}", engine.generation_state()),
            "stats" => println!("{}", serde_json::to_string_pretty(&engine.stats())?),
            "stop-loop" => {
                if !engine.stop_loop() {
                    println!("no loop running");
                }
            }
            name => match engine.input_hit(name, now_ms()?) {
                Ok(corrected) => {
                    if corrected.name() != name {
                        println!("{name} -> {corrected}");
                    }
                }
                Err(error) => println!("rejected: {error}"),
            },
        }
    }

    engine.shutdown().await;
    Ok(())
}
