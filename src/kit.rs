//! The drum kit vocabulary.
//!
//! A closed eleven-piece kit, fixed at start-up. Input sources hand the
//! engine raw names or General MIDI drum pitches; anything outside this set
//! is rejected at the boundary and never stored.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One piece of the kit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentId {
    Kick,
    Snare,
    HihatClosed,
    HihatOpen,
    TomLow,
    TomMid,
    TomHigh,
    Crash,
    Ride,
    Clap,
    Cowbell,
}

impl InstrumentId {
    /// Number of instruments in the vocabulary.
    pub const COUNT: usize = 11;

    /// Every instrument, in declaration order.
    pub const ALL: [InstrumentId; Self::COUNT] = [
        InstrumentId::Kick,
        InstrumentId::Snare,
        InstrumentId::HihatClosed,
        InstrumentId::HihatOpen,
        InstrumentId::TomLow,
        InstrumentId::TomMid,
        InstrumentId::TomHigh,
        InstrumentId::Crash,
        InstrumentId::Ride,
        InstrumentId::Clap,
        InstrumentId::Cowbell,
    ];

    /// Dense index for per-instrument arrays.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Canonical lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            InstrumentId::Kick => "kick",
            InstrumentId::Snare => "snare",
            InstrumentId::HihatClosed => "hihat_closed",
            InstrumentId::HihatOpen => "hihat_open",
            InstrumentId::TomLow => "tom_low",
            InstrumentId::TomMid => "tom_mid",
            InstrumentId::TomHigh => "tom_high",
            InstrumentId::Crash => "crash",
            InstrumentId::Ride => "ride",
            InstrumentId::Clap => "clap",
            InstrumentId::Cowbell => "cowbell",
        }
    }

    /// Look up an instrument by canonical name.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|i| i.name() == name)
    }

    /// General MIDI drum pitch for this instrument.
    pub fn midi(self) -> u8 {
        match self {
            InstrumentId::Kick => 36,
            InstrumentId::Snare => 38,
            InstrumentId::HihatClosed => 42,
            InstrumentId::HihatOpen => 46,
            InstrumentId::TomLow => 43,
            InstrumentId::TomMid => 47,
            InstrumentId::TomHigh => 50,
            InstrumentId::Crash => 49,
            InstrumentId::Ride => 51,
            InstrumentId::Clap => 39,
            InstrumentId::Cowbell => 56,
        }
    }

    /// Look up an instrument by General MIDI drum pitch.
    pub fn from_midi(pitch: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|i| i.midi() == pitch)
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_names() {
        assert_eq!(InstrumentId::parse("kick"), Some(InstrumentId::Kick));
        assert_eq!(
            InstrumentId::parse("hihat_closed"),
            Some(InstrumentId::HihatClosed)
        );
        assert_eq!(InstrumentId::parse("gong"), None);
        assert_eq!(InstrumentId::parse(""), None);
    }

    #[test]
    fn test_midi_mapping() {
        assert_eq!(InstrumentId::Kick.midi(), 36);
        assert_eq!(InstrumentId::from_midi(38), Some(InstrumentId::Snare));
        assert_eq!(InstrumentId::from_midi(56), Some(InstrumentId::Cowbell));
        // 35 is an alternate GM kick this kit does not accept.
        assert_eq!(InstrumentId::from_midi(35), None);
    }

    #[test]
    fn test_indices_are_dense() {
        for (expected, instrument) in InstrumentId::ALL.iter().enumerate() {
            assert_eq!(instrument.index(), expected);
        }
    }
}
