//! Room visit timing and race-mitigation knobs.

use serde::{Deserialize, Serialize};

/// How two peers that dial each other at the same time pick a single link.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TieBreak {
    /// The lexicographically lower peer id dials; the higher one only answers.
    #[default]
    Lexicographic,
    /// Both sides dial; a crossed call is settled when it arrives.
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    /// Send the join anyway after this long if the barrier has not opened.
    pub join_barrier_timeout_ms: u64,
    /// Delay before dialing a participant that just joined (valid range: 0-5000).
    pub dial_delay_ms: u64,
    /// Force-close links stuck dialing or ringing for this long. 0 disables.
    pub negotiation_timeout_ms: u64,
    pub tie_break: TieBreak,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            join_barrier_timeout_ms: 2000,
            dial_delay_ms: 350,
            negotiation_timeout_ms: 12_000,
            tie_break: TieBreak::Lexicographic,
        }
    }
}
