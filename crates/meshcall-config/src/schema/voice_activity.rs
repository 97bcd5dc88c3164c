use serde::{Deserialize, Serialize};

/// Talking-indicator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceActivityConfig {
    /// Mean frequency-bin amplitude (0-255) above which the local stream counts as talking.
    pub local_threshold: u32,
    /// Same, for remote streams.
    pub remote_threshold: u32,
    /// Sampling cadence in milliseconds.
    pub frame_interval_ms: u64,
    pub local_fft_size: u32,
    pub remote_fft_size: u32,
}

impl Default for VoiceActivityConfig {
    fn default() -> Self {
        Self {
            local_threshold: 25,
            remote_threshold: 20,
            frame_interval_ms: 16,
            local_fft_size: 512,
            remote_fft_size: 256,
        }
    }
}
