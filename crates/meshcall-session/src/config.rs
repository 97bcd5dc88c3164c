use std::time::Duration;

use meshcall_config::{MeshConfig, TieBreak};

use crate::media::SyntheticVideo;
use crate::voice_activity::VadSettings;

/// Runtime settings for one room visit, derived from [`MeshConfig`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub join_barrier_timeout: Duration,
    pub dial_delay: Duration,
    /// `None` disables the negotiation deadline.
    pub negotiation_timeout: Option<Duration>,
    pub tie_break: TieBreak,
    pub local_vad: VadSettings,
    pub remote_vad: VadSettings,
    pub synthetic: SyntheticVideo,
    pub ice_servers: Vec<String>,
}

impl SessionConfig {
    pub fn from_config(config: &MeshConfig) -> Self {
        let vad = &config.voice_activity;
        let frame = Duration::from_millis(vad.frame_interval_ms);
        let negotiation = config.room.negotiation_timeout_ms;

        Self {
            join_barrier_timeout: Duration::from_millis(config.room.join_barrier_timeout_ms),
            dial_delay: Duration::from_millis(config.room.dial_delay_ms),
            negotiation_timeout: (negotiation > 0).then(|| Duration::from_millis(negotiation)),
            tie_break: config.room.tie_break,
            local_vad: VadSettings::new(vad.local_threshold, frame, vad.local_fft_size),
            remote_vad: VadSettings::new(vad.remote_threshold, frame, vad.remote_fft_size),
            synthetic: SyntheticVideo::from_config(&config.media),
            ice_servers: config.ice.servers.clone(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from_config(&MeshConfig::default())
    }
}
