//! Blank video used when no camera can be opened.

use std::time::Duration;

use meshcall_config::schema::MediaConfig;

use super::track::{MediaTrack, TrackSource};

const DEFAULT_FILL: [u8; 3] = [0x11, 0x11, 0x11];

/// Fixed-size, solid-colour frame source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntheticVideo {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub fill: [u8; 3],
}

impl Default for SyntheticVideo {
    fn default() -> Self {
        Self::from_config(&MediaConfig::default())
    }
}

impl SyntheticVideo {
    pub fn from_config(config: &MediaConfig) -> Self {
        Self {
            width: config.synthetic_width,
            height: config.synthetic_height,
            fps: config.synthetic_fps.max(1),
            fill: parse_fill(&config.synthetic_fill).unwrap_or(DEFAULT_FILL),
        }
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.fps.max(1)))
    }

    /// One RGB24 frame.
    pub fn frame(&self) -> Vec<u8> {
        let pixels = self.width as usize * self.height as usize;
        self.fill.repeat(pixels)
    }

    pub fn track(&self) -> MediaTrack {
        MediaTrack::video(
            TrackSource::Synthetic,
            format!("synthetic {}x{}@{}", self.width, self.height, self.fps),
        )
    }
}

fn parse_fill(hex: &str) -> Option<[u8; 3]> {
    let digits = hex.strip_prefix('#')?;
    if digits.len() != 6 {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(digits.get(i..i + 2)?, 16).ok();
    Some([channel(0)?, channel(2)?, channel(4)?])
}
