//! Voice activity detection.
//!
//! Samples an audio track's frequency bins at a fixed interval and reports
//! talking / not-talking transitions. One detector per speaker; the local
//! microphone and each remote stream get their own.

mod detector;

pub use detector::{
    is_talking, mean_amplitude, Speaker, VadHandle, VadSettings, VoiceActivity,
    VoiceActivityDetector,
};
