//! Per-section validators.

use crate::schema::MeshConfig;

use super::helpers::{validate_hex_color, validate_power_of_two, validate_range};

pub(crate) fn validate_signaling(errors: &mut Vec<String>, config: &MeshConfig) {
    let s = &config.signaling;
    if !(s.url.starts_with("ws://") || s.url.starts_with("wss://")) {
        errors.push(format!("signaling.url = {:?} must be a ws:// or wss:// URL", s.url));
    }
    validate_range(errors, "signaling.connect_timeout_secs", s.connect_timeout_secs, 1, 120);
    validate_range(errors, "signaling.heartbeat_interval_secs", s.heartbeat_interval_secs, 5, 300);
    validate_range(errors, "signaling.reconnect_delay_secs", s.reconnect_delay_secs, 1, 60);
    if s.max_reconnect_delay_secs < s.reconnect_delay_secs {
        errors.push(format!(
            "signaling.max_reconnect_delay_secs = {} is below reconnect_delay_secs = {}",
            s.max_reconnect_delay_secs, s.reconnect_delay_secs
        ));
    }
}

pub(crate) fn validate_room(errors: &mut Vec<String>, config: &MeshConfig) {
    let r = &config.room;
    validate_range(errors, "room.join_barrier_timeout_ms", r.join_barrier_timeout_ms, 100, 30_000);
    validate_range(errors, "room.dial_delay_ms", r.dial_delay_ms, 0, 5_000);
    if r.negotiation_timeout_ms != 0 {
        validate_range(errors, "room.negotiation_timeout_ms", r.negotiation_timeout_ms, 1_000, 120_000);
    }
}

pub(crate) fn validate_voice_activity(errors: &mut Vec<String>, config: &MeshConfig) {
    let v = &config.voice_activity;
    validate_range(errors, "voice_activity.local_threshold", v.local_threshold.into(), 0, 255);
    validate_range(errors, "voice_activity.remote_threshold", v.remote_threshold.into(), 0, 255);
    validate_range(errors, "voice_activity.frame_interval_ms", v.frame_interval_ms, 5, 1_000);
    validate_power_of_two(errors, "voice_activity.local_fft_size", v.local_fft_size, 32, 32_768);
    validate_power_of_two(errors, "voice_activity.remote_fft_size", v.remote_fft_size, 32, 32_768);
}

pub(crate) fn validate_media(errors: &mut Vec<String>, config: &MeshConfig) {
    let m = &config.media;
    validate_range(errors, "media.synthetic_width", m.synthetic_width.into(), 16, 3840);
    validate_range(errors, "media.synthetic_height", m.synthetic_height.into(), 16, 2160);
    validate_range(errors, "media.synthetic_fps", m.synthetic_fps.into(), 1, 60);
    validate_hex_color(errors, "media.synthetic_fill", &m.synthetic_fill);
}

pub(crate) fn validate_ice(errors: &mut Vec<String>, config: &MeshConfig) {
    for server in &config.ice.servers {
        let known = ["stun:", "stuns:", "turn:", "turns:"]
            .iter()
            .any(|scheme| server.starts_with(scheme));
        if !known {
            errors.push(format!("ice.servers entry {server:?} is not a stun/turn URL"));
        }
    }
}
