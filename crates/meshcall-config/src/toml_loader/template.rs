//! Default TOML config template with inline documentation comments.

/// Generate the default TOML config content with comments.
pub(crate) fn default_config_toml() -> String {
    r##"# meshcall configuration
# Schema version 1
# Only override what you want to change -- missing fields use defaults.

[signaling]
url = "ws://127.0.0.1:9000/ws"
# connect_timeout_secs = 15      # 1-120
# heartbeat_interval_secs = 25   # 5-300
# reconnect_delay_secs = 1
# max_reconnect_delay_secs = 30

[room]
# join_barrier_timeout_ms = 2000  # 100-30000
# dial_delay_ms = 350             # 0-5000
# negotiation_timeout_ms = 12000  # 0 disables, otherwise 1000-120000
# tie_break = "lexicographic"     # or "none"

[voice_activity]
# local_threshold = 25     # 0-255
# remote_threshold = 20    # 0-255
# frame_interval_ms = 16   # 5-1000
# local_fft_size = 512     # power of two, 32-32768
# remote_fft_size = 256

[media]
# synthetic_width = 640
# synthetic_height = 480
# synthetic_fps = 10
# synthetic_fill = "#111111"

[ice]
# servers = ["stun:stun.l.google.com:19302"]

[logging]
# level = "info"   # trace, debug, info, warn, error
"##
    .to_string()
}
