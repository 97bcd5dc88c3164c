use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),
}

/// Which local capture a device failure refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Microphone,
    Camera,
    Screen,
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Microphone => "microphone",
            Self::Camera => "camera",
            Self::Screen => "screen",
        };
        f.write_str(name)
    }
}

/// Failures reported by a media device backend.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DeviceError {
    #[error("no device available")]
    NotFound,

    #[error("permission denied")]
    PermissionDenied,

    #[error("{0}")]
    Failed(String),
}

/// Errors raised by the peer-session engine.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("{kind} unavailable: {reason}")]
    DeviceUnavailable { kind: DeviceKind, reason: String },

    #[error("signaling unavailable: {0}")]
    SignalingUnavailable(String),

    #[error("negotiation with {peer_id} failed: {reason}")]
    PeerNegotiationFailed { peer_id: String, reason: String },

    #[error("teardown step '{step}' failed: {reason}")]
    TeardownPartialFailure { step: &'static str, reason: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("room visit cancelled")]
    Cancelled,
}

impl SessionError {
    pub fn device(kind: DeviceKind, err: DeviceError) -> Self {
        Self::DeviceUnavailable {
            kind,
            reason: err.to_string(),
        }
    }

    /// True for failures that end the room visit rather than one feature or link.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::InvalidState(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MeshError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}
