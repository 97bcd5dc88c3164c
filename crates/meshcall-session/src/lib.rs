//! meshcall room engine.
//!
//! Joins a named room, keeps one peer link per remote participant, tracks
//! who is talking and decides which stream takes the main stage. Platform
//! media, the peer-connection primitive and the signaling service are
//! reached through traits so the engine runs the same against real
//! implementations and in-memory fakes.

pub mod config;
pub mod focus;
pub mod media;
pub mod peer;
pub mod room;
pub mod signaling;
pub mod voice_activity;

#[cfg(test)]
mod test_support;

pub use config::SessionConfig;
pub use focus::{Focus, FocusRule, FocusSelection};
pub use media::{
    AudioAnalyser, LocalMedia, MediaDevices, MediaTrack, MediaTrackBundle, SyntheticVideo,
    TrackKind, TrackSource,
};
pub use peer::{
    CallId, CallKind, CallMetadata, IncomingCall, LinkState, PeerLinkManager, PeerTransport,
    TransportEvent, TransportFactory,
};
pub use room::{
    Participant, RoomCoordinator, RoomDeps, RoomEvent, RoomHandle, RoomSnapshot, RoomState,
    SessionHost,
};
pub use signaling::{Connector, LoopbackConnector, SignalingClient, SignalingEvent, WsConnector};
pub use voice_activity::{Speaker, VadSettings, VoiceActivityDetector};
