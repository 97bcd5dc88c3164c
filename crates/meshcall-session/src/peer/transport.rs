use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use meshcall_common::SessionError;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::media::MediaTrackBundle;

/// Transport-assigned handle for one media call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallId(pub u64);

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "call-{}", self.0)
    }
}

/// Camera calls carry the participant's main stream; screen calls are auxiliary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallKind {
    Camera,
    Screen,
}

/// Metadata attached to an outgoing call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallMetadata {
    pub kind: CallKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl CallMetadata {
    pub fn camera(display_name: Option<String>) -> Self {
        Self {
            kind: CallKind::Camera,
            display_name,
        }
    }

    pub fn screen() -> Self {
        Self {
            kind: CallKind::Screen,
            display_name: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IncomingCall {
    pub call_id: CallId,
    pub peer_id: String,
    pub metadata: CallMetadata,
}

/// Everything the transport reports, delivered on one ordered channel.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The transport is reachable under `identity`.
    Open { identity: String },
    Incoming(IncomingCall),
    /// Remote media arrived for a call.
    Stream {
        call_id: CallId,
        bundle: MediaTrackBundle,
    },
    Closed { call_id: CallId },
    Failed { call_id: CallId, reason: String },
}

/// Peer-to-peer media transport (e.g. WebRTC).
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn call(
        &self,
        peer_id: &str,
        bundle: &MediaTrackBundle,
        metadata: CallMetadata,
    ) -> Result<CallId, SessionError>;

    async fn answer(&self, call_id: CallId, bundle: &MediaTrackBundle) -> Result<(), SessionError>;

    async fn close(&self, call_id: CallId) -> Result<(), SessionError>;

    /// Tear the transport down. Its event channel closes afterwards.
    async fn destroy(&self) -> Result<(), SessionError>;
}

/// Creates one transport per room visit.
pub trait TransportFactory: Send + Sync {
    fn create(&self, ice_servers: &[String])
        -> (Arc<dyn PeerTransport>, mpsc::Receiver<TransportEvent>);
}
