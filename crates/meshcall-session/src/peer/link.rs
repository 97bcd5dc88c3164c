use meshcall_common::SessionError;
use serde::Serialize;

use super::transport::CallId;
use crate::media::MediaTrackBundle;

/// Lifecycle of the camera call with one remote participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    Idle,
    Dialing,
    Ringing,
    Connected,
    Closed,
}

impl LinkState {
    /// Dialing, ringing or connected.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Dialing | Self::Ringing | Self::Connected)
    }

    /// Waiting for remote media.
    pub fn is_pending(self) -> bool {
        matches!(self, Self::Dialing | Self::Ringing)
    }

    fn can_move_to(self, next: LinkState) -> bool {
        use LinkState::*;
        match (self, next) {
            (Closed, _) => false,
            (_, Closed) => true,
            (Idle, Dialing | Ringing) => true,
            (Dialing, Connected | Ringing) => true,
            (Ringing, Connected) => true,
            // The remote re-dialed an established link.
            (Connected, Ringing) => true,
            _ => false,
        }
    }
}

/// Who placed the camera call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Outgoing,
    Incoming,
}

/// One remote participant's media connection.
#[derive(Debug, Clone)]
pub struct PeerLink {
    pub peer_id: String,
    pub state: LinkState,
    pub direction: Direction,
    /// Camera call currently backing the link.
    pub call_id: Option<CallId>,
    pub remote_stream: Option<MediaTrackBundle>,
    pub remote_screen: Option<MediaTrackBundle>,
    pub(crate) screen_in: Option<CallId>,
    pub(crate) screen_out: Option<CallId>,
}

impl PeerLink {
    pub(crate) fn new(peer_id: impl Into<String>, direction: Direction) -> Self {
        Self {
            peer_id: peer_id.into(),
            state: LinkState::Idle,
            direction,
            call_id: None,
            remote_stream: None,
            remote_screen: None,
            screen_in: None,
            screen_out: None,
        }
    }

    pub(crate) fn transition(&mut self, next: LinkState) -> Result<(), SessionError> {
        if !self.state.can_move_to(next) {
            return Err(SessionError::InvalidState(format!(
                "link {} cannot move from {:?} to {:?}",
                self.peer_id, self.state, next
            )));
        }
        self.state = next;
        Ok(())
    }

    pub fn is_sending_screen(&self) -> bool {
        self.screen_out.is_some()
    }

    /// Every call id this link holds.
    pub(crate) fn call_ids(&self) -> impl Iterator<Item = CallId> {
        self.call_id
            .into_iter()
            .chain(self.screen_in)
            .chain(self.screen_out)
    }
}
