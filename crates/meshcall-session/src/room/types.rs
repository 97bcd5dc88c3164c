use std::collections::BTreeMap;

use serde::Serialize;

use crate::focus::{FocusRule, FocusSelection};
use crate::media::MediaTrackBundle;
use crate::peer::{LinkState, PeerLink};

/// Lifecycle of one room visit. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomState {
    Initializing,
    Joining,
    Active,
    Leaving,
    Closed,
}

impl RoomState {
    /// Joining or active: roster and link events are acted on.
    pub fn is_live(self) -> bool {
        matches!(self, Self::Joining | Self::Active)
    }

    pub fn is_finished(self) -> bool {
        matches!(self, Self::Leaving | Self::Closed)
    }
}

/// A remote member of the room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub peer_id: String,
    pub display_name: String,
    pub talking: bool,
    /// Added because it called us before signaling announced it.
    pub provisional: bool,
}

impl Participant {
    pub fn new(peer_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            peer_id: peer_id.into(),
            display_name: display_name.into(),
            talking: false,
            provisional: false,
        }
    }
}

/// Remote participants keyed by peer id. Never contains the local identity.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    members: BTreeMap<String, Participant>,
}

impl Roster {
    /// Insert or refresh a member. Returns true when the peer is new.
    pub fn upsert(&mut self, participant: Participant) -> bool {
        match self.members.get_mut(&participant.peer_id) {
            Some(existing) => {
                if !participant.display_name.is_empty() {
                    existing.display_name = participant.display_name;
                }
                existing.provisional &= participant.provisional;
                false
            }
            None => {
                self.members
                    .insert(participant.peer_id.clone(), participant);
                true
            }
        }
    }

    pub fn remove(&mut self, peer_id: &str) -> Option<Participant> {
        self.members.remove(peer_id)
    }

    /// Replace the membership wholesale, keeping talking state for survivors.
    /// Provisional members missing from `participants` stay when `keep`
    /// accepts them. Returns the peer ids that are gone.
    pub fn replace(
        &mut self,
        participants: Vec<Participant>,
        keep: impl Fn(&Participant) -> bool,
    ) -> Vec<String> {
        let mut next = BTreeMap::new();
        for mut participant in participants {
            if let Some(old) = self.members.get(&participant.peer_id) {
                participant.talking = old.talking;
                if participant.display_name.is_empty() {
                    participant.display_name = old.display_name.clone();
                }
            }
            next.insert(participant.peer_id.clone(), participant);
        }
        for (peer_id, old) in &self.members {
            if old.provisional && !next.contains_key(peer_id) && keep(old) {
                next.insert(peer_id.clone(), old.clone());
            }
        }
        let removed = self
            .members
            .keys()
            .filter(|id| !next.contains_key(*id))
            .cloned()
            .collect();
        self.members = next;
        removed
    }

    pub fn contains(&self, peer_id: &str) -> bool {
        self.members.contains_key(peer_id)
    }

    pub fn get(&self, peer_id: &str) -> Option<&Participant> {
        self.members.get(peer_id)
    }

    /// Returns false when the peer is unknown or already in that state.
    pub fn set_talking(&mut self, peer_id: &str, talking: bool) -> bool {
        match self.members.get_mut(peer_id) {
            Some(p) if p.talking != talking => {
                p.talking = talking;
                true
            }
            _ => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Participant> {
        self.members.values()
    }

    pub fn ids(&self) -> Vec<String> {
        self.members.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// What the local side brought to the room.
#[derive(Debug, Clone, Default)]
pub struct LocalSession {
    pub local_identity: Option<String>,
    pub media_bundle: MediaTrackBundle,
    pub joined_room: bool,
}

/// Per-link view for the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkSummary {
    pub peer_id: String,
    pub state: LinkState,
    pub has_stream: bool,
    pub has_screen: bool,
    pub sending_screen: bool,
}

impl From<&PeerLink> for LinkSummary {
    fn from(link: &PeerLink) -> Self {
        Self {
            peer_id: link.peer_id.clone(),
            state: link.state,
            has_stream: link.remote_stream.is_some(),
            has_screen: link.remote_screen.is_some(),
            sending_screen: link.is_sending_screen(),
        }
    }
}

/// Point-in-time view of the room, published after every change.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub room_id: String,
    pub display_name: String,
    pub state: RoomState,
    pub local_identity: Option<String>,
    pub signaling_connected: bool,
    pub joined_room: bool,
    pub degraded_join: bool,
    pub participants: Vec<Participant>,
    pub links: Vec<LinkSummary>,
    pub selection: FocusSelection,
    pub focus: Option<FocusRule>,
    pub local_talking: bool,
    pub muted: bool,
    pub camera_enabled: bool,
    pub sharing_screen: bool,
    /// Set when the microphone could not be opened; the visit continues without voice.
    pub voice_error: Option<String>,
}

impl RoomSnapshot {
    pub fn new(room_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            display_name: display_name.into(),
            state: RoomState::Initializing,
            local_identity: None,
            signaling_connected: false,
            joined_room: false,
            degraded_join: false,
            participants: Vec::new(),
            links: Vec::new(),
            selection: FocusSelection::None,
            focus: None,
            local_talking: false,
            muted: false,
            camera_enabled: true,
            sharing_screen: false,
            voice_error: None,
        }
    }

    pub fn link(&self, peer_id: &str) -> Option<&LinkSummary> {
        self.links.iter().find(|l| l.peer_id == peer_id)
    }

    pub fn participant(&self, peer_id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.peer_id == peer_id)
    }
}

/// Notifications for UI layers.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    StateChanged(RoomState),
    ParticipantJoined(Participant),
    ParticipantLeft { peer_id: String },
    LinkConnected { peer_id: String },
    LinkClosed { peer_id: String },
    LinkFailed { peer_id: String, reason: String },
    FocusChanged(FocusRule),
    /// `peer_id` is `None` for the local speaker.
    TalkingChanged { peer_id: Option<String>, talking: bool },
    Error(String),
}
