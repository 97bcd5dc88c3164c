//! JSON messages exchanged with the signaling service.
//!
//! Every frame is `{"event": "<name>", "data": {...}}` with camelCase fields.
//! The server side mirrors these types in `meshcall-signal`.

use serde::{Deserialize, Serialize};

/// Client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientMessage {
    JoinRoom(JoinRoom),
    LeaveRoom(LeaveRoom),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoom {
    pub room_id: String,
    /// `None` when the join barrier released without a transport identity.
    pub peer_id: Option<String>,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveRoom {
    pub room_id: String,
    pub peer_id: Option<String>,
}

/// Server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerMessage {
    RoomUsers(RoomUsers),
    UserConnected(RemoteParticipant),
    UserDisconnected(UserDisconnected),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomUsers {
    pub participants: Vec<RemoteParticipant>,
}

/// A participant as the signaling service reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteParticipant {
    pub peer_id: String,
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDisconnected {
    pub peer_id: String,
}
