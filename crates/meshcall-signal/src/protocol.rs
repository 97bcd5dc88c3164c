//! Room-membership wire protocol, server side.
//!
//! Frames are `{"event": "<name>", "data": {...}}` with camelCase fields.

use serde::{Deserialize, Serialize};

/// Messages clients send.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientMessage {
    JoinRoom(JoinRoom),
    LeaveRoom(LeaveRoom),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoom {
    pub room_id: String,
    /// Absent when the client joined before its peer identity was known.
    pub peer_id: Option<String>,
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveRoom {
    pub room_id: String,
    pub peer_id: Option<String>,
}

/// Messages the server sends back.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerMessage {
    RoomUsers { participants: Vec<Participant> },
    UserConnected(Participant),
    #[serde(rename_all = "camelCase")]
    UserDisconnected { peer_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub peer_id: String,
    pub display_name: String,
}

impl ServerMessage {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
