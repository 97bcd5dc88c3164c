//! Room store: which connections are in which room.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Notify, RwLock};

use crate::protocol::Participant;

pub type ConnId = u64;

/// One connection's membership in a room.
#[derive(Debug, Clone)]
pub struct Member {
    /// `None` until the client knows its peer identity.
    pub peer_id: Option<String>,
    pub display_name: String,
    pub tx: mpsc::Sender<String>,
    /// Signalled when the member cannot keep up and must be disconnected.
    pub evict: Arc<Notify>,
}

impl Member {
    fn participant(&self) -> Option<Participant> {
        self.peer_id.as_ref().map(|peer_id| Participant {
            peer_id: peer_id.clone(),
            display_name: self.display_name.clone(),
        })
    }
}

/// Thread-safe room store.
#[derive(Clone, Default)]
pub struct RoomStore {
    rooms: Arc<RwLock<HashMap<String, HashMap<ConnId, Member>>>>,
    next_conn: Arc<AtomicU64>,
}

impl RoomStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_conn_id(&self) -> ConnId {
        self.next_conn.fetch_add(1, Ordering::Relaxed)
    }

    /// Add a connection to a room, replacing any earlier entry for it.
    /// Returns the other members that have a peer identity.
    pub async fn join(&self, room_id: &str, conn: ConnId, member: Member) -> Vec<Participant> {
        let mut rooms = self.rooms.write().await;
        let room = rooms.entry(room_id.to_string()).or_default();
        room.insert(conn, member);
        let mut others: Vec<Participant> = room
            .iter()
            .filter(|(id, _)| **id != conn)
            .filter_map(|(_, m)| m.participant())
            .collect();
        others.sort_by(|a, b| a.peer_id.cmp(&b.peer_id));
        others
    }

    /// Remove a connection from a room. Empty rooms are dropped.
    pub async fn leave(&self, room_id: &str, conn: ConnId) -> Option<Member> {
        let mut rooms = self.rooms.write().await;
        let room = rooms.get_mut(room_id)?;
        let member = room.remove(&conn);
        if room.is_empty() {
            rooms.remove(room_id);
            tracing::debug!(room = %room_id, "Room empty, dropped");
        }
        member
    }

    /// Queue a frame for every member except `except`. Returns how many were reached.
    ///
    /// Never waits on a member's queue. A member whose queue is full is
    /// evicted instead of missing the frame.
    pub async fn broadcast(&self, room_id: &str, except: ConnId, frame: &str) -> usize {
        let targets: Vec<(ConnId, mpsc::Sender<String>, Arc<Notify>)> = {
            let rooms = self.rooms.read().await;
            let Some(room) = rooms.get(room_id) else {
                return 0;
            };
            room.iter()
                .filter(|(id, _)| **id != except)
                .map(|(id, m)| (*id, m.tx.clone(), m.evict.clone()))
                .collect()
        };

        let mut reached = 0;
        for (conn, tx, evict) in targets {
            match tx.try_send(frame.to_string()) {
                Ok(()) => reached += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(room = %room_id, conn, "Member queue full, evicting");
                    evict.notify_one();
                }
                Err(TrySendError::Closed(_)) => {}
            }
        }
        reached
    }

    pub async fn member_count(&self, room_id: &str) -> usize {
        self.rooms.read().await.get(room_id).map_or(0, HashMap::len)
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}
