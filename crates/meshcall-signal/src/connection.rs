//! Per-connection handler: track room membership and fan out roster changes.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Notify};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

use crate::protocol::{ClientMessage, JoinRoom, Participant, ServerMessage};
use crate::rooms::{ConnId, Member, RoomStore};

/// Where this connection currently sits.
struct Presence {
    room_id: String,
    peer_id: Option<String>,
}

/// Accept connections until the listener fails permanently.
pub async fn serve(listener: TcpListener, store: RoomStore) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let store = store.clone();
                tokio::spawn(async move {
                    match accept_async(stream).await {
                        Ok(ws) => handle_connection(ws, addr, store).await,
                        Err(e) => {
                            tracing::warn!(peer = %addr, error = %e, "WS handshake failed");
                        }
                    }
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "TCP accept error");
            }
        }
    }
}

/// Handle a single WebSocket connection.
pub async fn handle_connection(
    ws: WebSocketStream<TcpStream>,
    addr: SocketAddr,
    store: RoomStore,
) {
    let conn = store.next_conn_id();
    let (mut sink, mut stream) = ws.split();
    let (tx, mut rx) = mpsc::channel::<String>(256);
    let evict = Arc::new(Notify::new());
    let mut current: Option<Presence> = None;

    tracing::info!(peer = %addr, conn, "Client connected");

    loop {
        tokio::select! {
            _ = evict.notified() => {
                tracing::warn!(peer = %addr, conn, "Dropping client that fell behind");
                break;
            }

            Some(frame) = rx.recv() => {
                if sink.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }

            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(ClientMessage::JoinRoom(join)) => {
                            join_room(&store, conn, &tx, &evict, &mut current, join).await;
                        }
                        Ok(ClientMessage::LeaveRoom(leave)) => {
                            if current.as_ref().is_some_and(|p| p.room_id == leave.room_id) {
                                depart(&store, conn, current.take()).await;
                            } else {
                                tracing::debug!(
                                    conn,
                                    room = %leave.room_id,
                                    peer_id = ?leave.peer_id,
                                    "Leave for a room not joined"
                                );
                            }
                        }
                        Err(e) => {
                            tracing::debug!(conn, error = %e, "Ignoring unrecognised frame");
                        }
                    },
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(peer = %addr, error = %e, "WS error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    depart(&store, conn, current.take()).await;
    tracing::info!(peer = %addr, conn, "Client disconnected");
}

async fn join_room(
    store: &RoomStore,
    conn: ConnId,
    tx: &mpsc::Sender<String>,
    evict: &Arc<Notify>,
    current: &mut Option<Presence>,
    join: JoinRoom,
) {
    if let Some(previous) = current.take() {
        let old = store.leave(&previous.room_id, conn).await;
        let moved = previous.room_id != join.room_id || previous.peer_id != join.peer_id;
        if let Some(peer_id) = old.and_then(|m| m.peer_id).filter(|_| moved) {
            announce(
                store,
                &previous.room_id,
                conn,
                &ServerMessage::UserDisconnected { peer_id },
            )
            .await;
        }
    }

    let member = Member {
        peer_id: join.peer_id.clone(),
        display_name: join.display_name.clone(),
        tx: tx.clone(),
        evict: evict.clone(),
    };
    let others = store.join(&join.room_id, conn, member).await;
    let members = store.member_count(&join.room_id).await;
    tracing::info!(
        conn,
        room = %join.room_id,
        peer_id = ?join.peer_id,
        members,
        "Joined room"
    );

    match (ServerMessage::RoomUsers {
        participants: others,
    })
    .to_json()
    {
        // Our own loop drains this queue, so waiting on it here could stall.
        Ok(frame) => {
            if tx.try_send(frame).is_err() {
                tracing::warn!(conn, "Own queue full, room users not sent");
                evict.notify_one();
            }
        }
        Err(e) => tracing::warn!(error = %e, "Failed to encode room users"),
    }

    if let Some(peer_id) = &join.peer_id {
        let connected = ServerMessage::UserConnected(Participant {
            peer_id: peer_id.clone(),
            display_name: join.display_name.clone(),
        });
        announce(store, &join.room_id, conn, &connected).await;
    }

    *current = Some(Presence {
        room_id: join.room_id,
        peer_id: join.peer_id,
    });
}

async fn depart(store: &RoomStore, conn: ConnId, presence: Option<Presence>) {
    let Some(presence) = presence else {
        return;
    };
    let member = store.leave(&presence.room_id, conn).await;
    let rooms = store.room_count().await;
    tracing::info!(
        conn,
        room = %presence.room_id,
        rooms,
        "Left room"
    );
    if let Some(peer_id) = member.and_then(|m| m.peer_id) {
        announce(
            store,
            &presence.room_id,
            conn,
            &ServerMessage::UserDisconnected { peer_id },
        )
        .await;
    }
}

async fn announce(store: &RoomStore, room_id: &str, from: ConnId, message: &ServerMessage) {
    match message.to_json() {
        Ok(frame) => {
            let reached = store.broadcast(room_id, from, &frame).await;
            tracing::debug!(room = %room_id, reached, "Broadcast");
        }
        Err(e) => tracing::warn!(error = %e, "Failed to encode broadcast"),
    }
}
