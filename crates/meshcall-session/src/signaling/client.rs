//! Signaling client: owns the channel, runs the join barrier and fans
//! roster updates out to subscribers.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use meshcall_common::SessionError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Sleep;
use tracing::{debug, info, warn};

use super::barrier::{JoinBarrier, Release};
use super::channel::{ChannelEvent, Connector, SignalingChannel};
use super::protocol::{ClientMessage, JoinRoom, LeaveRoom, RemoteParticipant, ServerMessage};

/// What the signaling layer reports to the room.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalingEvent {
    Connected,
    Disconnected,
    /// The join was announced for this connection generation.
    Joined { generation: u64, degraded: bool },
    RosterSnapshot(Vec<RemoteParticipant>),
    ParticipantJoined(RemoteParticipant),
    ParticipantLeft { peer_id: String },
    Error(String),
}

type Listener = Box<dyn Fn(&SignalingEvent) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: AtomicU64,
    entries: Mutex<HashMap<u64, Listener>>,
}

impl Listeners {
    fn add(self: &Arc<Self>, listener: Listener) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(id, listener);
        }
        Subscription {
            id,
            listeners: Arc::downgrade(self),
        }
    }

    fn emit(&self, event: &SignalingEvent) {
        if let Ok(entries) = self.entries.lock() {
            for listener in entries.values() {
                listener(event);
            }
        }
    }

    fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }
}

/// Registration handle. Dropping it removes the listener.
pub struct Subscription {
    id: u64,
    listeners: Weak<Listeners>,
}

impl Subscription {
    pub fn cancel(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            if let Ok(mut entries) = listeners.entries.lock() {
                entries.remove(&self.id);
            }
        }
    }
}

/// Every signaling event, in order, for as long as the stream is held.
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<SignalingEvent>,
    _subscription: Subscription,
}

impl EventStream {
    pub async fn recv(&mut self) -> Option<SignalingEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<SignalingEvent> {
        self.rx.try_recv().ok()
    }
}

enum DriverCommand {
    AnnounceJoin {
        room_id: String,
        display_name: String,
    },
    AssignIdentity(String),
    AnnounceLeave {
        reply: oneshot::Sender<Result<bool, SessionError>>,
    },
}

struct Driver {
    commands: mpsc::Sender<DriverCommand>,
    channel: SignalingChannel,
    task: JoinHandle<()>,
}

pub struct SignalingClient {
    connector: Arc<dyn Connector>,
    join_timeout: Duration,
    listeners: Arc<Listeners>,
    driver: Option<Driver>,
}

impl SignalingClient {
    pub fn new(connector: Arc<dyn Connector>, join_timeout: Duration) -> Self {
        Self {
            connector,
            join_timeout,
            listeners: Arc::new(Listeners::default()),
            driver: None,
        }
    }

    /// Open the channel and start the driver. Idempotent while running.
    pub fn connect(&mut self) -> Result<(), SessionError> {
        if self.driver.as_ref().is_some_and(|d| !d.task.is_finished()) {
            debug!("Signaling already connected");
            return Ok(());
        }

        let (channel, events) = self.connector.open();
        let (commands_tx, commands_rx) = mpsc::channel(32);
        let task = tokio::spawn(driver_loop(
            channel.clone(),
            events,
            commands_rx,
            Arc::clone(&self.listeners),
            self.join_timeout,
        ));
        self.driver = Some(Driver {
            commands: commands_tx,
            channel,
            task,
        });
        Ok(())
    }

    /// Record the join intent. The join itself goes out when the barrier releases.
    pub async fn announce_join(
        &self,
        room_id: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Result<(), SessionError> {
        self.command(DriverCommand::AnnounceJoin {
            room_id: room_id.into(),
            display_name: display_name.into(),
        })
        .await
    }

    /// The peer transport reported the local identity.
    pub async fn assign_identity(&self, identity: impl Into<String>) -> Result<(), SessionError> {
        self.command(DriverCommand::AssignIdentity(identity.into()))
            .await
    }

    /// Send a leave if a join went out and the channel is still up.
    /// Returns whether a leave message was queued.
    pub async fn announce_leave(&self) -> Result<bool, SessionError> {
        let Some(driver) = self.live_driver() else {
            return Ok(false);
        };
        let (reply, rx) = oneshot::channel();
        driver
            .commands
            .send(DriverCommand::AnnounceLeave { reply })
            .await
            .map_err(|_| SessionError::SignalingUnavailable("driver stopped".into()))?;
        rx.await
            .map_err(|_| SessionError::SignalingUnavailable("driver stopped".into()))?
    }

    /// Close the channel and stop the driver. Safe to call repeatedly.
    pub fn disconnect(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.channel.disconnect();
            driver.task.abort();
            info!("Signaling disconnected");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.live_driver()
            .is_some_and(|d| d.channel.is_connected())
    }

    /// Receive every event through a channel.
    pub fn subscribe(&self) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.listeners.add(Box::new(move |event| {
            let _ = tx.send(event.clone());
        }));
        EventStream {
            rx,
            _subscription: subscription,
        }
    }

    pub fn on_roster_snapshot(
        &self,
        callback: impl Fn(&[RemoteParticipant]) + Send + Sync + 'static,
    ) -> Subscription {
        self.listeners.add(Box::new(move |event| {
            if let SignalingEvent::RosterSnapshot(list) = event {
                callback(list);
            }
        }))
    }

    pub fn on_participant_joined(
        &self,
        callback: impl Fn(&RemoteParticipant) + Send + Sync + 'static,
    ) -> Subscription {
        self.listeners.add(Box::new(move |event| {
            if let SignalingEvent::ParticipantJoined(participant) = event {
                callback(participant);
            }
        }))
    }

    pub fn on_participant_left(
        &self,
        callback: impl Fn(&str) + Send + Sync + 'static,
    ) -> Subscription {
        self.listeners.add(Box::new(move |event| {
            if let SignalingEvent::ParticipantLeft { peer_id } = event {
                callback(peer_id);
            }
        }))
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    fn live_driver(&self) -> Option<&Driver> {
        self.driver.as_ref().filter(|d| !d.task.is_finished())
    }

    async fn command(&self, cmd: DriverCommand) -> Result<(), SessionError> {
        let driver = self
            .live_driver()
            .ok_or_else(|| SessionError::SignalingUnavailable("not connected".into()))?;
        driver
            .commands
            .send(cmd)
            .await
            .map_err(|_| SessionError::SignalingUnavailable("driver stopped".into()))
    }
}

impl Drop for SignalingClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

struct JoinIntent {
    room_id: String,
    display_name: String,
}

async fn wait_deadline(deadline: &mut Option<Pin<Box<Sleep>>>) {
    match deadline {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

async fn driver_loop(
    channel: SignalingChannel,
    mut events: mpsc::Receiver<ChannelEvent>,
    mut commands: mpsc::Receiver<DriverCommand>,
    listeners: Arc<Listeners>,
    join_timeout: Duration,
) {
    let mut barrier = JoinBarrier::new();
    let mut intent: Option<JoinIntent> = None;
    let mut deadline: Option<Pin<Box<Sleep>>> = None;

    loop {
        let release = tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    ChannelEvent::Connected => {
                        info!("Signaling connected");
                        listeners.emit(&SignalingEvent::Connected);
                        barrier.channel_connected()
                    }
                    ChannelEvent::Disconnected => {
                        warn!("Signaling connection lost");
                        barrier.channel_lost();
                        listeners.emit(&SignalingEvent::Disconnected);
                        None
                    }
                    ChannelEvent::Message(msg) => {
                        listeners.emit(&translate(msg));
                        None
                    }
                    ChannelEvent::Error(reason) => {
                        listeners.emit(&SignalingEvent::Error(reason));
                        None
                    }
                }
            }
            cmd = commands.recv() => {
                let Some(cmd) = cmd else { break };
                match cmd {
                    DriverCommand::AnnounceJoin { room_id, display_name } => {
                        intent = Some(JoinIntent { room_id, display_name });
                        barrier.arm()
                    }
                    DriverCommand::AssignIdentity(identity) => barrier.identity_assigned(identity),
                    DriverCommand::AnnounceLeave { reply } => {
                        let sent = announce_leave(&channel, &barrier, intent.take()).await;
                        barrier.disarm();
                        deadline = None;
                        let _ = reply.send(sent);
                        None
                    }
                }
            }
            _ = wait_deadline(&mut deadline) => {
                deadline = None;
                let release = barrier.expire();
                if release.is_some() {
                    warn!(timeout_ms = join_timeout.as_millis() as u64, "Join barrier timed out, joining degraded");
                }
                release
            }
        };

        if let Some(release) = release {
            deadline = None;
            if let Some(intent) = &intent {
                send_join(&channel, intent, &release).await;
                listeners.emit(&SignalingEvent::Joined {
                    generation: release.generation,
                    degraded: release.degraded,
                });
            }
        } else if barrier.is_pending() && deadline.is_none() {
            deadline = Some(Box::pin(tokio::time::sleep(join_timeout)));
        }
    }
    debug!("Signaling driver stopped");
}

fn translate(msg: ServerMessage) -> SignalingEvent {
    match msg {
        ServerMessage::RoomUsers(users) => SignalingEvent::RosterSnapshot(users.participants),
        ServerMessage::UserConnected(participant) => SignalingEvent::ParticipantJoined(participant),
        ServerMessage::UserDisconnected(user) => SignalingEvent::ParticipantLeft {
            peer_id: user.peer_id,
        },
    }
}

async fn send_join(channel: &SignalingChannel, intent: &JoinIntent, release: &Release) {
    info!(
        room = %intent.room_id,
        peer_id = release.identity.as_deref().unwrap_or("-"),
        generation = release.generation,
        degraded = release.degraded,
        "Announcing room join"
    );
    let msg = ClientMessage::JoinRoom(JoinRoom {
        room_id: intent.room_id.clone(),
        peer_id: release.identity.clone(),
        display_name: intent.display_name.clone(),
    });
    if let Err(e) = channel.send(msg).await {
        warn!(error = %e, "Failed to queue join");
    }
}

async fn announce_leave(
    channel: &SignalingChannel,
    barrier: &JoinBarrier,
    intent: Option<JoinIntent>,
) -> Result<bool, SessionError> {
    let Some(intent) = intent else {
        return Ok(false);
    };
    if !barrier.is_released() || !channel.is_connected() {
        debug!("Skipping leave, join never reached the service");
        return Ok(false);
    }
    channel
        .send(ClientMessage::LeaveRoom(LeaveRoom {
            room_id: intent.room_id,
            peer_id: barrier.identity().map(str::to_string),
        }))
        .await?;
    info!("Announced room departure");
    Ok(true)
}
