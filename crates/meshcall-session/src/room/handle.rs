//! Actor wrapper: runs a [`RoomCoordinator`] on its own task and exposes
//! user actions as messages.

use meshcall_common::{EventBus, SessionError};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::coordinator::RoomCoordinator;
use super::types::{RoomEvent, RoomSnapshot, RoomState};

type Reply = oneshot::Sender<Result<(), SessionError>>;

enum RoomCommand {
    FocusPeer(String),
    FocusScreen,
    ClearFocus,
    StartScreenShare(Reply),
    StopScreenShare(Reply),
    SetMuted(bool),
    SetCameraEnabled(bool),
    Leave(Reply),
}

/// Handle to a running room. Dropping it leaves the room.
pub struct RoomHandle {
    room_id: String,
    commands: mpsc::Sender<RoomCommand>,
    snapshot: watch::Receiver<RoomSnapshot>,
    events: EventBus<RoomEvent>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl RoomHandle {
    /// Start the visit on a new task.
    pub fn spawn(coordinator: RoomCoordinator) -> Self {
        let (tx, rx) = mpsc::channel(32);
        let room_id = coordinator.room_id().to_string();
        let snapshot = coordinator.watch();
        let events = coordinator.events();
        let cancel = coordinator.cancel_token();
        let task = tokio::spawn(run_room(coordinator, rx));
        Self {
            room_id,
            commands: tx,
            snapshot,
            events,
            cancel,
            task,
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<RoomSnapshot> {
        self.snapshot.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoomEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> RoomState {
        self.snapshot.borrow().state
    }

    /// True once teardown has started.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.state().is_finished()
    }

    pub async fn focus_peer(&self, peer_id: impl Into<String>) -> Result<(), SessionError> {
        self.send(RoomCommand::FocusPeer(peer_id.into())).await
    }

    pub async fn focus_screen(&self) -> Result<(), SessionError> {
        self.send(RoomCommand::FocusScreen).await
    }

    pub async fn clear_focus(&self) -> Result<(), SessionError> {
        self.send(RoomCommand::ClearFocus).await
    }

    pub async fn set_muted(&self, muted: bool) -> Result<(), SessionError> {
        self.send(RoomCommand::SetMuted(muted)).await
    }

    pub async fn set_camera_enabled(&self, enabled: bool) -> Result<(), SessionError> {
        self.send(RoomCommand::SetCameraEnabled(enabled)).await
    }

    pub async fn start_screen_share(&self) -> Result<(), SessionError> {
        self.request(RoomCommand::StartScreenShare).await
    }

    pub async fn stop_screen_share(&self) -> Result<(), SessionError> {
        self.request(RoomCommand::StopScreenShare).await
    }

    /// Leave the room and wait for teardown. Repeated calls report the
    /// outcome of the first teardown.
    pub async fn leave(&self) -> Result<(), SessionError> {
        self.cancel.cancel();
        match self.request(RoomCommand::Leave).await {
            Err(SessionError::InvalidState(_)) => Ok(()),
            other => other,
        }
    }

    async fn send(&self, command: RoomCommand) -> Result<(), SessionError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SessionError::InvalidState("room task stopped".into()))
    }

    async fn request(&self, command: fn(Reply) -> RoomCommand) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(command(reply)).await?;
        rx.await
            .map_err(|_| SessionError::InvalidState("room task stopped".into()))?
    }
}

impl Drop for RoomHandle {
    fn drop(&mut self) {
        if !self.task.is_finished() {
            debug!(room = %self.room_id, "Room handle dropped");
        }
        self.cancel.cancel();
    }
}

/// Drive the coordinator until every handle is gone.
///
/// After the room closes the task keeps answering commands so late
/// callers still see the teardown outcome.
async fn run_room(mut room: RoomCoordinator, mut commands: mpsc::Receiver<RoomCommand>) {
    if let Err(e) = room.initialize().await {
        match e {
            SessionError::Cancelled => debug!(room = %room.room_id(), "Setup cancelled"),
            e => error!(room = %room.room_id(), error = %e, "Room setup failed"),
        }
        let _ = room.leave().await;
    }

    loop {
        if room.is_closed() {
            match commands.recv().await {
                Some(command) => apply(&mut room, command).await,
                None => break,
            }
            continue;
        }

        tokio::select! {
            command = commands.recv() => match command {
                Some(command) => apply(&mut room, command).await,
                None => {
                    let _ = room.leave().await;
                    break;
                }
            },
            wakeup = room.next_wakeup() => {
                if let Some(wakeup) = wakeup {
                    room.handle(wakeup).await;
                }
            }
        }
    }
    info!(room = %room.room_id(), "Room task finished");
}

async fn apply(room: &mut RoomCoordinator, command: RoomCommand) {
    match command {
        RoomCommand::FocusPeer(peer_id) => room.focus_peer(&peer_id),
        RoomCommand::FocusScreen => room.focus_screen(),
        RoomCommand::ClearFocus => room.clear_focus(),
        RoomCommand::SetMuted(muted) => room.set_muted(muted),
        RoomCommand::SetCameraEnabled(enabled) => room.set_camera_enabled(enabled),
        RoomCommand::StartScreenShare(reply) => {
            let _ = reply.send(room.start_screen_share().await);
        }
        RoomCommand::StopScreenShare(reply) => {
            let _ = reply.send(room.stop_screen_share().await);
        }
        RoomCommand::Leave(reply) => {
            let _ = room.leave().await;
            let _ = reply.send(room.teardown_outcome());
        }
    }
}
