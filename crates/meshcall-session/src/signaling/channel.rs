//! Transport-agnostic signaling channel.
//!
//! A [`Connector`] opens a channel: a command side the client writes
//! [`ClientMessage`]s into, and an event stream of [`ChannelEvent`]s. The
//! WebSocket implementation lives in `connection.rs`; [`LoopbackConnector`]
//! keeps both ends in memory.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use meshcall_common::SessionError;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::protocol::{ClientMessage, ServerMessage};

const CHANNEL_CAPACITY: usize = 64;

/// Something the channel observed.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Connected,
    Disconnected,
    Message(ServerMessage),
    Error(String),
}

/// Write side of an open signaling channel.
#[derive(Clone)]
pub struct SignalingChannel {
    outbound: mpsc::Sender<ClientMessage>,
    connected: Arc<AtomicBool>,
    shutdown: CancellationToken,
}

impl SignalingChannel {
    pub fn new(
        outbound: mpsc::Sender<ClientMessage>,
        connected: Arc<AtomicBool>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            outbound,
            connected,
            shutdown,
        }
    }

    /// Queue a message. Messages queued while disconnected go out after reconnect.
    pub async fn send(&self, msg: ClientMessage) -> Result<(), SessionError> {
        if self.shutdown.is_cancelled() {
            return Err(SessionError::SignalingUnavailable(
                "channel shut down".into(),
            ));
        }
        self.outbound
            .send(msg)
            .await
            .map_err(|_| SessionError::SignalingUnavailable("connection task stopped".into()))
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Flush queued messages and close the channel for good.
    pub fn disconnect(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

/// Opens signaling channels.
pub trait Connector: Send + Sync {
    fn open(&self) -> (SignalingChannel, mpsc::Receiver<ChannelEvent>);
}

/// In-memory connector. Each [`open`](Connector::open) hands the far end to
/// the paired [`LoopbackRemote`].
pub struct LoopbackConnector {
    ends: mpsc::UnboundedSender<LoopbackEnd>,
}

/// Receives the far end of every channel a [`LoopbackConnector`] opens.
pub struct LoopbackRemote {
    ends: mpsc::UnboundedReceiver<LoopbackEnd>,
}

impl LoopbackConnector {
    pub fn pair() -> (LoopbackConnector, LoopbackRemote) {
        let (tx, rx) = mpsc::unbounded_channel();
        (LoopbackConnector { ends: tx }, LoopbackRemote { ends: rx })
    }
}

impl Connector for LoopbackConnector {
    fn open(&self) -> (SignalingChannel, mpsc::Receiver<ChannelEvent>) {
        let (out_tx, out_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let connected = Arc::new(AtomicBool::new(false));
        let shutdown = CancellationToken::new();

        let channel = SignalingChannel::new(out_tx, Arc::clone(&connected), shutdown.clone());
        let _ = self.ends.send(LoopbackEnd {
            events: event_tx,
            outbound: out_rx,
            connected,
            shutdown,
        });
        (channel, event_rx)
    }
}

impl LoopbackRemote {
    pub async fn next_connection(&mut self) -> Option<LoopbackEnd> {
        self.ends.recv().await
    }

    pub fn try_next_connection(&mut self) -> Option<LoopbackEnd> {
        self.ends.try_recv().ok()
    }
}

/// The service side of a loopback channel.
pub struct LoopbackEnd {
    events: mpsc::Sender<ChannelEvent>,
    outbound: mpsc::Receiver<ClientMessage>,
    connected: Arc<AtomicBool>,
    shutdown: CancellationToken,
}

impl LoopbackEnd {
    pub async fn connect(&self) {
        self.connected.store(true, Ordering::SeqCst);
        let _ = self.events.send(ChannelEvent::Connected).await;
    }

    pub async fn drop_connection(&self) {
        self.connected.store(false, Ordering::SeqCst);
        let _ = self.events.send(ChannelEvent::Disconnected).await;
    }

    pub async fn deliver(&self, msg: ServerMessage) {
        let _ = self.events.send(ChannelEvent::Message(msg)).await;
    }

    pub async fn fail(&self, reason: impl Into<String>) {
        let _ = self.events.send(ChannelEvent::Error(reason.into())).await;
    }

    /// Next message the client queued, if any.
    pub fn try_next_sent(&mut self) -> Option<ClientMessage> {
        self.outbound.try_recv().ok()
    }

    pub fn drain_sent(&mut self) -> Vec<ClientMessage> {
        std::iter::from_fn(|| self.outbound.try_recv().ok()).collect()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}
