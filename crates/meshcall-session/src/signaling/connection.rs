//! WebSocket signaling connection with auto-reconnect and heartbeat.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use meshcall_config::schema::SignalingConfig;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::channel::{ChannelEvent, Connector, SignalingChannel};
use super::protocol::{ClientMessage, ServerMessage};

const CHANNEL_CAPACITY: usize = 64;

type WsWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;

/// Opens WebSocket channels to the configured signaling service.
pub struct WsConnector {
    config: SignalingConfig,
}

impl WsConnector {
    pub fn new(config: SignalingConfig) -> Self {
        Self { config }
    }
}

impl Connector for WsConnector {
    fn open(&self) -> (SignalingChannel, mpsc::Receiver<ChannelEvent>) {
        let (out_tx, out_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let connected = Arc::new(AtomicBool::new(false));
        let shutdown = CancellationToken::new();

        tokio::spawn(connection_loop(
            self.config.clone(),
            Arc::clone(&connected),
            event_tx,
            out_rx,
            shutdown.clone(),
        ));

        (SignalingChannel::new(out_tx, connected, shutdown), event_rx)
    }
}

enum SessionEnd {
    Lost,
    Shutdown,
}

/// Background task owning the socket. Reconnects with exponential backoff
/// until the channel is shut down.
pub(crate) async fn connection_loop(
    config: SignalingConfig,
    connected: Arc<AtomicBool>,
    event_tx: mpsc::Sender<ChannelEvent>,
    mut outbound: mpsc::Receiver<ClientMessage>,
    shutdown: CancellationToken,
) {
    let mut reconnect_delay = config.reconnect_delay_secs.max(1);

    loop {
        info!(url = %config.url, "Connecting to signaling service");

        let attempt = tokio::time::timeout(
            Duration::from_secs(config.connect_timeout_secs),
            tokio_tungstenite::connect_async(config.url.as_str()),
        );
        let result = tokio::select! {
            _ = shutdown.cancelled() => return,
            result = attempt => result,
        };

        match result {
            Ok(Ok((ws_stream, _))) => {
                reconnect_delay = config.reconnect_delay_secs.max(1);
                connected.store(true, Ordering::SeqCst);
                let _ = event_tx.send(ChannelEvent::Connected).await;

                let end = run_session(ws_stream, &config, &event_tx, &mut outbound, &shutdown).await;

                connected.store(false, Ordering::SeqCst);
                let _ = event_tx.send(ChannelEvent::Disconnected).await;
                if matches!(end, SessionEnd::Shutdown) {
                    info!("Signaling channel closed");
                    return;
                }
            }
            Ok(Err(e)) => {
                error!(error = %e, "Failed to connect to signaling service");
                let _ = event_tx
                    .send(ChannelEvent::Error(format!("connection failed: {e}")))
                    .await;
            }
            Err(_) => {
                error!("Signaling connection timed out");
                let _ = event_tx
                    .send(ChannelEvent::Error("connection timed out".into()))
                    .await;
            }
        }

        info!(delay_secs = reconnect_delay, "Reconnecting to signaling service");
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep(Duration::from_secs(reconnect_delay)) => {}
        }
        reconnect_delay = (reconnect_delay * 2).min(config.max_reconnect_delay_secs.max(1));
    }
}

async fn run_session(
    ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    config: &SignalingConfig,
    event_tx: &mpsc::Sender<ChannelEvent>,
    outbound: &mut mpsc::Receiver<ClientMessage>,
    shutdown: &CancellationToken,
) -> SessionEnd {
    let (mut write, mut read) = ws_stream.split();
    let mut heartbeat =
        tokio::time::interval(Duration::from_secs(config.heartbeat_interval_secs.max(1)));
    heartbeat.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                while let Ok(msg) = outbound.try_recv() {
                    if !send_json(&mut write, &msg).await {
                        break;
                    }
                }
                let _ = write.send(WsMessage::Close(None)).await;
                return SessionEnd::Shutdown;
            }
            msg = outbound.recv() => match msg {
                Some(msg) => {
                    if !send_json(&mut write, &msg).await {
                        return SessionEnd::Lost;
                    }
                }
                None => {
                    let _ = write.send(WsMessage::Close(None)).await;
                    return SessionEnd::Shutdown;
                }
            },
            _ = heartbeat.tick() => {
                if write.send(WsMessage::Ping(Default::default())).await.is_err() {
                    warn!("Heartbeat failed, connection lost");
                    return SessionEnd::Lost;
                }
            }
            frame = read.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    match serde_json::from_str::<ServerMessage>(&text) {
                        Ok(msg) => {
                            let _ = event_tx.send(ChannelEvent::Message(msg)).await;
                        }
                        Err(e) => debug!(error = %e, text = %text, "Ignoring unrecognized signaling frame"),
                    }
                }
                Some(Ok(WsMessage::Close(_))) | None => {
                    info!("Signaling service closed connection");
                    return SessionEnd::Lost;
                }
                Some(Err(e)) => {
                    warn!(error = %e, "WebSocket error");
                    return SessionEnd::Lost;
                }
                Some(Ok(_)) => {}
            },
        }
    }
}

async fn send_json(write: &mut WsWriter, msg: &ClientMessage) -> bool {
    let json = match serde_json::to_string(msg) {
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, "Failed to serialize signaling message");
            return true;
        }
    };
    match write.send(WsMessage::Text(json.into())).await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "Failed to send signaling message");
            false
        }
    }
}
