//! Room coordinator: one room visit from media acquisition to teardown.
//!
//! Owns every resource the visit creates. Events from signaling, the peer
//! transport, voice activity and internal timers are funnelled through
//! [`RoomCoordinator::next_wakeup`] and applied one at a time, so the
//! roster, the link table and the focus never change concurrently.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use meshcall_common::{new_correlation_id, EventBus, SessionError};
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::types::{
    LinkSummary, LocalSession, Participant, RoomEvent, RoomSnapshot, RoomState, Roster,
};
use crate::config::SessionConfig;
use crate::focus::{self, FocusInputs, FocusRule, FocusSelection, RemoteFeed};
use crate::media::{LocalMedia, MediaDevices, MediaTrackBundle, TrackKind};
use crate::peer::{
    AcceptOutcome, CallId, CallKind, EnsureOutcome, IncomingCall, LinkUpdate, PeerLinkManager,
    PeerTransport, TransportEvent, TransportFactory,
};
use crate::signaling::{
    Connector, EventStream, RemoteParticipant, SignalingClient, SignalingEvent,
};
use crate::voice_activity::{Speaker, VadHandle, VoiceActivity, VoiceActivityDetector};

const EVENT_CAPACITY: usize = 256;

/// External seams a room visit is built from.
#[derive(Clone)]
pub struct RoomDeps {
    pub devices: Arc<dyn MediaDevices>,
    pub transports: Arc<dyn TransportFactory>,
    pub connector: Arc<dyn Connector>,
}

#[derive(Debug)]
enum Timer {
    DialDue(String),
    NegotiationDeadline { peer_id: String, call_id: CallId },
}

#[derive(Debug)]
enum WakeupKind {
    Cancelled,
    Signaling(SignalingEvent),
    SignalingGone,
    Transport(TransportEvent),
    TransportGone,
    Activity(VoiceActivity),
    Timer(Timer),
}

/// One unit of work for [`RoomCoordinator::handle`].
#[derive(Debug)]
pub struct Wakeup(WakeupKind);

pub struct RoomCoordinator {
    room_id: String,
    display_name: String,
    visit: String,
    config: SessionConfig,
    state: RoomState,
    cancel: CancellationToken,

    media: LocalMedia,
    signaling: SignalingClient,
    signaling_events: Option<EventStream>,
    signaling_connected: bool,
    transport: Arc<dyn PeerTransport>,
    transport_events: Option<mpsc::Receiver<TransportEvent>>,
    links: PeerLinkManager,
    roster: Roster,
    session: LocalSession,

    local_screen: Option<MediaTrackBundle>,
    selection: FocusSelection,
    focus: Option<FocusRule>,
    focused_stream: Option<MediaTrackBundle>,

    local_vad: VoiceActivityDetector,
    remote_vad: VoiceActivityDetector,
    vad: HashMap<Speaker, VadHandle>,
    activity_tx: mpsc::UnboundedSender<VoiceActivity>,
    activity_rx: mpsc::UnboundedReceiver<VoiceActivity>,
    timer_tx: mpsc::UnboundedSender<Timer>,
    timer_rx: mpsc::UnboundedReceiver<Timer>,

    muted: bool,
    camera_enabled: bool,
    local_talking: bool,
    degraded_join: bool,
    voice_error: Option<String>,
    teardown_failure: Option<(&'static str, String)>,

    snapshot_tx: watch::Sender<RoomSnapshot>,
    events: EventBus<RoomEvent>,
}

impl RoomCoordinator {
    pub fn new(
        room_id: impl Into<String>,
        display_name: impl Into<String>,
        deps: &RoomDeps,
        config: SessionConfig,
    ) -> Self {
        let room_id = room_id.into();
        let display_name = display_name.into();

        let (transport, transport_events) = deps.transports.create(&config.ice_servers);
        let mut links = PeerLinkManager::new(Arc::clone(&transport), config.tie_break);
        links.set_display_name(display_name.clone());

        let (activity_tx, activity_rx) = mpsc::unbounded_channel();
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, _) = watch::channel(RoomSnapshot::new(&room_id, &display_name));

        Self {
            media: LocalMedia::new(Arc::clone(&deps.devices), config.synthetic.clone()),
            signaling: SignalingClient::new(
                Arc::clone(&deps.connector),
                config.join_barrier_timeout,
            ),
            signaling_events: None,
            signaling_connected: false,
            transport,
            transport_events: Some(transport_events),
            links,
            roster: Roster::default(),
            session: LocalSession::default(),
            local_screen: None,
            selection: FocusSelection::None,
            focus: None,
            focused_stream: None,
            local_vad: VoiceActivityDetector::new(config.local_vad.clone()),
            remote_vad: VoiceActivityDetector::new(config.remote_vad.clone()),
            vad: HashMap::new(),
            activity_tx,
            activity_rx,
            timer_tx,
            timer_rx,
            muted: false,
            camera_enabled: true,
            local_talking: false,
            degraded_join: false,
            voice_error: None,
            teardown_failure: None,
            snapshot_tx,
            events: EventBus::new(EVENT_CAPACITY),
            visit: new_correlation_id(),
            state: RoomState::Initializing,
            cancel: CancellationToken::new(),
            room_id,
            display_name,
            config,
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn state(&self) -> RoomState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == RoomState::Closed
    }

    /// Cancelling the token makes the visit leave at its next wakeup.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<RoomSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoomEvent> {
        self.events.subscribe()
    }

    pub fn events(&self) -> EventBus<RoomEvent> {
        self.events.clone()
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn links(&self) -> &PeerLinkManager {
        &self.links
    }

    pub fn local_session(&self) -> &LocalSession {
        &self.session
    }

    pub fn focused_stream(&self) -> Option<&MediaTrackBundle> {
        self.focused_stream.as_ref()
    }

    /// Outcome of the first teardown, for callers that arrive after it ran.
    pub fn teardown_outcome(&self) -> Result<(), SessionError> {
        match &self.teardown_failure {
            Some((step, reason)) => Err(SessionError::TeardownPartialFailure {
                step: *step,
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Acquire media, connect signaling and arm the join.
    ///
    /// Media and the signaling connection are started concurrently. A
    /// microphone failure is recorded and the visit continues without voice.
    /// Calling this again after the first call is a no-op.
    pub async fn initialize(&mut self) -> Result<(), SessionError> {
        if self.state != RoomState::Initializing || self.cancel.is_cancelled() {
            debug!(room = %self.room_id, state = ?self.state, "Room already initialized");
            return Ok(());
        }
        info!(room = %self.room_id, visit = %self.visit, "Entering room");

        self.signaling_events = Some(self.signaling.subscribe());
        self.signaling.connect()?;

        let media = &self.media;
        let acquired = tokio::select! {
            _ = self.cancel.cancelled() => None,
            pair = async {
                tokio::join!(media.acquire(TrackKind::Audio), media.acquire(TrackKind::Video))
            } => Some(pair),
        };
        let Some((audio, video)) = acquired else {
            info!(room = %self.room_id, "Room visit cancelled during setup");
            return Err(SessionError::Cancelled);
        };

        let mut bundle = MediaTrackBundle::new();
        match audio {
            Ok(audio) => bundle = bundle.merge(audio),
            Err(SessionError::Cancelled) => return Err(SessionError::Cancelled),
            Err(e) => {
                warn!(room = %self.room_id, error = %e, "Continuing without voice");
                self.voice_error = Some(e.to_string());
                self.events.publish(RoomEvent::Error(e.to_string()));
            }
        }
        bundle = bundle.merge(video?);
        if self.cancel.is_cancelled() {
            return Err(SessionError::Cancelled);
        }

        if let Some(handle) =
            self.local_vad
                .attach(&bundle, Speaker::Local, Some(self.activity_tx.clone()))
        {
            self.vad.insert(Speaker::Local, handle);
        }
        self.session.media_bundle = bundle;

        self.set_state(RoomState::Joining);
        self.signaling
            .announce_join(self.room_id.clone(), self.display_name.clone())
            .await?;
        self.refresh();
        Ok(())
    }

    /// Wait for the next event. Cancel-safe. Returns `None` once closed.
    pub async fn next_wakeup(&mut self) -> Option<Wakeup> {
        if self.state == RoomState::Closed {
            return None;
        }
        let watch_cancel = !self.state.is_finished();
        let signaling = self.signaling_events.as_mut();
        let transport = self.transport_events.as_mut();

        let kind = tokio::select! {
            _ = self.cancel.cancelled(), if watch_cancel => WakeupKind::Cancelled,
            event = recv_signaling(signaling) => match event {
                Some(event) => WakeupKind::Signaling(event),
                None => WakeupKind::SignalingGone,
            },
            event = recv_transport(transport) => match event {
                Some(event) => WakeupKind::Transport(event),
                None => WakeupKind::TransportGone,
            },
            Some(activity) = self.activity_rx.recv() => WakeupKind::Activity(activity),
            Some(timer) = self.timer_rx.recv() => WakeupKind::Timer(timer),
        };
        Some(Wakeup(kind))
    }

    /// Apply one wakeup and publish the resulting snapshot.
    pub async fn handle(&mut self, wakeup: Wakeup) {
        match wakeup.0 {
            WakeupKind::Cancelled => {
                if let Err(e) = self.leave().await {
                    warn!(room = %self.room_id, error = %e, "Teardown incomplete");
                }
            }
            WakeupKind::Signaling(event) => self.on_signaling(event).await,
            WakeupKind::SignalingGone => {
                debug!("Signaling event stream ended");
                self.signaling_events = None;
                self.signaling_connected = false;
            }
            WakeupKind::Transport(event) => self.on_transport(event).await,
            WakeupKind::TransportGone => {
                warn!(room = %self.room_id, "Peer transport went away");
                self.transport_events = None;
            }
            WakeupKind::Activity(activity) => self.on_activity(activity),
            WakeupKind::Timer(timer) => self.on_timer(timer).await,
        }
        self.refresh();
    }

    /// Process one wakeup. Returns false once the room is closed.
    pub async fn step(&mut self) -> bool {
        match self.next_wakeup().await {
            Some(wakeup) => {
                self.handle(wakeup).await;
                true
            }
            None => false,
        }
    }

    /// Toggle focus on a remote participant. Peers without a stream are ignored.
    pub fn focus_peer(&mut self, peer_id: &str) {
        let target = FocusSelection::Peer(peer_id.to_string());
        if self.selection == target {
            self.selection = FocusSelection::None;
        } else if self
            .links
            .get(peer_id)
            .is_some_and(|l| l.remote_stream.is_some())
        {
            self.selection = target;
        } else {
            debug!(peer_id, "Ignoring focus on a peer without a stream");
            return;
        }
        self.refresh();
    }

    /// Toggle focus on screen shares.
    pub fn focus_screen(&mut self) {
        self.selection = match self.selection {
            FocusSelection::Screen => FocusSelection::None,
            _ => FocusSelection::Screen,
        };
        self.refresh();
    }

    pub fn clear_focus(&mut self) {
        self.selection = FocusSelection::None;
        self.refresh();
    }

    /// Share the screen with every connected peer and anyone who connects later.
    pub async fn start_screen_share(&mut self) -> Result<(), SessionError> {
        if !self.state.is_live() {
            return Err(SessionError::InvalidState(format!(
                "cannot share screen while {:?}",
                self.state
            )));
        }
        if self.local_screen.is_some() {
            return Ok(());
        }
        let screen = self.media.acquire_screen().await?;
        let placed = self.links.share_screen_all(&screen).await;
        info!(room = %self.room_id, peers = placed, "Screen share started");
        self.local_screen = Some(screen);
        self.refresh();
        Ok(())
    }

    pub async fn stop_screen_share(&mut self) -> Result<(), SessionError> {
        if self.local_screen.take().is_none() {
            return Ok(());
        }
        let closed = self.links.stop_screen_all().await;
        let result = self.media.release_screen();
        info!(room = %self.room_id, peers = closed, "Screen share stopped");
        if self.selection == FocusSelection::Screen && !self.any_remote_screen() {
            self.selection = FocusSelection::None;
        }
        self.refresh();
        result
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.media.set_enabled(TrackKind::Audio, !muted);
        self.muted = muted;
        if muted && self.local_talking {
            self.local_talking = false;
            self.events.publish(RoomEvent::TalkingChanged {
                peer_id: None,
                talking: false,
            });
        }
        self.refresh();
    }

    pub fn set_camera_enabled(&mut self, enabled: bool) {
        self.media.set_enabled(TrackKind::Video, enabled);
        self.camera_enabled = enabled;
        self.refresh();
    }

    /// Tear the visit down. Runs at most once; later calls return `Ok`.
    ///
    /// Steps run in order and each runs even if an earlier one failed:
    /// announce departure, close links and the transport, release media,
    /// disconnect signaling. The first failure is returned.
    pub async fn leave(&mut self) -> Result<(), SessionError> {
        if self.state.is_finished() {
            debug!(room = %self.room_id, "Room already left");
            return Ok(());
        }
        info!(room = %self.room_id, visit = %self.visit, "Leaving room");
        self.cancel.cancel();
        self.set_state(RoomState::Leaving);

        let mut failure = None;

        let signaling = &self.signaling;
        run_step(
            "announce-leave",
            async { signaling.announce_leave().await.map(|_| ()) },
            &mut failure,
        )
        .await;

        let links = &mut self.links;
        let transport = &self.transport;
        run_step(
            "close-links",
            async {
                let closed = links.close_all().await.map(|_| ());
                let destroyed = transport.destroy().await;
                closed.and(destroyed)
            },
            &mut failure,
        )
        .await;

        self.vad.clear();
        let media = &self.media;
        run_step("release-media", async { media.release() }, &mut failure).await;
        self.local_screen = None;

        let signaling = &mut self.signaling;
        run_step(
            "disconnect-signaling",
            async {
                signaling.disconnect();
                Ok(())
            },
            &mut failure,
        )
        .await;

        self.signaling_events = None;
        self.transport_events = None;
        self.signaling_connected = false;
        self.local_talking = false;
        self.set_state(RoomState::Closed);
        self.refresh();

        self.teardown_failure = failure;
        match self.teardown_outcome() {
            Ok(()) => {
                info!(room = %self.room_id, "Left room");
                Ok(())
            }
            Err(e) => {
                warn!(room = %self.room_id, error = %e, "Left room with errors");
                Err(e)
            }
        }
    }

    async fn on_signaling(&mut self, event: SignalingEvent) {
        match event {
            SignalingEvent::Connected => self.signaling_connected = true,
            SignalingEvent::Disconnected => self.signaling_connected = false,
            SignalingEvent::Joined {
                generation,
                degraded,
            } => {
                info!(room = %self.room_id, generation, degraded, "Joined room");
                self.session.joined_room = true;
                self.degraded_join = degraded;
                if self.state == RoomState::Joining {
                    self.set_state(RoomState::Active);
                }
            }
            SignalingEvent::RosterSnapshot(list) => self.reconcile_roster(list).await,
            SignalingEvent::ParticipantJoined(participant) => self.participant_joined(participant),
            SignalingEvent::ParticipantLeft { peer_id } => self.participant_left(&peer_id).await,
            SignalingEvent::Error(reason) => {
                warn!(room = %self.room_id, reason = %reason, "Signaling error");
                self.events.publish(RoomEvent::Error(reason));
            }
        }
    }

    async fn reconcile_roster(&mut self, list: Vec<RemoteParticipant>) {
        if !self.state.is_live() {
            return;
        }
        let me = self.session.local_identity.clone();
        let members: Vec<Participant> = list
            .into_iter()
            .filter(|p| me.as_deref() != Some(p.peer_id.as_str()))
            .map(|p| Participant::new(p.peer_id, p.display_name))
            .collect();
        let added: Vec<Participant> = members
            .iter()
            .filter(|p| !self.roster.contains(&p.peer_id))
            .cloned()
            .collect();

        // A caller that reached us before the service listed it keeps its
        // entry while its link is up.
        let links = &self.links;
        let removed = self
            .roster
            .replace(members, |p| links.contains(&p.peer_id));
        for peer_id in removed {
            self.drop_peer(&peer_id).await;
            self.events.publish(RoomEvent::ParticipantLeft { peer_id });
        }
        for participant in added {
            self.events.publish(RoomEvent::ParticipantJoined(participant));
        }
        info!(room = %self.room_id, count = self.roster.len(), "Roster snapshot applied");

        for peer_id in self.roster.ids() {
            self.dial(&peer_id).await;
        }
    }

    fn participant_joined(&mut self, remote: RemoteParticipant) {
        if !self.state.is_live()
            || self.session.local_identity.as_deref() == Some(remote.peer_id.as_str())
        {
            return;
        }
        let participant = Participant::new(remote.peer_id.clone(), remote.display_name);
        if self.roster.upsert(participant.clone()) {
            info!(room = %self.room_id, peer_id = %remote.peer_id, "Participant joined");
            self.events.publish(RoomEvent::ParticipantJoined(participant));
        }
        self.schedule(self.config.dial_delay, Timer::DialDue(remote.peer_id));
    }

    async fn participant_left(&mut self, peer_id: &str) {
        let removed = self.roster.remove(peer_id);
        self.drop_peer(peer_id).await;
        if removed.is_some() {
            info!(room = %self.room_id, peer_id, "Participant left");
            self.events.publish(RoomEvent::ParticipantLeft {
                peer_id: peer_id.to_string(),
            });
        }
    }

    async fn dial(&mut self, peer_id: &str) {
        if !self.state.is_live() || self.cancel.is_cancelled() || !self.roster.contains(peer_id) {
            debug!(peer_id, "Skipping dial");
            return;
        }
        match self
            .links
            .ensure_link(peer_id, &self.session.media_bundle)
            .await
        {
            Ok(EnsureOutcome::Dialing(call_id)) => self.arm_negotiation_deadline(peer_id, call_id),
            Ok(_) => {}
            Err(e) => {
                warn!(peer_id, error = %e, "Dial failed");
                self.events.publish(RoomEvent::LinkFailed {
                    peer_id: peer_id.to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }

    async fn on_transport(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Open { identity } => {
                if self.state.is_finished() {
                    return;
                }
                info!(room = %self.room_id, identity = %identity, "Peer transport open");
                self.session.local_identity = Some(identity.clone());
                self.links.set_local_identity(identity.clone());
                self.roster.remove(&identity);
                if let Err(e) = self.signaling.assign_identity(identity).await {
                    warn!(error = %e, "Could not hand identity to signaling");
                }
            }
            TransportEvent::Incoming(call) => self.incoming_call(call).await,
            TransportEvent::Stream { call_id, bundle } => {
                let update = self.links.handle_stream(call_id, bundle);
                self.apply_link_update(update).await;
            }
            TransportEvent::Closed { call_id } => {
                let update = self.links.handle_closed(call_id).await;
                self.apply_link_update(update).await;
            }
            TransportEvent::Failed { call_id, reason } => {
                let update = self.links.handle_failed(call_id, reason).await;
                self.apply_link_update(update).await;
            }
        }
    }

    async fn incoming_call(&mut self, call: IncomingCall) {
        if !self.state.is_live() || self.cancel.is_cancelled() {
            debug!(peer_id = %call.peer_id, "Ignoring call outside an active visit");
            let _ = self.transport.close(call.call_id).await;
            return;
        }

        let peer_id = call.peer_id.clone();
        if call.metadata.kind == CallKind::Camera && !self.roster.contains(&peer_id) {
            let mut participant = Participant::new(
                peer_id.clone(),
                call.metadata
                    .display_name
                    .clone()
                    .unwrap_or_else(|| peer_id.clone()),
            );
            participant.provisional = true;
            info!(peer_id = %peer_id, "Call from unannounced peer, adding provisionally");
            self.roster.upsert(participant.clone());
            self.events.publish(RoomEvent::ParticipantJoined(participant));
        }

        match self
            .links
            .accept_incoming(call, &self.session.media_bundle)
            .await
        {
            Ok(AcceptOutcome::Answered(call_id)) => self.arm_negotiation_deadline(&peer_id, call_id),
            Ok(_) => {}
            Err(e) => {
                warn!(peer_id = %peer_id, error = %e, "Could not answer call");
                self.events.publish(RoomEvent::LinkFailed {
                    peer_id,
                    reason: e.to_string(),
                });
            }
        }
    }

    async fn apply_link_update(&mut self, update: LinkUpdate) {
        match update {
            LinkUpdate::Unchanged => {}
            LinkUpdate::Connected { peer_id } => {
                let stream = self
                    .links
                    .get(&peer_id)
                    .and_then(|l| l.remote_stream.clone());
                if let Some(stream) = stream {
                    let speaker = Speaker::Remote(peer_id.clone());
                    if let Some(handle) = self.remote_vad.attach(
                        &stream,
                        speaker.clone(),
                        Some(self.activity_tx.clone()),
                    ) {
                        self.vad.insert(speaker, handle);
                    }
                }
                if let Some(screen) = self.local_screen.clone() {
                    if let Err(e) = self.links.share_screen(&peer_id, &screen).await {
                        warn!(peer_id = %peer_id, error = %e, "Failed to share screen");
                    }
                }
                self.events.publish(RoomEvent::LinkConnected { peer_id });
            }
            LinkUpdate::RemoteScreen { peer_id, present } => {
                if present {
                    info!(peer_id = %peer_id, "Remote screen share, moving focus");
                    self.selection = FocusSelection::Screen;
                } else if self.selection == FocusSelection::Screen
                    && !self.any_remote_screen()
                    && self.local_screen.is_none()
                {
                    self.selection = FocusSelection::None;
                }
            }
            LinkUpdate::Closed(link) => {
                self.forget_link(&link.peer_id);
                self.events.publish(RoomEvent::LinkClosed {
                    peer_id: link.peer_id,
                });
            }
            LinkUpdate::Failed { link, reason } => {
                self.forget_link(&link.peer_id);
                self.events.publish(RoomEvent::LinkFailed {
                    peer_id: link.peer_id,
                    reason,
                });
            }
        }
    }

    fn on_activity(&mut self, activity: VoiceActivity) {
        if self.state.is_finished() || !self.vad.contains_key(&activity.speaker) {
            return;
        }
        match activity.speaker {
            Speaker::Local => {
                if self.local_talking != activity.talking {
                    self.local_talking = activity.talking;
                    self.events.publish(RoomEvent::TalkingChanged {
                        peer_id: None,
                        talking: activity.talking,
                    });
                }
            }
            Speaker::Remote(peer_id) => {
                if self.roster.set_talking(&peer_id, activity.talking) {
                    self.events.publish(RoomEvent::TalkingChanged {
                        peer_id: Some(peer_id),
                        talking: activity.talking,
                    });
                }
            }
        }
    }

    async fn on_timer(&mut self, timer: Timer) {
        match timer {
            Timer::DialDue(peer_id) => self.dial(&peer_id).await,
            Timer::NegotiationDeadline { peer_id, call_id } => {
                if !self.links.is_pending_call(&peer_id, call_id) {
                    return;
                }
                warn!(peer_id = %peer_id, %call_id, "Peer negotiation timed out");
                if self.links.close(&peer_id).await.is_some() {
                    self.forget_link(&peer_id);
                    let error = SessionError::PeerNegotiationFailed {
                        peer_id: peer_id.clone(),
                        reason: "negotiation timed out".into(),
                    };
                    self.events.publish(RoomEvent::LinkFailed {
                        peer_id,
                        reason: error.to_string(),
                    });
                }
            }
        }
    }

    async fn drop_peer(&mut self, peer_id: &str) {
        if self.links.close(peer_id).await.is_some() {
            self.events.publish(RoomEvent::LinkClosed {
                peer_id: peer_id.to_string(),
            });
        }
        self.forget_link(peer_id);
    }

    fn forget_link(&mut self, peer_id: &str) {
        self.vad.remove(&Speaker::Remote(peer_id.to_string()));
        self.roster.set_talking(peer_id, false);
        if self.selection == FocusSelection::Peer(peer_id.to_string()) {
            self.selection = FocusSelection::None;
        }
    }

    fn any_remote_screen(&self) -> bool {
        self.links.links().any(|l| l.remote_screen.is_some())
    }

    fn arm_negotiation_deadline(&self, peer_id: &str, call_id: CallId) {
        if let Some(timeout) = self.config.negotiation_timeout {
            self.schedule(
                timeout,
                Timer::NegotiationDeadline {
                    peer_id: peer_id.to_string(),
                    call_id,
                },
            );
        }
    }

    fn schedule(&self, after: Duration, timer: Timer) {
        let tx = self.timer_tx.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(after) => {
                    let _ = tx.send(timer);
                }
            }
        });
    }

    fn set_state(&mut self, next: RoomState) {
        if next <= self.state {
            return;
        }
        debug!(room = %self.room_id, from = ?self.state, to = ?next, "Room state change");
        self.state = next;
        self.events.publish(RoomEvent::StateChanged(next));
    }

    fn refresh(&mut self) {
        let remotes: BTreeMap<String, RemoteFeed> = self
            .links
            .links()
            .map(|l| {
                let feed = RemoteFeed {
                    camera: l.remote_stream.clone(),
                    screen: l.remote_screen.clone(),
                };
                (l.peer_id.clone(), feed)
            })
            .collect();
        let local_camera =
            (!self.session.media_bundle.is_empty()).then_some(&self.session.media_bundle);
        let focus = focus::resolve(&FocusInputs {
            local_camera,
            local_screen: self.local_screen.as_ref(),
            remotes: &remotes,
            selection: &self.selection,
        });

        if self.focus.as_ref() != Some(&focus.rule) {
            debug!(rule = ?focus.rule, "Focus changed");
            self.focus = Some(focus.rule.clone());
            self.events.publish(RoomEvent::FocusChanged(focus.rule));
        }
        self.focused_stream = focus.stream;

        let mut links: Vec<LinkSummary> = self.links.links().map(LinkSummary::from).collect();
        links.sort_by(|a, b| a.peer_id.cmp(&b.peer_id));

        let snapshot = RoomSnapshot {
            room_id: self.room_id.clone(),
            display_name: self.display_name.clone(),
            state: self.state,
            local_identity: self.session.local_identity.clone(),
            signaling_connected: self.signaling_connected,
            joined_room: self.session.joined_room,
            degraded_join: self.degraded_join,
            participants: self.roster.iter().cloned().collect(),
            links,
            selection: self.selection.clone(),
            focus: self.focus.clone(),
            local_talking: self.local_talking,
            muted: self.muted,
            camera_enabled: self.camera_enabled,
            sharing_screen: self.local_screen.is_some(),
            voice_error: self.voice_error.clone(),
        };
        self.snapshot_tx.send_replace(snapshot);
    }
}

async fn recv_signaling(stream: Option<&mut EventStream>) -> Option<SignalingEvent> {
    match stream {
        Some(stream) => stream.recv().await,
        None => std::future::pending().await,
    }
}

async fn recv_transport(
    events: Option<&mut mpsc::Receiver<TransportEvent>>,
) -> Option<TransportEvent> {
    match events {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}

/// Run one teardown step, recording its failure or panic without stopping.
async fn run_step<F>(step: &'static str, fut: F, failure: &mut Option<(&'static str, String)>)
where
    F: Future<Output = Result<(), SessionError>>,
{
    let reason = match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(())) => return,
        Ok(Err(e)) => e.to_string(),
        Err(_) => "step panicked".to_string(),
    };
    warn!(step, reason = %reason, "Teardown step failed");
    failure.get_or_insert((step, reason));
}
