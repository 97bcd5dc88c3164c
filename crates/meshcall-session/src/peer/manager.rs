//! Peer link table: at most one link per remote participant, keyed by peer id.

use std::collections::HashMap;
use std::sync::Arc;

use meshcall_common::SessionError;
use meshcall_config::TieBreak;
use tracing::{debug, info, warn};

use super::link::{Direction, LinkState, PeerLink};
use super::transport::{CallId, CallKind, CallMetadata, IncomingCall, PeerTransport};
use crate::media::MediaTrackBundle;

/// Result of [`PeerLinkManager::ensure_link`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// A new outgoing call was placed.
    Dialing(CallId),
    /// A link already exists; nothing was done.
    Existing(LinkState),
    /// The remote side dials this pair.
    AwaitingRemote,
}

/// Result of [`PeerLinkManager::accept_incoming`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptOutcome {
    Answered(CallId),
    ScreenAnswered(CallId),
    /// Glare lost by the caller, or a screen call with no link to attach to.
    Declined,
}

/// What a transport event changed.
#[derive(Debug, Clone)]
pub enum LinkUpdate {
    Unchanged,
    Connected { peer_id: String },
    RemoteScreen { peer_id: String, present: bool },
    Closed(PeerLink),
    Failed { link: PeerLink, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallRole {
    Camera,
    ScreenIn,
    ScreenOut,
}

pub struct PeerLinkManager {
    transport: Arc<dyn PeerTransport>,
    tie_break: TieBreak,
    local_identity: Option<String>,
    display_name: Option<String>,
    links: HashMap<String, PeerLink>,
    calls: HashMap<CallId, (String, CallRole)>,
}

impl PeerLinkManager {
    pub fn new(transport: Arc<dyn PeerTransport>, tie_break: TieBreak) -> Self {
        Self {
            transport,
            tie_break,
            local_identity: None,
            display_name: None,
            links: HashMap::new(),
            calls: HashMap::new(),
        }
    }

    pub fn set_local_identity(&mut self, identity: impl Into<String>) {
        self.local_identity = Some(identity.into());
    }

    pub fn local_identity(&self) -> Option<&str> {
        self.local_identity.as_deref()
    }

    pub fn set_display_name(&mut self, name: impl Into<String>) {
        self.display_name = Some(name.into());
    }

    pub fn get(&self, peer_id: &str) -> Option<&PeerLink> {
        self.links.get(peer_id)
    }

    pub fn contains(&self, peer_id: &str) -> bool {
        self.links.contains_key(peer_id)
    }

    pub fn links(&self) -> impl Iterator<Item = &PeerLink> {
        self.links.values()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// The link to `peer_id` is still negotiating on `call_id`.
    pub fn is_pending_call(&self, peer_id: &str, call_id: CallId) -> bool {
        self.links
            .get(peer_id)
            .is_some_and(|l| l.state.is_pending() && l.call_id == Some(call_id))
    }

    /// Dial `peer_id` unless a link exists or the tie-break leaves it to them.
    pub async fn ensure_link(
        &mut self,
        peer_id: &str,
        local: &MediaTrackBundle,
    ) -> Result<EnsureOutcome, SessionError> {
        if self.local_identity.as_deref() == Some(peer_id) {
            return Err(SessionError::InvalidState("cannot link to self".into()));
        }
        if let Some(link) = self.links.get(peer_id) {
            if link.state.is_active() {
                debug!(peer_id, state = ?link.state, "Link already exists");
                return Ok(EnsureOutcome::Existing(link.state));
            }
        }
        if !self.should_dial(peer_id) {
            debug!(peer_id, "Higher id waits for the remote dial");
            return Ok(EnsureOutcome::AwaitingRemote);
        }

        let mut link = PeerLink::new(peer_id, Direction::Outgoing);
        link.transition(LinkState::Dialing)?;
        let metadata = CallMetadata::camera(self.display_name.clone());
        let call_id = self
            .transport
            .call(peer_id, local, metadata)
            .await
            .map_err(|e| negotiation_failed(peer_id, e))?;

        link.call_id = Some(call_id);
        self.calls
            .insert(call_id, (peer_id.to_string(), CallRole::Camera));
        self.links.insert(peer_id.to_string(), link);
        info!(peer_id, %call_id, "Dialing peer");
        Ok(EnsureOutcome::Dialing(call_id))
    }

    /// Answer an incoming call with the local bundle (screen calls with none).
    pub async fn accept_incoming(
        &mut self,
        call: IncomingCall,
        local: &MediaTrackBundle,
    ) -> Result<AcceptOutcome, SessionError> {
        match call.metadata.kind {
            CallKind::Camera => self.accept_camera(call, local).await,
            CallKind::Screen => self.accept_screen(call).await,
        }
    }

    async fn accept_camera(
        &mut self,
        call: IncomingCall,
        local: &MediaTrackBundle,
    ) -> Result<AcceptOutcome, SessionError> {
        let peer_id = call.peer_id;

        if let Some(existing) = self.links.get(&peer_id) {
            if existing.state == LinkState::Dialing && self.wins_glare(&peer_id) {
                info!(peer_id = %peer_id, "Crossed calls, keeping our outgoing call");
                self.close_call(call.call_id).await;
                return Ok(AcceptOutcome::Declined);
            }
        }

        let mut link = match self.links.remove(&peer_id) {
            Some(mut link) => {
                if let Some(old) = link.call_id.take() {
                    debug!(peer_id = %peer_id, %old, "Replacing camera call");
                    self.calls.remove(&old);
                    self.close_call(old).await;
                }
                link.remote_stream = None;
                link.direction = Direction::Incoming;
                link
            }
            None => PeerLink::new(peer_id.clone(), Direction::Incoming),
        };
        if link.state != LinkState::Ringing {
            link.transition(LinkState::Ringing)?;
        }

        if let Err(e) = self.transport.answer(call.call_id, local).await {
            self.discard(link).await;
            return Err(negotiation_failed(&peer_id, e));
        }

        link.call_id = Some(call.call_id);
        self.calls
            .insert(call.call_id, (peer_id.clone(), CallRole::Camera));
        info!(peer_id = %peer_id, call_id = %call.call_id, "Answered call");
        self.links.insert(peer_id, link);
        Ok(AcceptOutcome::Answered(call.call_id))
    }

    async fn accept_screen(&mut self, call: IncomingCall) -> Result<AcceptOutcome, SessionError> {
        let peer_id = call.peer_id;
        if !self.links.get(&peer_id).is_some_and(|l| l.state.is_active()) {
            debug!(peer_id = %peer_id, "Screen call without a link, declining");
            self.close_call(call.call_id).await;
            return Ok(AcceptOutcome::Declined);
        }

        self.transport
            .answer(call.call_id, &MediaTrackBundle::new())
            .await
            .map_err(|e| negotiation_failed(&peer_id, e))?;

        let previous = self
            .links
            .get_mut(&peer_id)
            .and_then(|link| link.screen_in.replace(call.call_id));
        if let Some(old) = previous {
            self.calls.remove(&old);
            self.close_call(old).await;
        }
        self.calls
            .insert(call.call_id, (peer_id.clone(), CallRole::ScreenIn));
        info!(peer_id = %peer_id, call_id = %call.call_id, "Answered screen call");
        Ok(AcceptOutcome::ScreenAnswered(call.call_id))
    }

    /// Remote media arrived on a call.
    pub fn handle_stream(&mut self, call_id: CallId, bundle: MediaTrackBundle) -> LinkUpdate {
        let Some((peer_id, role)) = self.calls.get(&call_id).cloned() else {
            debug!(%call_id, "Stream for unknown call");
            return LinkUpdate::Unchanged;
        };
        let Some(link) = self.links.get_mut(&peer_id) else {
            return LinkUpdate::Unchanged;
        };

        match role {
            CallRole::Camera => {
                link.remote_stream = Some(bundle);
                if link.state.is_pending() && link.transition(LinkState::Connected).is_ok() {
                    info!(peer_id = %peer_id, "Peer link connected");
                    return LinkUpdate::Connected { peer_id };
                }
                LinkUpdate::Unchanged
            }
            CallRole::ScreenIn => {
                link.remote_screen = Some(bundle);
                LinkUpdate::RemoteScreen {
                    peer_id,
                    present: true,
                }
            }
            CallRole::ScreenOut => LinkUpdate::Unchanged,
        }
    }

    /// The transport closed a call.
    pub async fn handle_closed(&mut self, call_id: CallId) -> LinkUpdate {
        let Some((peer_id, role)) = self.calls.remove(&call_id) else {
            return LinkUpdate::Unchanged;
        };
        match role {
            CallRole::Camera => {
                let (link, _) = self.teardown(&peer_id).await;
                match link {
                    Some(link) => {
                        info!(peer_id = %peer_id, "Peer link closed by remote");
                        LinkUpdate::Closed(link)
                    }
                    None => LinkUpdate::Unchanged,
                }
            }
            CallRole::ScreenIn => self.clear_remote_screen(&peer_id),
            CallRole::ScreenOut => {
                if let Some(link) = self.links.get_mut(&peer_id) {
                    link.screen_out = None;
                }
                LinkUpdate::Unchanged
            }
        }
    }

    /// The transport gave up on a call.
    pub async fn handle_failed(&mut self, call_id: CallId, reason: String) -> LinkUpdate {
        let Some((peer_id, role)) = self.calls.remove(&call_id) else {
            return LinkUpdate::Unchanged;
        };
        match role {
            CallRole::Camera => {
                let (link, _) = self.teardown(&peer_id).await;
                match link {
                    Some(link) => {
                        warn!(peer_id = %peer_id, reason = %reason, "Peer link failed");
                        LinkUpdate::Failed { link, reason }
                    }
                    None => LinkUpdate::Unchanged,
                }
            }
            CallRole::ScreenIn => {
                warn!(peer_id = %peer_id, reason = %reason, "Incoming screen call failed");
                self.clear_remote_screen(&peer_id)
            }
            CallRole::ScreenOut => {
                warn!(peer_id = %peer_id, reason = %reason, "Outgoing screen call failed");
                if let Some(link) = self.links.get_mut(&peer_id) {
                    link.screen_out = None;
                }
                LinkUpdate::Unchanged
            }
        }
    }

    /// Close the link to `peer_id`. Absent peers are a no-op.
    pub async fn close(&mut self, peer_id: &str) -> Option<PeerLink> {
        let (link, error) = self.teardown(peer_id).await;
        if let Some(e) = error {
            warn!(peer_id, error = %e, "Error closing peer link");
        }
        if link.is_some() {
            info!(peer_id, "Closed peer link");
        }
        link
    }

    /// Close every link. Returns how many were closed, or the first close error
    /// once all links are gone.
    pub async fn close_all(&mut self) -> Result<usize, SessionError> {
        let peers: Vec<String> = self.links.keys().cloned().collect();
        let mut first = None;
        let mut closed = 0;
        for peer_id in peers {
            let (link, error) = self.teardown(&peer_id).await;
            if link.is_some() {
                closed += 1;
            }
            if let Some(e) = error {
                first.get_or_insert(e);
            }
        }
        self.calls.clear();
        debug!(closed, "Closed all peer links");
        first.map_or(Ok(closed), Err)
    }

    /// Place an auxiliary screen call to a connected peer.
    pub async fn share_screen(
        &mut self,
        peer_id: &str,
        screen: &MediaTrackBundle,
    ) -> Result<bool, SessionError> {
        let ready = self
            .links
            .get(peer_id)
            .is_some_and(|l| l.state == LinkState::Connected && l.screen_out.is_none());
        if !ready {
            return Ok(false);
        }

        let call_id = self
            .transport
            .call(peer_id, screen, CallMetadata::screen())
            .await
            .map_err(|e| negotiation_failed(peer_id, e))?;
        if let Some(link) = self.links.get_mut(peer_id) {
            link.screen_out = Some(call_id);
        }
        self.calls
            .insert(call_id, (peer_id.to_string(), CallRole::ScreenOut));
        info!(peer_id, %call_id, "Sharing screen with peer");
        Ok(true)
    }

    /// Screen-call every connected peer. Returns how many calls were placed.
    pub async fn share_screen_all(&mut self, screen: &MediaTrackBundle) -> usize {
        let peers: Vec<String> = self
            .links
            .values()
            .filter(|l| l.state == LinkState::Connected)
            .map(|l| l.peer_id.clone())
            .collect();
        let mut placed = 0;
        for peer_id in peers {
            match self.share_screen(&peer_id, screen).await {
                Ok(true) => placed += 1,
                Ok(false) => {}
                Err(e) => warn!(peer_id = %peer_id, error = %e, "Failed to share screen"),
            }
        }
        placed
    }

    /// Close every outgoing screen call.
    pub async fn stop_screen_all(&mut self) -> usize {
        let outgoing: Vec<CallId> = self
            .links
            .values_mut()
            .filter_map(|l| l.screen_out.take())
            .collect();
        for call_id in &outgoing {
            self.calls.remove(call_id);
            self.close_call(*call_id).await;
        }
        outgoing.len()
    }

    fn should_dial(&self, peer_id: &str) -> bool {
        match (self.tie_break, self.local_identity.as_deref()) {
            (TieBreak::Lexicographic, Some(me)) => me < peer_id,
            _ => true,
        }
    }

    /// On crossed calls the lower id keeps its own dial.
    fn wins_glare(&self, peer_id: &str) -> bool {
        self.local_identity
            .as_deref()
            .is_some_and(|me| me < peer_id)
    }

    fn clear_remote_screen(&mut self, peer_id: &str) -> LinkUpdate {
        match self.links.get_mut(peer_id) {
            Some(link) => {
                link.screen_in = None;
                link.remote_screen = None;
                LinkUpdate::RemoteScreen {
                    peer_id: peer_id.to_string(),
                    present: false,
                }
            }
            None => LinkUpdate::Unchanged,
        }
    }

    /// Mark the link closed, drop it from the table and close its calls.
    async fn teardown(&mut self, peer_id: &str) -> (Option<PeerLink>, Option<SessionError>) {
        if let Some(link) = self.links.get_mut(peer_id) {
            if link.state != LinkState::Closed {
                let _ = link.transition(LinkState::Closed);
            }
        }
        let Some(link) = self.links.remove(peer_id) else {
            return (None, None);
        };

        let mut first = None;
        for call_id in link.call_ids() {
            if self.calls.remove(&call_id).is_none() {
                continue;
            }
            if let Err(e) = self.transport.close(call_id).await {
                first.get_or_insert(e);
            }
        }
        (Some(link), first)
    }

    async fn discard(&mut self, mut link: PeerLink) {
        let _ = link.transition(LinkState::Closed);
        for call_id in link.call_ids() {
            self.calls.remove(&call_id);
            self.close_call(call_id).await;
        }
    }

    async fn close_call(&self, call_id: CallId) {
        if let Err(e) = self.transport.close(call_id).await {
            debug!(%call_id, error = %e, "Error closing call");
        }
    }
}

fn negotiation_failed(peer_id: &str, err: SessionError) -> SessionError {
    SessionError::PeerNegotiationFailed {
        peer_id: peer_id.to_string(),
        reason: err.to_string(),
    }
}
