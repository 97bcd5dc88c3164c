use std::sync::Arc;
use std::time::Duration;

use meshcall_common::{DeviceError, SessionError};
use tokio::sync::broadcast;
use tokio::time::timeout;

use super::*;
use crate::config::SessionConfig;
use crate::focus::{FocusRule, FocusSelection};
use crate::media::{MediaTrack, MediaTrackBundle, TrackSource};
use crate::peer::{CallId, CallKind, CallMetadata, IncomingCall, LinkState, TransportEvent};
use crate::signaling::protocol::{JoinRoom, LeaveRoom, RoomUsers, UserDisconnected};
use crate::signaling::{
    ClientMessage, LoopbackConnector, LoopbackEnd, LoopbackRemote, RemoteParticipant,
    ServerMessage,
};
use crate::test_support::{FakeDevices, FakeTransport, FakeTransportFactory};

const DIAL_WAIT: Duration = Duration::from_millis(400);

struct Harness {
    room: RoomCoordinator,
    devices: Arc<FakeDevices>,
    transports: Arc<FakeTransportFactory>,
    remote: LoopbackRemote,
}

impl Harness {
    fn new(devices: FakeDevices) -> Self {
        let devices = Arc::new(devices);
        let transports = Arc::new(FakeTransportFactory::default());
        let (connector, remote) = LoopbackConnector::pair();
        let deps = RoomDeps {
            devices: devices.clone(),
            transports: transports.clone(),
            connector: Arc::new(connector),
        };
        let room = RoomCoordinator::new("r1", "alice", &deps, SessionConfig::default());
        Self {
            room,
            devices,
            transports,
            remote,
        }
    }

    fn transport(&self) -> Arc<FakeTransport> {
        self.transports.last()
    }

    /// Initialize, connect signaling and hand out `identity`.
    async fn join(&mut self, identity: &str) -> LoopbackEnd {
        self.room.initialize().await.unwrap();
        let end = self.remote.next_connection().await.unwrap();
        end.connect().await;
        self.transport()
            .emit(TransportEvent::Open {
                identity: identity.into(),
            })
            .await;
        pump(&mut self.room).await;
        end
    }

    async fn roster(&mut self, end: &LoopbackEnd, ids: &[&str]) {
        let participants = ids
            .iter()
            .map(|id| RemoteParticipant {
                peer_id: id.to_string(),
                display_name: format!("{id} name"),
            })
            .collect();
        end.deliver(ServerMessage::RoomUsers(RoomUsers { participants }))
            .await;
        pump(&mut self.room).await;
    }

    async fn user_connected(&mut self, end: &LoopbackEnd, peer: &str) {
        end.deliver(ServerMessage::UserConnected(RemoteParticipant {
            peer_id: peer.into(),
            display_name: format!("{peer} name"),
        }))
        .await;
        pump(&mut self.room).await;
    }

    async fn user_disconnected(&mut self, end: &LoopbackEnd, peer: &str) {
        end.deliver(ServerMessage::UserDisconnected(UserDisconnected {
            peer_id: peer.into(),
        }))
        .await;
        pump(&mut self.room).await;
    }

    async fn emit(&mut self, event: TransportEvent) {
        self.transport().emit(event).await;
        pump(&mut self.room).await;
    }

    async fn connect_peer(&mut self, peer: &str) -> CallId {
        let call_id = *self
            .transport()
            .calls_to(peer, CallKind::Camera)
            .last()
            .unwrap();
        self.emit(TransportEvent::Stream {
            call_id,
            bundle: remote_media(peer),
        })
        .await;
        call_id
    }
}

/// Apply wakeups until nothing arrives for a short while.
async fn pump(room: &mut RoomCoordinator) {
    while let Ok(Some(wakeup)) = timeout(Duration::from_millis(20), room.next_wakeup()).await {
        room.handle(wakeup).await;
    }
}

fn remote_media(peer: &str) -> MediaTrackBundle {
    MediaTrackBundle::new()
        .with_audio(MediaTrack::audio(TrackSource::Remote, format!("{peer} mic"), None))
        .with_video(MediaTrack::video(TrackSource::Remote, format!("{peer} cam")))
}

fn incoming(call_id: u64, peer: &str, metadata: CallMetadata) -> TransportEvent {
    TransportEvent::Incoming(IncomingCall {
        call_id: CallId(call_id),
        peer_id: peer.into(),
        metadata,
    })
}

fn drain(events: &mut broadcast::Receiver<RoomEvent>) -> Vec<RoomEvent> {
    std::iter::from_fn(|| events.try_recv().ok()).collect()
}

#[tokio::test(start_paused = true)]
async fn joins_with_synthetic_video_when_camera_is_missing() {
    let mut h = Harness::new(FakeDevices::default().without_camera());
    let mut end = h.join("peer-a").await;

    let snapshot = h.room.snapshot();
    assert_eq!(snapshot.state, RoomState::Active);
    assert!(snapshot.joined_room);
    assert!(!snapshot.degraded_join);
    assert_eq!(snapshot.local_identity.as_deref(), Some("peer-a"));

    let bundle = &h.room.local_session().media_bundle;
    assert_eq!(bundle.video.as_ref().unwrap().source(), TrackSource::Synthetic);
    assert_eq!(bundle.audio.as_ref().unwrap().source(), TrackSource::Microphone);

    assert_eq!(
        end.try_next_sent(),
        Some(ClientMessage::JoinRoom(JoinRoom {
            room_id: "r1".into(),
            peer_id: Some("peer-a".into()),
            display_name: "alice".into(),
        }))
    );
}

#[tokio::test(start_paused = true)]
async fn roster_snapshot_excludes_self_and_dials_each_peer_once() {
    let mut h = Harness::new(FakeDevices::default());
    let end = h.join("peer-a").await;

    h.roster(&end, &["peer-a", "peer-b"]).await;
    h.roster(&end, &["peer-a", "peer-b"]).await;

    let snapshot = h.room.snapshot();
    assert_eq!(snapshot.participants.len(), 1);
    assert_eq!(snapshot.participants[0].peer_id, "peer-b");
    assert_eq!(snapshot.participants[0].display_name, "peer-b name");
    assert_eq!(snapshot.link("peer-b").unwrap().state, LinkState::Dialing);
    assert_eq!(h.transport().calls_to("peer-b", CallKind::Camera).len(), 1);
    assert!(h.room.links().get("peer-a").is_none());
}

#[tokio::test(start_paused = true)]
async fn higher_id_waits_for_the_remote_call() {
    let mut h = Harness::new(FakeDevices::default());
    let end = h.join("peer-z").await;
    h.roster(&end, &["peer-b"]).await;

    assert!(h.transport().calls_to("peer-b", CallKind::Camera).is_empty());
    assert!(h.room.links().is_empty());

    h.emit(incoming(7, "peer-b", CallMetadata::camera(Some("bob".into()))))
        .await;
    assert_eq!(h.transport().answered(), vec![CallId(7)]);

    h.emit(TransportEvent::Stream {
        call_id: CallId(7),
        bundle: remote_media("peer-b"),
    })
    .await;
    let link = h.room.snapshot().link("peer-b").cloned().unwrap();
    assert_eq!(link.state, LinkState::Connected);
    assert!(link.has_stream);
}

#[tokio::test(start_paused = true)]
async fn late_participant_is_dialed_after_the_delay() {
    let mut h = Harness::new(FakeDevices::default());
    let end = h.join("peer-a").await;
    h.roster(&end, &[]).await;

    end.deliver(ServerMessage::UserConnected(RemoteParticipant {
        peer_id: "peer-c".into(),
        display_name: "carol".into(),
    }))
    .await;
    pump(&mut h.room).await;
    assert!(h.room.snapshot().participant("peer-c").is_some());
    assert!(h.transport().calls_to("peer-c", CallKind::Camera).is_empty());

    tokio::time::sleep(DIAL_WAIT).await;
    pump(&mut h.room).await;
    assert_eq!(h.transport().calls_to("peer-c", CallKind::Camera).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn participant_leaving_before_the_dial_gets_no_link() {
    let mut h = Harness::new(FakeDevices::default());
    let end = h.join("peer-a").await;

    end.deliver(ServerMessage::UserConnected(RemoteParticipant {
        peer_id: "peer-c".into(),
        display_name: "carol".into(),
    }))
    .await;
    pump(&mut h.room).await;
    end.deliver(ServerMessage::UserDisconnected(UserDisconnected {
        peer_id: "peer-c".into(),
    }))
    .await;
    pump(&mut h.room).await;

    tokio::time::sleep(DIAL_WAIT).await;
    pump(&mut h.room).await;
    assert!(h.transport().calls_to("peer-c", CallKind::Camera).is_empty());
    assert!(h.room.snapshot().participants.is_empty());
}

#[tokio::test(start_paused = true)]
async fn participant_leaving_closes_the_link() {
    let mut h = Harness::new(FakeDevices::default());
    let end = h.join("peer-a").await;
    h.roster(&end, &["peer-b"]).await;
    let call_id = h.connect_peer("peer-b").await;
    let mut events = h.room.subscribe();

    end.deliver(ServerMessage::UserDisconnected(UserDisconnected {
        peer_id: "peer-b".into(),
    }))
    .await;
    pump(&mut h.room).await;

    assert!(h.room.links().is_empty());
    assert!(h.transport().closed().contains(&call_id));
    let seen = drain(&mut events);
    assert!(seen.contains(&RoomEvent::LinkClosed {
        peer_id: "peer-b".into()
    }));
    assert!(seen.contains(&RoomEvent::ParticipantLeft {
        peer_id: "peer-b".into()
    }));
}

#[tokio::test(start_paused = true)]
async fn new_snapshot_drops_missing_peers() {
    let mut h = Harness::new(FakeDevices::default());
    let end = h.join("peer-a").await;
    h.roster(&end, &["peer-b", "peer-c"]).await;
    assert_eq!(h.room.links().len(), 2);

    h.roster(&end, &["peer-b"]).await;

    let snapshot = h.room.snapshot();
    assert!(snapshot.participant("peer-c").is_none());
    assert!(snapshot.link("peer-c").is_none());
    assert!(snapshot.link("peer-b").is_some());
    assert_eq!(h.transport().calls_to("peer-b", CallKind::Camera).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn unannounced_caller_becomes_provisional_participant() {
    let mut h = Harness::new(FakeDevices::default());
    let end = h.join("peer-z").await;

    h.emit(incoming(7, "peer-q", CallMetadata::camera(Some("quinn".into()))))
        .await;
    let quinn = h.room.snapshot().participant("peer-q").cloned().unwrap();
    assert!(quinn.provisional);
    assert_eq!(quinn.display_name, "quinn");
    assert_eq!(h.transport().answered(), vec![CallId(7)]);

    end.deliver(ServerMessage::UserConnected(RemoteParticipant {
        peer_id: "peer-q".into(),
        display_name: "quinn".into(),
    }))
    .await;
    pump(&mut h.room).await;
    assert!(!h.room.snapshot().participant("peer-q").unwrap().provisional);
}

#[tokio::test(start_paused = true)]
async fn early_caller_survives_a_snapshot_that_predates_it() {
    let mut h = Harness::new(FakeDevices::default());
    let end = h.join("peer-z").await;

    h.emit(incoming(7, "peer-b", CallMetadata::camera(Some("bob".into()))))
        .await;
    h.emit(TransportEvent::Stream {
        call_id: CallId(7),
        bundle: remote_media("peer-b"),
    })
    .await;

    h.roster(&end, &[]).await;
    assert!(h.room.snapshot().participant("peer-b").unwrap().provisional);
    assert!(h.transport().closed().is_empty());

    h.user_connected(&end, "peer-b").await;
    tokio::time::sleep(DIAL_WAIT).await;
    pump(&mut h.room).await;

    let snapshot = h.room.snapshot();
    assert!(!snapshot.participant("peer-b").unwrap().provisional);
    assert_eq!(snapshot.link("peer-b").unwrap().state, LinkState::Connected);
    assert!(h.transport().closed().is_empty());
    assert!(h.transport().calls_to("peer-b", CallKind::Camera).is_empty());
}

#[tokio::test(start_paused = true)]
async fn snapshot_still_drops_a_provisional_caller_without_a_link() {
    let mut h = Harness::new(FakeDevices::default());
    let end = h.join("peer-z").await;

    h.emit(incoming(7, "peer-b", CallMetadata::camera(None))).await;
    h.emit(TransportEvent::Closed { call_id: CallId(7) }).await;
    assert!(h.room.links().is_empty());

    h.roster(&end, &[]).await;
    assert!(h.room.snapshot().participant("peer-b").is_none());
}

#[tokio::test(start_paused = true)]
async fn roster_tracks_net_joins_and_leaves() {
    let mut h = Harness::new(FakeDevices::default());
    let end = h.join("peer-a").await;
    h.roster(&end, &[]).await;
    let mut events = h.room.subscribe();

    h.user_connected(&end, "peer-b").await;
    assert_eq!(h.room.roster().len(), 1);
    h.user_connected(&end, "peer-b").await;
    assert_eq!(h.room.roster().len(), 1);
    h.user_connected(&end, "peer-c").await;
    assert_eq!(h.room.roster().len(), 2);

    h.user_disconnected(&end, "peer-b").await;
    assert_eq!(h.room.roster().len(), 1);
    h.user_disconnected(&end, "peer-b").await;
    assert_eq!(h.room.roster().len(), 1);
    h.user_disconnected(&end, "peer-x").await;
    assert_eq!(h.room.roster().len(), 1);

    h.user_disconnected(&end, "peer-c").await;
    assert_eq!(h.room.roster().len(), 0);
    h.user_disconnected(&end, "peer-c").await;
    assert_eq!(h.room.roster().len(), 0);

    tokio::time::sleep(DIAL_WAIT).await;
    pump(&mut h.room).await;
    assert!(h.room.links().is_empty());
    assert_eq!(h.room.state(), RoomState::Active);

    let seen = drain(&mut events);
    let joined: Vec<&str> = seen
        .iter()
        .filter_map(|e| match e {
            RoomEvent::ParticipantJoined(p) => Some(p.peer_id.as_str()),
            _ => None,
        })
        .collect();
    let left: Vec<&str> = seen
        .iter()
        .filter_map(|e| match e {
            RoomEvent::ParticipantLeft { peer_id } => Some(peer_id.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(joined, vec!["peer-b", "peer-c"]);
    assert_eq!(left, vec!["peer-b", "peer-c"]);
}

#[tokio::test(start_paused = true)]
async fn stuck_negotiation_is_abandoned() {
    let mut h = Harness::new(FakeDevices::default());
    let end = h.join("peer-a").await;
    h.roster(&end, &["peer-b"]).await;
    let call_id = h.transport().calls_to("peer-b", CallKind::Camera)[0];
    let mut events = h.room.subscribe();

    tokio::time::sleep(Duration::from_millis(12_100)).await;
    pump(&mut h.room).await;

    assert!(h.room.links().is_empty());
    assert!(h.transport().closed().contains(&call_id));
    assert!(drain(&mut events).iter().any(|e| matches!(
        e,
        RoomEvent::LinkFailed { peer_id, .. } if peer_id == "peer-b"
    )));
}

#[tokio::test(start_paused = true)]
async fn connected_link_survives_the_negotiation_deadline() {
    let mut h = Harness::new(FakeDevices::default());
    let end = h.join("peer-a").await;
    h.roster(&end, &["peer-b"]).await;
    h.connect_peer("peer-b").await;

    tokio::time::sleep(Duration::from_millis(12_100)).await;
    pump(&mut h.room).await;
    assert_eq!(
        h.room.snapshot().link("peer-b").unwrap().state,
        LinkState::Connected
    );
}

#[tokio::test(start_paused = true)]
async fn missing_microphone_keeps_the_visit_going() {
    let mut h = Harness::new(FakeDevices::default().without_microphone());
    let _end = h.join("peer-a").await;

    let snapshot = h.room.snapshot();
    assert_eq!(snapshot.state, RoomState::Active);
    assert!(snapshot.voice_error.is_some());
    let bundle = &h.room.local_session().media_bundle;
    assert!(bundle.audio.is_none());
    assert!(bundle.video.is_some());
}

#[tokio::test(start_paused = true)]
async fn join_degrades_without_identity() {
    let mut h = Harness::new(FakeDevices::default());
    h.room.initialize().await.unwrap();
    let mut end = h.remote.next_connection().await.unwrap();
    end.connect().await;

    tokio::time::sleep(Duration::from_millis(2100)).await;
    pump(&mut h.room).await;

    let snapshot = h.room.snapshot();
    assert_eq!(snapshot.state, RoomState::Active);
    assert!(snapshot.degraded_join);
    let Some(ClientMessage::JoinRoom(join)) = end.try_next_sent() else {
        panic!("expected a join");
    };
    assert!(join.peer_id.is_none());
}

#[tokio::test(start_paused = true)]
async fn leave_tears_everything_down_once() {
    let mut h = Harness::new(FakeDevices::default());
    let mut end = h.join("peer-a").await;
    h.roster(&end, &["peer-b"]).await;
    let call_id = h.connect_peer("peer-b").await;
    end.drain_sent();

    h.room.leave().await.unwrap();

    assert_eq!(
        end.drain_sent(),
        vec![ClientMessage::LeaveRoom(LeaveRoom {
            room_id: "r1".into(),
            peer_id: Some("peer-a".into()),
        })]
    );
    let transport = h.transport();
    assert!(transport.closed().contains(&call_id));
    assert!(transport.destroyed());
    assert_eq!(h.devices.released(), 2);
    assert!(end.is_shut_down());
    assert_eq!(h.room.state(), RoomState::Closed);
    assert!(h.room.snapshot().links.is_empty());

    let ops = transport.ops().len();
    h.room.leave().await.unwrap();
    assert_eq!(transport.ops().len(), ops);
    assert_eq!(h.devices.released(), 2);
    assert!(h.room.next_wakeup().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn failing_teardown_step_does_not_stop_the_rest() {
    let devices = FakeDevices::default().failing_release(DeviceError::Failed("device busy".into()));
    let mut h = Harness::new(devices);
    let end = h.join("peer-a").await;

    let err = h.room.leave().await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::TeardownPartialFailure {
            step: "release-media",
            ..
        }
    ));
    assert!(h.transport().destroyed());
    assert!(end.is_shut_down());
    assert_eq!(h.room.state(), RoomState::Closed);

    h.room.leave().await.unwrap();
    assert!(h.room.teardown_outcome().is_err());
}

#[tokio::test(start_paused = true)]
async fn cancel_during_setup_leaves_nothing_behind() {
    let mut h = Harness::new(FakeDevices::default().slow(Duration::from_secs(5)));
    let cancel = h.room.cancel_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
    });

    let err = h.room.initialize().await.unwrap_err();
    assert!(matches!(err, SessionError::Cancelled));

    let mut end = h.remote.next_connection().await.unwrap();
    h.room.leave().await.unwrap();

    assert_eq!(h.room.state(), RoomState::Closed);
    assert!(end.try_next_sent().is_none());
    assert!(end.is_shut_down());
    assert_eq!(h.devices.released(), 0);
    assert!(h.transport().destroyed());
}

#[tokio::test(start_paused = true)]
async fn cancellation_is_picked_up_as_a_wakeup() {
    let mut h = Harness::new(FakeDevices::default());
    let end = h.join("peer-a").await;

    h.room.cancel_token().cancel();
    pump(&mut h.room).await;

    assert_eq!(h.room.state(), RoomState::Closed);
    assert!(end.is_shut_down());
    assert!(h.transport().destroyed());
}

#[tokio::test(start_paused = true)]
async fn remote_screen_takes_focus_and_releases_it() {
    let mut h = Harness::new(FakeDevices::default());
    let end = h.join("peer-a").await;
    h.roster(&end, &["peer-b"]).await;
    h.connect_peer("peer-b").await;
    assert_eq!(h.room.snapshot().focus, Some(FocusRule::LocalCamera));

    h.emit(incoming(9, "peer-b", CallMetadata::screen())).await;
    h.emit(TransportEvent::Stream {
        call_id: CallId(9),
        bundle: MediaTrackBundle::new()
            .with_video(MediaTrack::video(TrackSource::Remote, "peer-b screen")),
    })
    .await;

    let snapshot = h.room.snapshot();
    assert_eq!(snapshot.focus, Some(FocusRule::RemoteScreen("peer-b".into())));
    assert_eq!(snapshot.selection, FocusSelection::Screen);
    assert_eq!(
        h.room.focused_stream().unwrap().video.as_ref().unwrap().label(),
        "peer-b screen"
    );

    h.emit(TransportEvent::Closed {
        call_id: CallId(9),
    })
    .await;
    let snapshot = h.room.snapshot();
    assert_eq!(snapshot.focus, Some(FocusRule::LocalCamera));
    assert_eq!(snapshot.selection, FocusSelection::None);
}

#[tokio::test(start_paused = true)]
async fn focus_peer_toggles_and_clears_on_departure() {
    let mut h = Harness::new(FakeDevices::default());
    let end = h.join("peer-a").await;
    h.roster(&end, &["peer-b", "peer-c"]).await;
    h.connect_peer("peer-b").await;

    h.room.focus_peer("peer-c");
    assert_eq!(h.room.snapshot().selection, FocusSelection::None);

    h.room.focus_peer("peer-b");
    assert_eq!(
        h.room.snapshot().focus,
        Some(FocusRule::RemoteCamera("peer-b".into()))
    );
    h.room.focus_peer("peer-b");
    assert_eq!(h.room.snapshot().focus, Some(FocusRule::LocalCamera));

    h.room.focus_peer("peer-b");
    end.deliver(ServerMessage::UserDisconnected(UserDisconnected {
        peer_id: "peer-b".into(),
    }))
    .await;
    pump(&mut h.room).await;
    let snapshot = h.room.snapshot();
    assert_eq!(snapshot.selection, FocusSelection::None);
    assert_eq!(snapshot.focus, Some(FocusRule::LocalCamera));
}

#[tokio::test(start_paused = true)]
async fn screen_share_reaches_current_and_later_peers() {
    let mut h = Harness::new(FakeDevices::default());
    let end = h.join("peer-a").await;
    h.roster(&end, &["peer-b"]).await;
    h.connect_peer("peer-b").await;

    h.room.start_screen_share().await.unwrap();
    h.room.start_screen_share().await.unwrap();
    assert_eq!(h.devices.screens_opened(), 1);
    let to_b = h.transport().calls_to("peer-b", CallKind::Screen);
    assert_eq!(to_b.len(), 1);
    let snapshot = h.room.snapshot();
    assert!(snapshot.sharing_screen);
    assert_eq!(snapshot.focus, Some(FocusRule::LocalScreen));

    end.deliver(ServerMessage::UserConnected(RemoteParticipant {
        peer_id: "peer-c".into(),
        display_name: "carol".into(),
    }))
    .await;
    pump(&mut h.room).await;
    tokio::time::sleep(DIAL_WAIT).await;
    pump(&mut h.room).await;
    h.connect_peer("peer-c").await;
    let to_c = h.transport().calls_to("peer-c", CallKind::Screen);
    assert_eq!(to_c.len(), 1);

    h.room.stop_screen_share().await.unwrap();
    let closed = h.transport().closed();
    assert!(closed.contains(&to_b[0]));
    assert!(closed.contains(&to_c[0]));
    assert!(!h.room.snapshot().sharing_screen);
    assert_eq!(h.devices.released(), 1);
}

#[tokio::test(start_paused = true)]
async fn screen_share_requires_a_live_room() {
    let mut h = Harness::new(FakeDevices::default());
    let err = h.room.start_screen_share().await.unwrap_err();
    assert!(matches!(err, SessionError::InvalidState(_)));
}

#[tokio::test(start_paused = true)]
async fn muting_reports_not_talking() {
    let mut h = Harness::new(FakeDevices::default());
    let _end = h.join("peer-a").await;
    let mut events = h.room.subscribe();

    h.devices.analyser.set_level(90);
    tokio::time::sleep(Duration::from_millis(50)).await;
    pump(&mut h.room).await;
    assert!(h.room.snapshot().local_talking);

    h.room.set_muted(true);
    tokio::time::sleep(Duration::from_millis(50)).await;
    pump(&mut h.room).await;

    let snapshot = h.room.snapshot();
    assert!(snapshot.muted);
    assert!(!snapshot.local_talking);
    let seen = drain(&mut events);
    assert!(seen.contains(&RoomEvent::TalkingChanged {
        peer_id: None,
        talking: true
    }));
    assert!(seen.contains(&RoomEvent::TalkingChanged {
        peer_id: None,
        talking: false
    }));
}

#[tokio::test(start_paused = true)]
async fn state_changes_are_published() {
    let mut h = Harness::new(FakeDevices::default());
    let mut events = h.room.subscribe();
    let _end = h.join("peer-a").await;
    h.room.leave().await.unwrap();

    let states: Vec<RoomState> = drain(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            RoomEvent::StateChanged(state) => Some(state),
            _ => None,
        })
        .collect();
    assert_eq!(
        states,
        vec![
            RoomState::Joining,
            RoomState::Active,
            RoomState::Leaving,
            RoomState::Closed
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn handle_runs_the_room_and_leaves_on_request() {
    let h = Harness::new(FakeDevices::default());
    let Harness {
        room,
        transports,
        mut remote,
        ..
    } = h;
    let handle = RoomHandle::spawn(room);

    let end = remote.next_connection().await.unwrap();
    end.connect().await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    transports
        .last()
        .emit(TransportEvent::Open {
            identity: "peer-a".into(),
        })
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(handle.state(), RoomState::Active);

    handle.leave().await.unwrap();
    assert!(handle.is_closed());
    assert_eq!(handle.state(), RoomState::Closed);
    assert!(transports.last().destroyed());
    handle.leave().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn dropping_the_handle_leaves_the_room() {
    let h = Harness::new(FakeDevices::default());
    let Harness {
        room,
        transports,
        mut remote,
        ..
    } = h;
    let handle = RoomHandle::spawn(room);
    let end = remote.next_connection().await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    drop(handle);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(transports.last().destroyed());
    assert!(end.is_shut_down());
}

#[tokio::test(start_paused = true)]
async fn host_reuses_the_running_room_and_replaces_others() {
    let devices = Arc::new(FakeDevices::default());
    let transports = Arc::new(FakeTransportFactory::default());
    let (connector, _remote) = LoopbackConnector::pair();
    let deps = RoomDeps {
        devices,
        transports: transports.clone(),
        connector: Arc::new(connector),
    };
    let mut host = SessionHost::new(deps, SessionConfig::default());

    host.enter("r1", "alice").await.unwrap();
    let again = host.enter("r1", "alice").await.unwrap();
    assert_eq!(again.room_id(), "r1");
    assert_eq!(transports.count(), 1);

    let first = transports.last();
    let second = host.enter("r2", "alice").await.unwrap();
    assert_eq!(second.room_id(), "r2");
    assert_eq!(transports.count(), 2);
    assert!(first.destroyed());

    host.leave().await.unwrap();
    assert!(host.current().is_none());
    assert!(transports.last().destroyed());
}
