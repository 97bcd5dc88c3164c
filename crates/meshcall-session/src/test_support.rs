//! In-memory stand-ins for the device and transport seams.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use meshcall_common::{DeviceError, SessionError};
use tokio::sync::mpsc;

use crate::media::{AudioAnalyser, MediaDevices, MediaTrack, MediaTrackBundle, TrackSource};
use crate::peer::{CallId, CallKind, CallMetadata, PeerTransport, TransportEvent, TransportFactory};

/// Analyser reporting the same magnitude in every bin.
pub struct FakeAnalyser {
    level: AtomicU8,
}

impl FakeAnalyser {
    pub fn new(level: u8) -> Self {
        Self {
            level: AtomicU8::new(level),
        }
    }

    pub fn set_level(&self, level: u8) {
        self.level.store(level, Ordering::SeqCst);
    }
}

impl AudioAnalyser for FakeAnalyser {
    fn byte_frequency_data(&self, out: &mut [u8]) {
        out.fill(self.level.load(Ordering::SeqCst));
    }
}

pub struct FakeDevices {
    microphone: bool,
    camera: bool,
    screen: bool,
    delay: Option<Duration>,
    release_error: Option<DeviceError>,
    released: Arc<AtomicUsize>,
    screens: AtomicUsize,
    pub analyser: Arc<FakeAnalyser>,
}

impl Default for FakeDevices {
    fn default() -> Self {
        Self {
            microphone: true,
            camera: true,
            screen: true,
            delay: None,
            release_error: None,
            released: Arc::new(AtomicUsize::new(0)),
            screens: AtomicUsize::new(0),
            analyser: Arc::new(FakeAnalyser::new(0)),
        }
    }
}

impl FakeDevices {
    pub fn without_microphone(mut self) -> Self {
        self.microphone = false;
        self
    }

    pub fn without_camera(mut self) -> Self {
        self.camera = false;
        self
    }

    pub fn without_screen(mut self) -> Self {
        self.screen = false;
        self
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn failing_release(mut self, err: DeviceError) -> Self {
        self.release_error = Some(err);
        self
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn screens_opened(&self) -> usize {
        self.screens.load(Ordering::SeqCst)
    }

    fn track(&self, track: MediaTrack) -> MediaTrack {
        let released = Arc::clone(&self.released);
        let error = self.release_error.clone();
        track.on_stop(move || {
            released.fetch_add(1, Ordering::SeqCst);
            error.map_or(Ok(()), Err)
        })
    }

    async fn wait(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl MediaDevices for FakeDevices {
    async fn open_microphone(&self) -> Result<MediaTrack, DeviceError> {
        self.wait().await;
        if !self.microphone {
            return Err(DeviceError::PermissionDenied);
        }
        let analyser: Arc<dyn AudioAnalyser> = self.analyser.clone();
        Ok(self.track(MediaTrack::audio(
            TrackSource::Microphone,
            "fake mic",
            Some(analyser),
        )))
    }

    async fn open_camera(&self) -> Result<MediaTrack, DeviceError> {
        self.wait().await;
        if !self.camera {
            return Err(DeviceError::NotFound);
        }
        Ok(self.track(MediaTrack::video(TrackSource::Camera, "fake cam")))
    }

    async fn open_screen(&self) -> Result<MediaTrack, DeviceError> {
        if !self.screen {
            return Err(DeviceError::PermissionDenied);
        }
        self.screens.fetch_add(1, Ordering::SeqCst);
        Ok(self.track(MediaTrack::video(TrackSource::Screen, "fake screen")))
    }
}

/// One recorded transport operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportOp {
    Call {
        peer_id: String,
        kind: CallKind,
        call_id: CallId,
    },
    Answer {
        call_id: CallId,
    },
    Close {
        call_id: CallId,
    },
    Destroy,
}

pub struct FakeTransport {
    next_id: AtomicU64,
    ops: Mutex<Vec<TransportOp>>,
    fail_calls: AtomicBool,
    fail_answers: AtomicBool,
    fail_close: AtomicBool,
    events: mpsc::Sender<TransportEvent>,
}

impl FakeTransport {
    pub fn new() -> (Arc<Self>, mpsc::Receiver<TransportEvent>) {
        let (tx, rx) = mpsc::channel(64);
        let transport = Arc::new(Self {
            next_id: AtomicU64::new(100),
            ops: Mutex::new(Vec::new()),
            fail_calls: AtomicBool::new(false),
            fail_answers: AtomicBool::new(false),
            fail_close: AtomicBool::new(false),
            events: tx,
        });
        (transport, rx)
    }

    pub async fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event).await;
    }

    pub fn ops(&self) -> Vec<TransportOp> {
        self.ops.lock().unwrap().clone()
    }

    pub fn calls_to(&self, peer: &str, kind: CallKind) -> Vec<CallId> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                TransportOp::Call {
                    peer_id,
                    kind: k,
                    call_id,
                } if peer_id == peer && k == kind => Some(call_id),
                _ => None,
            })
            .collect()
    }

    pub fn closed(&self) -> Vec<CallId> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                TransportOp::Close { call_id } => Some(call_id),
                _ => None,
            })
            .collect()
    }

    pub fn answered(&self) -> Vec<CallId> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                TransportOp::Answer { call_id } => Some(call_id),
                _ => None,
            })
            .collect()
    }

    pub fn destroyed(&self) -> bool {
        self.ops().contains(&TransportOp::Destroy)
    }

    pub fn fail_calls(&self, fail: bool) {
        self.fail_calls.store(fail, Ordering::SeqCst);
    }

    pub fn fail_answers(&self, fail: bool) {
        self.fail_answers.store(fail, Ordering::SeqCst);
    }

    pub fn fail_close(&self, fail: bool) {
        self.fail_close.store(fail, Ordering::SeqCst);
    }

    fn record(&self, op: TransportOp) {
        self.ops.lock().unwrap().push(op);
    }
}

#[async_trait]
impl PeerTransport for FakeTransport {
    async fn call(
        &self,
        peer_id: &str,
        _bundle: &MediaTrackBundle,
        metadata: CallMetadata,
    ) -> Result<CallId, SessionError> {
        if self.fail_calls.load(Ordering::SeqCst) {
            return Err(SessionError::Transport("peer unreachable".into()));
        }
        let call_id = CallId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.record(TransportOp::Call {
            peer_id: peer_id.to_string(),
            kind: metadata.kind,
            call_id,
        });
        Ok(call_id)
    }

    async fn answer(&self, call_id: CallId, _bundle: &MediaTrackBundle) -> Result<(), SessionError> {
        if self.fail_answers.load(Ordering::SeqCst) {
            return Err(SessionError::Transport("answer rejected".into()));
        }
        self.record(TransportOp::Answer { call_id });
        Ok(())
    }

    async fn close(&self, call_id: CallId) -> Result<(), SessionError> {
        self.record(TransportOp::Close { call_id });
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(SessionError::Transport("close failed".into()));
        }
        Ok(())
    }

    async fn destroy(&self) -> Result<(), SessionError> {
        self.record(TransportOp::Destroy);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeTransportFactory {
    created: Mutex<Vec<Arc<FakeTransport>>>,
}

impl FakeTransportFactory {
    pub fn last(&self) -> Arc<FakeTransport> {
        self.created.lock().unwrap().last().cloned().unwrap()
    }

    pub fn count(&self) -> usize {
        self.created.lock().unwrap().len()
    }
}

impl TransportFactory for FakeTransportFactory {
    fn create(
        &self,
        _ice_servers: &[String],
    ) -> (Arc<dyn PeerTransport>, mpsc::Receiver<TransportEvent>) {
        let (transport, events) = FakeTransport::new();
        self.created.lock().unwrap().push(Arc::clone(&transport));
        (transport, events)
    }
}
