//! Media track handles shared between capture, peer links and voice activity.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use meshcall_common::{DeviceError, TrackId};

/// Audio or video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Audio,
    Video,
}

/// Where a track's samples come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackSource {
    Microphone,
    Camera,
    Screen,
    Synthetic,
    Remote,
}

/// Frequency-domain view of an audio track.
pub trait AudioAnalyser: Send + Sync {
    /// Fill `out` with the current frequency-bin magnitudes (0-255 each).
    fn byte_frequency_data(&self, out: &mut [u8]);
}

type StopHook = Box<dyn FnOnce() -> Result<(), DeviceError> + Send>;

struct TrackInner {
    id: TrackId,
    kind: TrackKind,
    source: TrackSource,
    label: String,
    enabled: AtomicBool,
    ended: AtomicBool,
    analyser: Option<Arc<dyn AudioAnalyser>>,
    on_stop: Mutex<Option<StopHook>>,
}

/// A cheaply cloneable handle to one audio or video track.
///
/// Clones share state: disabling or stopping through one handle is seen by all.
#[derive(Clone)]
pub struct MediaTrack {
    inner: Arc<TrackInner>,
}

impl MediaTrack {
    fn build(
        kind: TrackKind,
        source: TrackSource,
        label: String,
        analyser: Option<Arc<dyn AudioAnalyser>>,
    ) -> Self {
        Self {
            inner: Arc::new(TrackInner {
                id: TrackId::new(),
                kind,
                source,
                label,
                enabled: AtomicBool::new(true),
                ended: AtomicBool::new(false),
                analyser,
                on_stop: Mutex::new(None),
            }),
        }
    }

    pub fn audio(
        source: TrackSource,
        label: impl Into<String>,
        analyser: Option<Arc<dyn AudioAnalyser>>,
    ) -> Self {
        Self::build(TrackKind::Audio, source, label.into(), analyser)
    }

    pub fn video(source: TrackSource, label: impl Into<String>) -> Self {
        Self::build(TrackKind::Video, source, label.into(), None)
    }

    /// Register the device release that runs the first time the track is stopped.
    pub fn on_stop(
        self,
        hook: impl FnOnce() -> Result<(), DeviceError> + Send + 'static,
    ) -> Self {
        if let Ok(mut slot) = self.inner.on_stop.lock() {
            *slot = Some(Box::new(hook));
        }
        self
    }

    pub fn id(&self) -> &TrackId {
        &self.inner.id
    }

    pub fn kind(&self) -> TrackKind {
        self.inner.kind
    }

    pub fn source(&self) -> TrackSource {
        self.inner.source
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn analyser(&self) -> Option<&Arc<dyn AudioAnalyser>> {
        self.inner.analyser.as_ref()
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_ended(&self) -> bool {
        self.inner.ended.load(Ordering::SeqCst)
    }

    /// Stop the track and release its device. Only the first call does anything.
    pub fn stop(&self) -> Result<(), DeviceError> {
        if self.inner.ended.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let hook = match self.inner.on_stop.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        match hook {
            Some(release) => release(),
            None => Ok(()),
        }
    }
}

impl PartialEq for MediaTrack {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for MediaTrack {}

impl fmt::Debug for MediaTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaTrack")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("source", &self.inner.source)
            .field("label", &self.inner.label)
            .field("enabled", &self.is_enabled())
            .field("ended", &self.is_ended())
            .finish()
    }
}

/// An ordered group of at most one audio and one video track.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaTrackBundle {
    pub audio: Option<MediaTrack>,
    pub video: Option<MediaTrack>,
}

impl MediaTrackBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_audio(mut self, track: MediaTrack) -> Self {
        self.audio = Some(track);
        self
    }

    pub fn with_video(mut self, track: MediaTrack) -> Self {
        self.video = Some(track);
        self
    }

    /// Take over whichever tracks `other` carries.
    pub fn merge(mut self, other: MediaTrackBundle) -> Self {
        if other.audio.is_some() {
            self.audio = other.audio;
        }
        if other.video.is_some() {
            self.video = other.video;
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.audio.is_none() && self.video.is_none()
    }

    pub fn tracks(&self) -> impl Iterator<Item = &MediaTrack> {
        self.audio.iter().chain(self.video.iter())
    }

    /// True while at least one track has not ended.
    pub fn is_live(&self) -> bool {
        self.tracks().any(|t| !t.is_ended())
    }

    /// Stop every track, returning the first release failure after trying all.
    pub fn stop(&self) -> Result<(), DeviceError> {
        let mut first = None;
        for track in self.tracks() {
            if let Err(e) = track.stop() {
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), Err)
    }
}
