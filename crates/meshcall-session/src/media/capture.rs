//! Local capture: acquires microphone, camera and screen tracks and owns
//! them until the room visit releases them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use meshcall_common::{DeviceKind, SessionError};
use tracing::{debug, info, warn};

use super::devices::MediaDevices;
use super::synthetic::SyntheticVideo;
use super::track::{MediaTrack, MediaTrackBundle, TrackKind, TrackSource};

/// Every track this visit acquired, released exactly once.
pub struct LocalMedia {
    devices: Arc<dyn MediaDevices>,
    synthetic: SyntheticVideo,
    held: Mutex<Vec<MediaTrack>>,
    screen: Mutex<Option<MediaTrack>>,
    released: AtomicBool,
}

impl LocalMedia {
    pub fn new(devices: Arc<dyn MediaDevices>, synthetic: SyntheticVideo) -> Self {
        Self {
            devices,
            synthetic,
            held: Mutex::new(Vec::new()),
            screen: Mutex::new(None),
            released: AtomicBool::new(false),
        }
    }

    /// Acquire one local track.
    ///
    /// Audio failures propagate. Video never fails on device errors: a
    /// synthetic blank track stands in for a missing or refused camera.
    /// Tracks that arrive after [`release`](Self::release) are stopped and
    /// reported as [`SessionError::Cancelled`].
    pub async fn acquire(&self, kind: TrackKind) -> Result<MediaTrackBundle, SessionError> {
        let track = match kind {
            TrackKind::Audio => self
                .devices
                .open_microphone()
                .await
                .map_err(|e| SessionError::device(DeviceKind::Microphone, e))?,
            TrackKind::Video => match self.devices.open_camera().await {
                Ok(track) => track,
                Err(e) => {
                    warn!(error = %e, "Camera unavailable, using synthetic video");
                    self.synthetic.track()
                }
            },
        };

        self.hold(track.clone())?;
        debug!(kind = ?kind, label = track.label(), "Acquired local track");

        let bundle = match kind {
            TrackKind::Audio => MediaTrackBundle::new().with_audio(track),
            TrackKind::Video => MediaTrackBundle::new().with_video(track),
        };
        Ok(bundle)
    }

    /// Open a screen capture. Returns the existing one if already sharing.
    pub async fn acquire_screen(&self) -> Result<MediaTrackBundle, SessionError> {
        if let Some(existing) = self.screen_track() {
            return Ok(MediaTrackBundle::new().with_video(existing));
        }

        let track = self
            .devices
            .open_screen()
            .await
            .map_err(|e| SessionError::device(DeviceKind::Screen, e))?;

        if self.is_released() {
            let _ = track.stop();
            return Err(SessionError::Cancelled);
        }
        if let Ok(mut slot) = self.screen.lock() {
            *slot = Some(track.clone());
        }
        info!(label = track.label(), "Screen capture started");
        Ok(MediaTrackBundle::new().with_video(track))
    }

    /// Stop the screen capture, if any.
    pub fn release_screen(&self) -> Result<(), SessionError> {
        let track = match self.screen.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        match track {
            Some(track) => {
                info!("Screen capture stopped");
                track
                    .stop()
                    .map_err(|e| SessionError::device(DeviceKind::Screen, e))
            }
            None => Ok(()),
        }
    }

    pub fn screen_track(&self) -> Option<MediaTrack> {
        self.screen.lock().ok().and_then(|slot| slot.clone())
    }

    /// Enable or disable every held track of `kind`.
    pub fn set_enabled(&self, kind: TrackKind, enabled: bool) {
        if let Ok(held) = self.held.lock() {
            for track in held.iter().filter(|t| t.kind() == kind) {
                track.set_enabled(enabled);
            }
        }
    }

    /// Stop every held track. Later calls are no-ops.
    ///
    /// All tracks are stopped even when one fails; the first failure is returned.
    pub fn release(&self) -> Result<(), SessionError> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let mut tracks = match self.held.lock() {
            Ok(mut held) => std::mem::take(&mut *held),
            Err(_) => Vec::new(),
        };
        if let Some(screen) = self.screen.lock().ok().and_then(|mut s| s.take()) {
            tracks.push(screen);
        }

        let mut first = None;
        for track in &tracks {
            if let Err(e) = track.stop() {
                warn!(label = track.label(), error = %e, "Failed to release track");
                first.get_or_insert(SessionError::device(device_kind(track), e));
            }
        }
        info!(count = tracks.len(), "Released local media");
        first.map_or(Ok(()), Err)
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    pub fn held_count(&self) -> usize {
        self.held.lock().map(|h| h.len()).unwrap_or(0)
    }

    fn hold(&self, track: MediaTrack) -> Result<(), SessionError> {
        if self.is_released() {
            debug!(label = track.label(), "Discarding track acquired after release");
            let _ = track.stop();
            return Err(SessionError::Cancelled);
        }
        if let Ok(mut held) = self.held.lock() {
            held.push(track);
        }
        Ok(())
    }
}

fn device_kind(track: &MediaTrack) -> DeviceKind {
    match track.source() {
        TrackSource::Microphone => DeviceKind::Microphone,
        TrackSource::Screen => DeviceKind::Screen,
        _ => match track.kind() {
            TrackKind::Audio => DeviceKind::Microphone,
            TrackKind::Video => DeviceKind::Camera,
        },
    }
}
