use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::media::{AudioAnalyser, MediaTrack, MediaTrackBundle};

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Sampling parameters for one detector.
#[derive(Debug, Clone, PartialEq)]
pub struct VadSettings {
    /// Mean bin magnitude above which the speaker counts as talking.
    pub threshold: u8,
    /// How often the analyser is sampled.
    pub interval: Duration,
    /// Number of frequency bins read per sample (half the FFT size).
    pub bins: usize,
}

impl VadSettings {
    /// The sampling interval is floored at one millisecond.
    pub fn new(threshold: u32, interval: Duration, fft_size: u32) -> Self {
        Self {
            threshold: threshold.min(u32::from(u8::MAX)) as u8,
            interval: interval.max(MIN_INTERVAL),
            bins: (fft_size / 2).max(1) as usize,
        }
    }
}

/// Whose voice a detector is watching.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Speaker {
    Local,
    Remote(String),
}

/// A talking-state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceActivity {
    pub speaker: Speaker,
    pub talking: bool,
}

/// Mean magnitude of the frequency bins.
pub fn mean_amplitude(bins: &[u8]) -> f32 {
    if bins.is_empty() {
        return 0.0;
    }
    let sum: u32 = bins.iter().map(|&b| u32::from(b)).sum();
    sum as f32 / bins.len() as f32
}

pub fn is_talking(bins: &[u8], threshold: u8) -> bool {
    mean_amplitude(bins) > f32::from(threshold)
}

/// Attaches sampling loops to audio tracks.
#[derive(Debug, Clone)]
pub struct VoiceActivityDetector {
    settings: VadSettings,
}

impl VoiceActivityDetector {
    pub fn new(settings: VadSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &VadSettings {
        &self.settings
    }

    /// Start sampling the bundle's audio track.
    ///
    /// Returns `None` when the bundle has no audio or the track exposes no
    /// analyser. Transitions are sent to `sink` when one is given.
    pub fn attach(
        &self,
        bundle: &MediaTrackBundle,
        speaker: Speaker,
        sink: Option<mpsc::UnboundedSender<VoiceActivity>>,
    ) -> Option<VadHandle> {
        let track = bundle.audio.clone()?;
        let analyser = Arc::clone(track.analyser()?);

        let (talking_tx, talking_rx) = watch::channel(false);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(sampling_loop(
            track,
            analyser,
            self.settings.clone(),
            speaker.clone(),
            talking_tx,
            sink,
            cancel.clone(),
        ));
        debug!(speaker = ?speaker, "Voice activity attached");

        Some(VadHandle {
            speaker,
            talking: talking_rx,
            cancel,
            task,
        })
    }
}

/// Running detector. Dropping the handle detaches it.
pub struct VadHandle {
    speaker: Speaker,
    talking: watch::Receiver<bool>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl VadHandle {
    pub fn speaker(&self) -> &Speaker {
        &self.speaker
    }

    pub fn is_talking(&self) -> bool {
        *self.talking.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<bool> {
        self.talking.clone()
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop sampling. No transitions are delivered after this returns.
    pub fn detach(&self) {
        self.cancel.cancel();
        self.task.abort();
    }
}

impl Drop for VadHandle {
    fn drop(&mut self) {
        self.detach();
    }
}

async fn sampling_loop(
    track: MediaTrack,
    analyser: Arc<dyn AudioAnalyser>,
    settings: VadSettings,
    speaker: Speaker,
    talking_tx: watch::Sender<bool>,
    sink: Option<mpsc::UnboundedSender<VoiceActivity>>,
    cancel: CancellationToken,
) {
    let mut bins = vec![0u8; settings.bins];
    let mut ticker = tokio::time::interval(settings.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let talking = if track.is_ended() {
            false
        } else if track.is_enabled() {
            analyser.byte_frequency_data(&mut bins);
            is_talking(&bins, settings.threshold)
        } else {
            false
        };

        let changed = talking_tx.send_if_modified(|current| {
            if *current == talking {
                return false;
            }
            *current = talking;
            true
        });
        if changed && !cancel.is_cancelled() {
            if let Some(sink) = &sink {
                let _ = sink.send(VoiceActivity {
                    speaker: speaker.clone(),
                    talking,
                });
            }
        }

        if track.is_ended() {
            debug!(speaker = ?speaker, "Voice activity stopped, track ended");
            return;
        }
    }
}
