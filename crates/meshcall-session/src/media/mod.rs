//! Local and remote media tracks.
//!
//! Capture goes through the [`MediaDevices`] seam so the room engine never
//! talks to a platform API directly. Tracks are reference-counted handles;
//! stopping one releases the underlying device exactly once.

mod capture;
mod devices;
mod synthetic;
mod track;

pub use capture::LocalMedia;
pub use devices::MediaDevices;
pub use synthetic::SyntheticVideo;
pub use track::{AudioAnalyser, MediaTrack, MediaTrackBundle, TrackKind, TrackSource};
