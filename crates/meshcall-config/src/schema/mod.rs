//! Configuration schema types for meshcall.
//!
//! All structs use `serde(default)` so partial configs work correctly.
//! Missing fields are filled with the tuning values the room engine ships with.

mod ice;
mod media;
mod room;
mod signaling;
mod system;
mod voice_activity;

pub use ice::*;
pub use media::*;
pub use room::*;
pub use signaling::*;
pub use system::*;
pub use voice_activity::*;

use serde::{Deserialize, Serialize};

/// Current config schema version.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Root configuration for meshcall.
///
/// Only override what you want to change.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    pub signaling: SignalingConfig,
    pub room: RoomConfig,
    pub voice_activity: VoiceActivityConfig,
    pub media: MediaConfig,
    pub ice: IceConfig,
    pub logging: LoggingConfig,
}
