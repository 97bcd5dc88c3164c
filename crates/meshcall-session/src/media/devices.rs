use async_trait::async_trait;
use meshcall_common::DeviceError;

use super::track::MediaTrack;

/// Platform capture backend. Each call opens a fresh track owned by the caller.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn open_microphone(&self) -> Result<MediaTrack, DeviceError>;

    async fn open_camera(&self) -> Result<MediaTrack, DeviceError>;

    async fn open_screen(&self) -> Result<MediaTrack, DeviceError>;
}
