pub mod errors;
pub mod events;
pub mod id;

pub use errors::{ConfigError, DeviceError, DeviceKind, MeshError, SessionError};
pub use events::EventBus;
pub use id::{new_correlation_id, new_id, TrackId};

pub type Result<T> = std::result::Result<T, MeshError>;
