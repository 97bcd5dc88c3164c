//! Room visits.
//!
//! A [`RoomCoordinator`] owns everything one visit creates and applies
//! events serially. [`RoomHandle`] runs it on a task; [`SessionHost`] keeps
//! at most one visit alive.

mod coordinator;
mod handle;
mod host;
mod types;

pub use coordinator::{RoomCoordinator, RoomDeps, Wakeup};
pub use handle::RoomHandle;
pub use host::SessionHost;
pub use types::{
    LinkSummary, LocalSession, Participant, RoomEvent, RoomSnapshot, RoomState, Roster,
};

#[cfg(test)]
mod tests;
