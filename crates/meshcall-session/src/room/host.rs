//! Application-level owner of at most one room visit at a time.

use meshcall_common::SessionError;
use tracing::{info, warn};

use super::coordinator::{RoomCoordinator, RoomDeps};
use super::handle::RoomHandle;
use crate::config::SessionConfig;

pub struct SessionHost {
    deps: RoomDeps,
    config: SessionConfig,
    current: Option<RoomHandle>,
}

impl SessionHost {
    pub fn new(deps: RoomDeps, config: SessionConfig) -> Self {
        Self {
            deps,
            config,
            current: None,
        }
    }

    pub fn current(&self) -> Option<&RoomHandle> {
        self.current.as_ref()
    }

    /// Enter `room_id`, leaving any other room first.
    ///
    /// Entering the room that is already running returns the existing handle
    /// instead of starting a second visit.
    pub async fn enter(
        &mut self,
        room_id: &str,
        display_name: &str,
    ) -> Result<&RoomHandle, SessionError> {
        let reuse = self
            .current
            .as_ref()
            .is_some_and(|h| h.room_id() == room_id && !h.is_closed());

        if !reuse {
            if let Some(previous) = self.current.take() {
                info!(from = %previous.room_id(), to = room_id, "Switching rooms");
                if let Err(e) = previous.leave().await {
                    warn!(room = %previous.room_id(), error = %e, "Previous room left with errors");
                }
            }
            let coordinator =
                RoomCoordinator::new(room_id, display_name, &self.deps, self.config.clone());
            self.current = Some(RoomHandle::spawn(coordinator));
        }

        self.current
            .as_ref()
            .ok_or_else(|| SessionError::InvalidState("no room running".into()))
    }

    /// Leave the current room, if any.
    pub async fn leave(&mut self) -> Result<(), SessionError> {
        match self.current.take() {
            Some(handle) => handle.leave().await,
            None => Ok(()),
        }
    }
}
