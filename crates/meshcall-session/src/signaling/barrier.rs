//! Join barrier: the room join is announced only once the signaling channel
//! is connected and the peer transport has assigned a local identity.
//!
//! Each connection generation releases at most once. A lost connection after
//! release starts a new generation so the join is re-announced on reconnect.

/// Outcome of a barrier release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    pub generation: u64,
    pub identity: Option<String>,
    /// Released by timeout rather than by both conditions holding.
    pub degraded: bool,
}

#[derive(Debug, Default)]
pub struct JoinBarrier {
    armed: bool,
    connected: bool,
    identity: Option<String>,
    released: bool,
    generation: u64,
}

impl JoinBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start waiting for the join conditions.
    pub fn arm(&mut self) -> Option<Release> {
        self.armed = true;
        self.try_release()
    }

    pub fn disarm(&mut self) {
        self.armed = false;
    }

    pub fn channel_connected(&mut self) -> Option<Release> {
        self.connected = true;
        self.try_release()
    }

    /// The channel dropped. A released generation is closed out.
    pub fn channel_lost(&mut self) {
        self.connected = false;
        if self.released {
            self.released = false;
            self.generation += 1;
        }
    }

    /// A new identity after release means the service knows us by a stale id.
    pub fn identity_assigned(&mut self, identity: String) -> Option<Release> {
        let changed = self.identity.as_deref() != Some(identity.as_str());
        self.identity = Some(identity);
        if self.released && changed {
            self.released = false;
            self.generation += 1;
        }
        self.try_release()
    }

    /// Timeout fired: release with whatever is known.
    pub fn expire(&mut self) -> Option<Release> {
        if !self.armed || self.released {
            return None;
        }
        let degraded = !(self.connected && self.identity.is_some());
        Some(self.release(degraded))
    }

    /// Armed and waiting for this generation's release.
    pub fn is_pending(&self) -> bool {
        self.armed && !self.released
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    fn try_release(&mut self) -> Option<Release> {
        if self.armed && !self.released && self.connected && self.identity.is_some() {
            Some(self.release(false))
        } else {
            None
        }
    }

    fn release(&mut self, degraded: bool) -> Release {
        self.released = true;
        Release {
            generation: self.generation,
            identity: self.identity.clone(),
            degraded,
        }
    }
}
