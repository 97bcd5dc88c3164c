//! Peer links: one media connection per remote participant.
//!
//! The [`PeerTransport`] seam does the actual media negotiation; the
//! [`PeerLinkManager`] keeps the link table consistent with what the
//! transport reports.

mod link;
mod manager;
mod transport;

pub use link::{Direction, LinkState, PeerLink};
pub use manager::{AcceptOutcome, EnsureOutcome, LinkUpdate, PeerLinkManager};
pub use transport::{
    CallId, CallKind, CallMetadata, IncomingCall, PeerTransport, TransportEvent, TransportFactory,
};
