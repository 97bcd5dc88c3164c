//! Room signaling.
//!
//! The client talks to an external signaling service over a
//! [`SignalingChannel`]. Joining is gated by a [`JoinBarrier`]: the join is
//! announced once the channel is connected and the local transport identity
//! is known, or degraded after a timeout.

mod barrier;
mod channel;
mod client;
mod connection;
pub mod protocol;

pub use barrier::{JoinBarrier, Release};
pub use channel::{
    ChannelEvent, Connector, LoopbackConnector, LoopbackEnd, LoopbackRemote, SignalingChannel,
};
pub use client::{EventStream, SignalingClient, SignalingEvent, Subscription};
pub use connection::WsConnector;
pub use protocol::{ClientMessage, RemoteParticipant, ServerMessage};
