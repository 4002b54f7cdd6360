//! Network port: transport-level peers as the manager sees them.
//!
//! The transport owns connection state, handshaking, and the mapping of
//! request/response correlation ids for `request`. The manager only ever
//! addresses peers it was handed.

use std::sync::Arc;

use async_trait::async_trait;
use tessera_core::{Message, MessageKind, PeerId};

/// One connected, handshaked peer.
#[async_trait]
pub trait Peer: Send + Sync {
    /// The peer's static public key.
    fn id(&self) -> PeerId;

    /// Recent-misbehavior flag maintained by the host's peer scoring.
    fn is_misbehaving(&self) -> bool {
        false
    }

    /// Fire-and-forget send. Returns false on transport failure.
    async fn send(&self, message: &Message) -> bool;

    /// Request/response against this peer. The transport assigns the
    /// correlation id and matches the reply; None on timeout.
    async fn request(&self, kind: MessageKind) -> Option<Message>;

    /// Tear the connection down, with a human-readable reason for the log.
    async fn disconnect(&self, reason: &str);
}

/// The transport's fan-out surface.
#[async_trait]
pub trait Network: Send + Sync {
    /// Peers that have completed the transport handshake.
    fn handshaked_peers(&self) -> Vec<Arc<dyn Peer>>;

    /// Fan a message out: `build` is called once per connected peer and
    /// returns the message for that peer, or None to skip it.
    async fn broadcast(&self, build: &(dyn for<'a> Fn(&'a dyn Peer) -> Option<Message> + Send + Sync));
}
