//! Outbound message routing
//!
//! The session produces [`Envelope`]s; each connection's writer task keeps
//! only the envelopes whose [`Target`] includes its own peer.

use tokio::sync::broadcast;

use crate::game::PlayerId;
use crate::ws::protocol::ServerMsg;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    All,
    AllExcept(PlayerId),
    Player(PlayerId),
}

impl Target {
    pub fn includes(&self, peer: PlayerId) -> bool {
        match self {
            Target::All => true,
            Target::AllExcept(excluded) => *excluded != peer,
            Target::Player(id) => *id == peer,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Envelope {
    pub target: Target,
    pub msg: ServerMsg,
}

/// Where the authoritative session pushes outbound messages
pub trait Transport {
    /// Fire-and-forget; delivery to peers that are gone is silently dropped
    fn deliver(&self, target: Target, msg: ServerMsg);
}

impl Transport for broadcast::Sender<Envelope> {
    fn deliver(&self, target: Target, msg: ServerMsg) {
        // No receivers just means nobody is connected
        let _ = self.send(Envelope { target, msg });
    }
}
