//! Game simulation modules

pub mod combat;
pub mod history;
pub mod leaderboard;
pub mod r#match;
pub mod movement;
pub mod physics;
pub mod presentation;
pub mod session;
pub mod shoot;
pub mod snapshot;
pub mod state_machine;
pub mod track;
pub mod zone;

pub use history::{PositionHistory, Sample};
pub use movement::{BodyState, KinematicBody, MovementSync, SyncRole};
pub use r#match::{GameMatch, MatchHandle};
pub use session::{ConnectedPlayers, PlayerEntry, SessionContext};
pub use snapshot::Snapshot;
pub use state_machine::{GameState, GameStateMachine};
pub use zone::{ZoneSimulation, ZoneState};

use crate::ws::protocol::ClientMsg;

/// Session-unique player identifier, allocated on connect
pub type PlayerId = u32;

/// Player input received from WebSocket
#[derive(Debug, Clone)]
pub struct PlayerInput {
    pub player_id: PlayerId,
    pub msg: ClientMsg,
    /// Session clock time the message arrived
    pub received_at: f64,
}
