//! Session phases and paired enter/exit handling
//!
//! The authoritative `GameState` lives in a replicated value. A
//! [`GameStateMachine`] tracks which state this process has actually
//! entered, so every change runs exactly one exit before its enter, whether
//! the change came from a local transition or from resyncing to the
//! replicated value.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::net::replicated::{ReplicatedValue, ReplicationError, Writer};

use super::presentation::Presentation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameState {
    #[default]
    WaitingToReadyUp,
    ReadiedUp,
    Playing,
    Win,
    Podium,
}

impl GameState {
    /// The forward edge out of this state
    pub fn next(self) -> GameState {
        match self {
            GameState::WaitingToReadyUp => GameState::ReadiedUp,
            GameState::ReadiedUp => GameState::Playing,
            GameState::Playing => GameState::Win,
            GameState::Win => GameState::Podium,
            GameState::Podium => GameState::WaitingToReadyUp,
        }
    }

    /// Forward edges, plus a session reset to `WaitingToReadyUp` from anywhere
    pub fn can_transition_to(self, to: GameState) -> bool {
        self != to && (self.next() == to || to == GameState::WaitingToReadyUp)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("illegal transition {from:?} -> {to:?}")]
    Illegal { from: GameState, to: GameState },

    #[error(transparent)]
    Replication(#[from] ReplicationError),
}

#[derive(Debug, Default)]
pub struct GameStateMachine {
    active: Option<GameState>,
    enters: u64,
    exits: u64,
}

impl GameStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// The state whose enter action ran last without a matching exit
    pub fn active(&self) -> Option<GameState> {
        self.active
    }

    pub fn enter_count(&self) -> u64 {
        self.enters
    }

    pub fn exit_count(&self) -> u64 {
        self.exits
    }

    /// Bring the locally entered state in line with `target`.
    ///
    /// Returns `true` when an exit/enter pair ran.
    pub fn sync_to<P: Presentation + ?Sized>(&mut self, target: GameState, presentation: &mut P) -> bool {
        if self.active == Some(target) {
            return false;
        }

        if let Some(old) = self.active.take() {
            self.exits += 1;
            presentation.state_exited(old);
        }
        debug!(state = ?target, "Entering state");
        self.enters += 1;
        self.active = Some(target);
        presentation.state_entered(target);
        true
    }

    /// Authoritative transition: validate the edge, write the replicated
    /// value, then run the paired exit/enter.
    pub fn transition<P: Presentation + ?Sized>(
        &mut self,
        state: &mut ReplicatedValue<GameState>,
        writer: Writer,
        to: GameState,
        presentation: &mut P,
    ) -> Result<(), TransitionError> {
        let from = state.get();
        if !from.can_transition_to(to) {
            return Err(TransitionError::Illegal { from, to });
        }
        state.write(writer, to)?;
        self.sync_to(to, presentation);
        Ok(())
    }

    /// Mirror side: replay whatever pair is needed to match the replicated value
    pub fn resync<P: Presentation + ?Sized>(
        &mut self,
        state: &ReplicatedValue<GameState>,
        presentation: &mut P,
    ) -> bool {
        self.sync_to(state.get(), presentation)
    }
}
