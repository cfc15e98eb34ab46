//! Session-wide state handed to every component that needs it

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tracing::info;

use crate::net::replicated::{Authority, ReplicatedValue};

use super::history::PositionHistory;
use super::leaderboard::StatsSummary;
use super::snapshot::Snapshot;
use super::state_machine::GameState;
use super::track::{LapCounter, TrackGeometry};
use super::zone::ZoneState;
use super::PlayerId;

/// Smoothed round-trip time for one peer
#[derive(Debug, Clone, Copy)]
pub struct RttTracker {
    smoothed: Option<f64>,
    /// Weight of each new sample
    alpha: f64,
}

impl RttTracker {
    pub const DEFAULT_ALPHA: f64 = 0.125;

    pub fn new(alpha: f64) -> Self {
        Self {
            smoothed: None,
            alpha: alpha.clamp(0.0, 1.0),
        }
    }

    /// Fold in one measurement; nonsense samples are ignored
    pub fn record(&mut self, sample: f64) -> Option<f64> {
        if sample.is_finite() && sample >= 0.0 {
            self.smoothed = Some(match self.smoothed {
                Some(rtt) => rtt + (sample - rtt) * self.alpha,
                None => sample,
            });
        }
        self.smoothed
    }

    pub fn rtt(&self) -> Option<f64> {
        self.smoothed
    }
}

impl Default for RttTracker {
    fn default() -> Self {
        Self::new(Self::DEFAULT_ALPHA)
    }
}

/// Mutable per-player session state
#[derive(Debug)]
pub struct PlayerState {
    pub ready: bool,
    /// Took part in the current round (late joiners spectate)
    pub participating: bool,
    pub alive: bool,
    pub health: f32,
    pub won: bool,
    pub stats: StatsSummary,
    pub laps: LapCounter,
    pub rtt: RttTracker,
    /// Owner-published movement
    pub motion: ReplicatedValue<Snapshot>,
}

/// One connected player
#[derive(Debug)]
pub struct PlayerEntry {
    pub id: PlayerId,
    pub name: String,
    /// Shared so an in-flight rollback keeps it alive past a disconnect
    pub history: Arc<RwLock<PositionHistory>>,
    pub state: Mutex<PlayerState>,
}

impl PlayerEntry {
    pub fn new(id: PlayerId, name: String, history_retention: f64, max_health: f32) -> Self {
        Self {
            id,
            name,
            history: Arc::new(RwLock::new(PositionHistory::new(id, history_retention))),
            state: Mutex::new(PlayerState {
                ready: false,
                participating: false,
                alive: false,
                health: max_health,
                won: false,
                stats: StatsSummary::default(),
                laps: LapCounter::default(),
                rtt: RttTracker::default(),
                motion: ReplicatedValue::new("motion", Authority::Owner(id), Snapshot::default()),
            }),
        }
    }

    pub fn latest_snapshot(&self) -> Option<Snapshot> {
        self.history.read().latest().copied()
    }

    pub fn rtt(&self) -> Option<f64> {
        self.state.lock().rtt.rtt()
    }

    pub fn is_alive(&self) -> bool {
        self.state.lock().alive
    }
}

/// Directory of connected players, mutated only on connect and disconnect
#[derive(Debug, Default)]
pub struct ConnectedPlayers {
    players: DashMap<PlayerId, Arc<PlayerEntry>>,
}

impl ConnectedPlayers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the id is already present
    pub fn insert(&self, entry: PlayerEntry) -> bool {
        let id = entry.id;
        if self.players.contains_key(&id) {
            return false;
        }
        self.players.insert(id, Arc::new(entry));
        true
    }

    pub fn remove(&self, id: PlayerId) -> Option<Arc<PlayerEntry>> {
        self.players.remove(&id).map(|(_, entry)| entry)
    }

    pub fn get(&self, id: PlayerId) -> Option<Arc<PlayerEntry>> {
        self.players.get(&id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, id: PlayerId) -> bool {
        self.players.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Stable copy of the directory, ordered by id.
    ///
    /// Iterating the copy is unaffected by connects or disconnects that
    /// happen during the pass.
    pub fn snapshot(&self) -> Vec<Arc<PlayerEntry>> {
        let mut entries: Vec<_> = self.players.iter().map(|e| e.value().clone()).collect();
        entries.sort_by_key(|entry| entry.id);
        entries
    }

    pub fn ids(&self) -> Vec<PlayerId> {
        self.snapshot().iter().map(|entry| entry.id).collect()
    }
}

/// Everything the session components share, passed explicitly
pub struct SessionContext {
    pub game_state: ReplicatedValue<GameState>,
    pub zone: ReplicatedValue<ZoneState>,
    pub players: Arc<ConnectedPlayers>,
    /// Absent when no rail is configured; track-dependent steps are skipped
    pub track: Option<Arc<dyn TrackGeometry>>,
}

impl SessionContext {
    pub fn new(track: Option<Arc<dyn TrackGeometry>>) -> Self {
        let mut game_state =
            ReplicatedValue::new("game_state", Authority::Server, GameState::WaitingToReadyUp);
        game_state.on_change(|old, new| {
            info!(from = ?old, to = ?new, "Game state changed");
        });

        Self {
            game_state,
            zone: ReplicatedValue::new("zone", Authority::Server, ZoneState::default()),
            players: Arc::new(ConnectedPlayers::new()),
            track,
        }
    }
}
