//! Client side of the session
//!
//! A [`ClientSession`] is transport-agnostic: feed it every [`ServerMsg`]
//! with [`ClientSession::handle`], call [`ClientSession::tick`] once per
//! frame, and send whatever [`ClientSession::take_outbox`] returns.

use std::collections::HashMap;
use std::sync::Arc;

use glam::Vec3;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::game::combat::{LagCompensator, ShotValidation};
use crate::game::history::PositionHistory;
use crate::game::leaderboard::LeaderboardEntry;
use crate::game::movement::{BodyState, KinematicBody, MovementSync};
use crate::game::physics::{Ray, SphereWorld, LAYER_ALL};
use crate::game::presentation::{HitIndicator, Presentation};
use crate::game::shoot::{ShootRequest, ShootVerdict, ShotTracker, VerdictAction};
use crate::game::snapshot::Snapshot;
use crate::game::state_machine::{GameState, GameStateMachine};
use crate::game::track::TrackGeometry;
use crate::game::zone::ZoneState;
use crate::game::PlayerId;
use crate::net::replicated::{Authority, ReplicatedValue, Writer};
use crate::util::scheduler::Scheduler;
use crate::ws::protocol::{ClientMsg, PlayerInfo, ServerMsg};

/// Estimate of the server's session clock
#[derive(Debug, Clone, Copy)]
pub struct ServerClock {
    /// server time minus local time
    offset: Option<f64>,
    alpha: f64,
}

impl ServerClock {
    pub const DEFAULT_ALPHA: f64 = 0.2;

    pub fn new(alpha: f64) -> Self {
        Self {
            offset: None,
            alpha: alpha.clamp(0.0, 1.0),
        }
    }

    /// Fold in a server stamp received at `local_now`. The stamp is half a
    /// round trip old by the time it arrives.
    pub fn observe(&mut self, server_time: f64, rtt: Option<f64>, local_now: f64) {
        let one_way = rtt.filter(|rtt| rtt.is_finite() && *rtt > 0.0).unwrap_or(0.0) / 2.0;
        let estimate = server_time + one_way - local_now;
        self.offset = Some(match self.offset {
            Some(offset) => offset + (estimate - offset) * self.alpha,
            None => estimate,
        });
    }

    pub fn server_now(&self, local_now: f64) -> f64 {
        local_now + self.offset.unwrap_or(0.0)
    }

    pub fn is_synced(&self) -> bool {
        self.offset.is_some()
    }
}

impl Default for ServerClock {
    fn default() -> Self {
        Self::new(Self::DEFAULT_ALPHA)
    }
}

/// A remote player as this client renders it
#[derive(Debug)]
struct ObservedPlayer {
    sync: MovementSync,
    body: BodyState,
    alive: bool,
}

/// Everything one client tracks about the session
pub struct ClientSession<P: Presentation> {
    player_id: Option<PlayerId>,
    config: SessionConfig,
    clock: ServerClock,
    owner: Option<MovementSync>,
    motion: Option<ReplicatedValue<Snapshot>>,
    observers: HashMap<PlayerId, ObservedPlayer>,
    roster: HashMap<PlayerId, PlayerInfo>,
    world: SphereWorld,
    game_state: ReplicatedValue<GameState>,
    machine: GameStateMachine,
    zone: ReplicatedValue<ZoneState>,
    track: Option<Arc<dyn TrackGeometry>>,
    shots: ShotTracker,
    replays: Scheduler<ShootVerdict>,
    health: f32,
    alive: bool,
    countdown_ends_at: Option<f64>,
    leaderboard: Option<Vec<LeaderboardEntry>>,
    leaderboard_shown: bool,
    outbox: Vec<ClientMsg>,
    presentation: P,
    local_now: f64,
}

impl<P: Presentation> ClientSession<P> {
    /// `config` supplies weapon range, hitbox size and history retention;
    /// the smoothing window is replaced by the server's on welcome.
    pub fn new(config: SessionConfig, track: Option<Arc<dyn TrackGeometry>>, presentation: P) -> Self {
        Self {
            player_id: None,
            world: SphereWorld::new(config.hitbox_radius),
            health: config.weapon.max_health,
            config,
            clock: ServerClock::default(),
            owner: None,
            motion: None,
            observers: HashMap::new(),
            roster: HashMap::new(),
            game_state: ReplicatedValue::new("game_state", Authority::Server, GameState::default()),
            machine: GameStateMachine::new(),
            zone: ReplicatedValue::new("zone", Authority::Server, ZoneState::default()),
            track,
            shots: ShotTracker::new(),
            replays: Scheduler::new(),
            alive: true,
            countdown_ends_at: None,
            leaderboard: None,
            leaderboard_shown: false,
            outbox: Vec::new(),
            presentation,
            local_now: 0.0,
        }
    }

    pub fn player_id(&self) -> Option<PlayerId> {
        self.player_id
    }

    pub fn clock(&self) -> &ServerClock {
        &self.clock
    }

    pub fn server_now(&self, local_now: f64) -> f64 {
        self.clock.server_now(local_now)
    }

    /// Replicated game state as last received
    pub fn game_state(&self) -> GameState {
        self.game_state.get()
    }

    /// The state whose enter action ran locally
    pub fn active_state(&self) -> Option<GameState> {
        self.machine.active()
    }

    pub fn machine(&self) -> &GameStateMachine {
        &self.machine
    }

    pub fn zone(&self) -> ZoneState {
        self.zone.get()
    }

    pub fn world(&self) -> &SphereWorld {
        &self.world
    }

    pub fn health(&self) -> f32 {
        self.health
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn countdown_ends_at(&self) -> Option<f64> {
        self.countdown_ends_at
    }

    pub fn leaderboard(&self) -> Option<&[LeaderboardEntry]> {
        self.leaderboard.as_deref()
    }

    pub fn roster(&self) -> impl Iterator<Item = &PlayerInfo> {
        self.roster.values()
    }

    /// Where a remote player is currently rendered
    pub fn observed(&self, player_id: PlayerId) -> Option<BodyState> {
        self.observers.get(&player_id).map(|observed| observed.body)
    }

    pub fn observed_history(&self, player_id: PlayerId) -> Option<Arc<RwLock<PositionHistory>>> {
        self.observers
            .get(&player_id)
            .map(|observed| observed.sync.history().clone())
    }

    pub fn pending_shots(&self) -> usize {
        self.shots.pending()
    }

    pub fn presentation(&self) -> &P {
        &self.presentation
    }

    pub fn presentation_mut(&mut self) -> &mut P {
        &mut self.presentation
    }

    pub fn join(&mut self, name: impl Into<String>) {
        self.outbox.push(ClientMsg::Join { name: name.into() });
    }

    pub fn set_ready(&mut self, ready: bool) {
        self.outbox.push(ClientMsg::SetReady { ready });
    }

    pub fn leave(&mut self) {
        self.outbox.push(ClientMsg::Leave);
    }

    /// Messages to send, oldest first
    pub fn take_outbox(&mut self) -> Vec<ClientMsg> {
        std::mem::take(&mut self.outbox)
    }

    /// Apply one message from the server
    pub fn handle(&mut self, msg: ServerMsg, local_now: f64) {
        self.local_now = local_now;

        match msg {
            ServerMsg::Welcome {
                player_id,
                server_time,
                smoothing_window,
                game_state,
                zone,
                players,
                ..
            } => self.on_welcome(player_id, server_time, smoothing_window, game_state, zone, players),
            ServerMsg::PlayerJoined { player } => {
                self.observe_player(player.player_id);
                self.roster.insert(player.player_id, player);
            }
            ServerMsg::PlayerLeft { player_id, reason } => {
                debug!(player_id, reason = %reason, "Player left");
                self.observers.remove(&player_id);
                self.roster.remove(&player_id);
                self.world.remove_hitbox(player_id);
            }
            ServerMsg::PlayerSnapshot {
                player_id,
                snapshot,
            } => {
                if Some(player_id) == self.player_id {
                    return;
                }
                self.observe_player(player_id);
                if let Some(observed) = self.observers.get_mut(&player_id) {
                    observed.sync.receive(snapshot);
                }
            }
            ServerMsg::GameState { state } => {
                self.game_state.apply_remote(state);
                if state == GameState::WaitingToReadyUp {
                    self.clear_round();
                }
            }
            ServerMsg::Countdown { ends_at } => self.countdown_ends_at = Some(ends_at),
            ServerMsg::Zone { zone } => {
                self.zone.apply_remote(zone);
                if let Some(track) = &self.track {
                    self.presentation.zone_moved(&zone.markers(track.as_ref()));
                }
            }
            ServerMsg::ShootVerdict(verdict) => self.on_verdict(verdict),
            ServerMsg::Vitals {
                player_id,
                health,
                alive,
            } => self.on_vitals(player_id, health, alive),
            ServerMsg::PlayerDied { player_id, cause } => {
                self.presentation.player_died(player_id, cause);
            }
            ServerMsg::Leaderboard { entries } => self.leaderboard = Some(entries),
            ServerMsg::Ping { server_time, rtt } => {
                self.clock.observe(server_time, rtt, local_now);
                self.outbox.push(ClientMsg::Pong { server_time });
            }
            ServerMsg::Error { code, message } => {
                warn!(code = %code, message = %message, "Server error");
            }
        }
    }

    fn on_welcome(
        &mut self,
        player_id: PlayerId,
        server_time: f64,
        smoothing_window: f64,
        game_state: GameState,
        zone: ZoneState,
        players: Vec<PlayerInfo>,
    ) {
        self.player_id = Some(player_id);
        self.config.smoothing_window = smoothing_window;
        self.clock.observe(server_time, None, self.local_now);

        let history = Arc::new(RwLock::new(PositionHistory::new(
            player_id,
            self.config.history_retention(),
        )));
        self.owner = Some(MovementSync::owner(player_id, history));
        self.motion = Some(ReplicatedValue::new(
            "motion",
            Authority::Owner(player_id),
            Snapshot::default(),
        ));

        self.game_state.apply_remote(game_state);
        self.zone.apply_remote(zone);
        for player in players {
            if player.player_id != player_id {
                self.observe_player(player.player_id);
            }
            self.roster.insert(player.player_id, player);
        }

        info!(player_id, "Joined session");
    }

    fn observe_player(&mut self, player_id: PlayerId) {
        if Some(player_id) == self.player_id || self.observers.contains_key(&player_id) {
            return;
        }
        let history = Arc::new(RwLock::new(PositionHistory::new(
            player_id,
            self.config.history_retention(),
        )));
        self.observers.insert(
            player_id,
            ObservedPlayer {
                sync: MovementSync::observer(player_id, history, self.config.smoothing_window),
                body: BodyState::default(),
                alive: true,
            },
        );
    }

    fn on_vitals(&mut self, player_id: PlayerId, health: f32, alive: bool) {
        if Some(player_id) == self.player_id {
            self.health = health;
            self.alive = alive;
        } else if let Some(observed) = self.observers.get_mut(&player_id) {
            observed.alive = alive;
            if !alive {
                self.world.remove_hitbox(player_id);
            }
        }
        if let Some(info) = self.roster.get_mut(&player_id) {
            info.alive = alive;
        }
    }

    fn on_verdict(&mut self, verdict: ShootVerdict) {
        let Some(me) = self.player_id else {
            return;
        };
        let server_now = self.clock.server_now(self.local_now);

        match self.shots.on_verdict(me, &verdict, server_now) {
            VerdictAction::Duplicate | VerdictAction::Stale => {}
            VerdictAction::Confirm { validation, .. } => match validation {
                ShotValidation::Hit(victim) => {
                    self.presentation.hit_indicator(HitIndicator::YouHit(victim));
                }
                ShotValidation::Discrepancy { claimed, resolved } => {
                    self.presentation.hit_indicator(HitIndicator::Corrected {
                        predicted: claimed,
                        resolved,
                    });
                }
                ShotValidation::Miss => {}
            },
            VerdictAction::Replay { delay } => {
                self.replays.schedule_after(self.local_now, delay, verdict);
            }
        }
    }

    /// Fire locally: predict against what this client renders, show it at
    /// once, and ask the server to confirm.
    pub fn shoot(&mut self, origin: Vec3, direction: Vec3, local_now: f64) -> Option<ShootRequest> {
        let me = self.player_id?;
        if !self.alive {
            return None;
        }
        self.local_now = local_now;
        let server_now = self.clock.server_now(local_now);

        let ray = Ray::new(origin, direction, self.config.weapon.range, LAYER_ALL).ignoring(me);
        let hit = LagCompensator::predict(&self.world, &ray);
        let predicted = hit.and_then(|hit| hit.player());
        let request = self.shots.fire(server_now, origin, ray.direction, predicted);

        self.presentation.shot_fired(
            &ShootVerdict {
                shot_id: request.shot_id,
                shooter: me,
                time: server_now,
                origin,
                direction: ray.direction,
                victim: predicted,
                hit_point: hit.map(|hit| hit.point),
            },
            true,
        );
        self.outbox.push(ClientMsg::Shoot(request));
        Some(request)
    }

    /// Per-frame update: due replays, owner capture, observer smoothing,
    /// state-machine resync and the podium reveal.
    pub fn tick<B: KinematicBody + ?Sized>(&mut self, local_now: f64, body: &B) {
        self.local_now = local_now;
        let server_now = self.clock.server_now(local_now);

        for verdict in self.replays.drain_due(local_now) {
            self.presentation.shot_fired(&verdict, false);
            if verdict.victim.is_some() && verdict.victim == self.player_id {
                self.presentation.hit_indicator(HitIndicator::YouWereHit {
                    by: verdict.shooter,
                });
            }
        }

        if let (Some(me), Some(owner), Some(motion)) =
            (self.player_id, self.owner.as_mut(), self.motion.as_mut())
        {
            if let Some(snapshot) = owner.capture(server_now, body) {
                if motion.write(Writer::Client(me), snapshot).is_ok() {
                    if let Some(snapshot) = motion.take_dirty() {
                        self.outbox.push(ClientMsg::Snapshot {
                            player_id: me,
                            snapshot,
                        });
                    }
                }
            }
        }

        for (&player_id, observed) in self.observers.iter_mut() {
            if observed.sync.follow(server_now, &mut observed.body).is_none() {
                continue;
            }
            if observed.alive {
                self.world.upsert_hitbox(player_id, observed.body.position);
            }
        }

        self.machine.resync(&self.game_state, &mut self.presentation);

        if self.machine.active() == Some(GameState::Podium) && !self.leaderboard_shown {
            if let Some(entries) = &self.leaderboard {
                self.presentation.leaderboard_ready(entries);
                self.leaderboard_shown = true;
            }
        }
    }

    /// Forget everything tied to the finished round
    fn clear_round(&mut self) {
        self.shots.clear();
        self.replays.clear();
        self.leaderboard = None;
        self.leaderboard_shown = false;
        self.countdown_ends_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::presentation::{PresentationEvent, RecordingPresentation};
    use assert_approx_eq::assert_approx_eq;

    fn welcome(player_id: PlayerId, server_time: f64, others: &[PlayerId]) -> ServerMsg {
        let mut players: Vec<PlayerInfo> = others
            .iter()
            .map(|&id| PlayerInfo {
                player_id: id,
                name: format!("p{id}"),
                ready: false,
                alive: true,
            })
            .collect();
        players.push(PlayerInfo {
            player_id,
            name: "me".into(),
            ready: false,
            alive: true,
        });
        ServerMsg::Welcome {
            player_id,
            server_time,
            tick_rate: 30,
            smoothing_window: 0.1,
            game_state: GameState::WaitingToReadyUp,
            zone: ZoneState::default(),
            players,
        }
    }

    fn client() -> ClientSession<RecordingPresentation> {
        ClientSession::new(SessionConfig::default(), None, RecordingPresentation::default())
    }

    #[test]
    fn clock_tracks_server_offset() {
        let mut clock = ServerClock::new(0.5);
        assert!(!clock.is_synced());
        assert_eq!(clock.server_now(3.0), 3.0);

        // server says 100 when we see 10, with 0.2 s round trip
        clock.observe(100.0, Some(0.2), 10.0);
        assert_approx_eq!(clock.server_now(10.0), 100.1, 1e-9);

        clock.observe(101.0, Some(0.2), 11.0);
        assert_approx_eq!(clock.server_now(11.0), 101.1, 1e-9);
    }

    #[test]
    fn welcome_sets_up_owner_and_observers() {
        let mut session = client();
        session.handle(welcome(3, 50.0, &[1, 2]), 5.0);

        assert_eq!(session.player_id(), Some(3));
        assert!(session.observed(1).is_some());
        assert!(session.observed(2).is_some());
        assert!(session.observed(3).is_none());
        assert_approx_eq!(session.server_now(5.0), 50.0, 1e-9);

        session.tick(5.0, &BodyState::default());
        assert_eq!(session.active_state(), Some(GameState::WaitingToReadyUp));
        let sent = session.take_outbox();
        assert!(matches!(
            sent.as_slice(),
            [ClientMsg::Snapshot { player_id: 3, snapshot }] if snapshot.send_time == 50.0
        ));
    }

    #[test]
    fn ping_is_answered_with_pong() {
        let mut session = client();
        session.handle(welcome(1, 10.0, &[]), 0.0);
        session.handle(
            ServerMsg::Ping {
                server_time: 12.0,
                rtt: Some(0.1),
            },
            2.0,
        );
        assert_eq!(
            session.take_outbox(),
            vec![ClientMsg::Pong { server_time: 12.0 }]
        );
    }

    #[test]
    fn drifted_state_replays_paired_transitions() {
        let mut session = client();
        session.handle(welcome(1, 0.0, &[]), 0.0);
        session.tick(0.0, &BodyState::default());

        // two authoritative changes arrive between frames
        session.handle(
            ServerMsg::GameState {
                state: GameState::ReadiedUp,
            },
            0.1,
        );
        session.handle(
            ServerMsg::GameState {
                state: GameState::Playing,
            },
            0.2,
        );
        session.tick(0.3, &BodyState::default());

        assert_eq!(session.active_state(), Some(GameState::Playing));
        assert_eq!(
            session.machine().enter_count(),
            session.machine().exit_count() + 1
        );
        let events = session.presentation_mut().take();
        assert!(events.ends_with(&[
            PresentationEvent::Exited(GameState::WaitingToReadyUp),
            PresentationEvent::Entered(GameState::Playing),
        ]));
    }

    #[test]
    fn remote_shots_replay_after_delay() {
        let mut session = client();
        session.handle(welcome(1, 100.0, &[2]), 0.0);

        let verdict = ShootVerdict {
            shot_id: 0,
            shooter: 2,
            time: 100.3,
            origin: Vec3::ZERO,
            direction: Vec3::X,
            victim: Some(1),
            hit_point: None,
        };
        session.handle(ServerMsg::ShootVerdict(verdict), 0.1);
        session.handle(ServerMsg::ShootVerdict(verdict), 0.1);
        session.presentation_mut().take();

        session.tick(0.2, &BodyState::default());
        assert!(!session
            .presentation()
            .events
            .iter()
            .any(|e| matches!(e, PresentationEvent::Shot { .. })));

        session.tick(0.35, &BodyState::default());
        let shots: Vec<_> = session
            .presentation_mut()
            .take()
            .into_iter()
            .filter(|e| {
                matches!(
                    e,
                    PresentationEvent::Shot { .. }
                        | PresentationEvent::Indicator(HitIndicator::YouWereHit { by: 2 })
                )
            })
            .collect();
        // one replay despite the duplicate verdict, plus the hit indicator
        assert_eq!(shots.len(), 2);
    }

    #[test]
    fn own_shot_is_predicted_then_corrected() {
        let mut session = client();
        session.handle(welcome(1, 0.0, &[2]), 0.0);
        session.handle(
            ServerMsg::PlayerSnapshot {
                player_id: 2,
                snapshot: Snapshot::at_rest(0.0, Vec3::new(0.0, 0.0, 10.0)),
            },
            0.0,
        );
        session.tick(0.5, &BodyState::default());
        session.take_outbox();

        let request = session.shoot(Vec3::ZERO, Vec3::Z, 0.5).unwrap();
        assert_eq!(request.claimed_victim, Some(2));
        assert_eq!(session.pending_shots(), 1);

        // the server saw it differently
        session.handle(
            ServerMsg::ShootVerdict(ShootVerdict {
                shot_id: request.shot_id,
                shooter: 1,
                time: 0.6,
                origin: Vec3::ZERO,
                direction: Vec3::Z,
                victim: None,
                hit_point: None,
            }),
            0.6,
        );
        let events = session.presentation_mut().take();
        assert!(events.contains(&PresentationEvent::Indicator(HitIndicator::Corrected {
            predicted: Some(2),
            resolved: None,
        })));
        assert_eq!(session.pending_shots(), 0);
    }

    #[test]
    fn leaderboard_waits_for_podium() {
        let mut session = client();
        session.handle(welcome(1, 0.0, &[]), 0.0);
        session.handle(
            ServerMsg::GameState {
                state: GameState::Win,
            },
            0.0,
        );
        session.handle(ServerMsg::Leaderboard { entries: vec![] }, 0.0);
        session.tick(0.1, &BodyState::default());
        assert!(!session
            .presentation()
            .events
            .iter()
            .any(|e| matches!(e, PresentationEvent::Leaderboard(_))));

        session.handle(
            ServerMsg::GameState {
                state: GameState::Podium,
            },
            0.2,
        );
        session.tick(0.3, &BodyState::default());
        session.tick(0.4, &BodyState::default());
        let shown = session
            .presentation()
            .events
            .iter()
            .filter(|e| matches!(e, PresentationEvent::Leaderboard(_)))
            .count();
        assert_eq!(shown, 1);
    }
}
