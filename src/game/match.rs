//! Authoritative session state and tick loop
//!
//! One [`GameMatch`] owns the session. Each tick runs, in order:
//! inbound messages, due timers, player movement and hitboxes, queued
//! shots (one rollback at a time), the game-state machine, the zone, and
//! finally publishing of everything that changed.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::config::SessionConfig;
use crate::net::replicated::Writer;
use crate::net::transport::{Envelope, Target, Transport};
use crate::util::scheduler::Scheduler;
use crate::util::time::{tick_delta, SimClock};
use crate::ws::protocol::{ClientMsg, PlayerInfo, ServerMsg};

use super::combat::{apply_damage, LagCompensator};
use super::leaderboard::{sort_leaderboard, LeaderboardEntry, WinDetector, WinVerdict};
use super::physics::SphereWorld;
use super::presentation::{DeathCause, Presentation};
use super::session::{ConnectedPlayers, PlayerEntry, SessionContext};
use super::shoot::{resolve_shot, ShootRequest};
use super::snapshot::Snapshot;
use super::state_machine::{GameState, GameStateMachine};
use super::track::TrackGeometry;
use super::zone::{ZoneSimulation, ZoneState};
use super::{PlayerId, PlayerInput};

const INPUT_QUEUE: usize = 1024;
const OUTBOUND_QUEUE: usize = 1024;
const MAX_NAME_LEN: usize = 24;

/// Session timers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatchAction {
    CountdownElapsed,
    PostWinElapsed,
    PodiumElapsed,
}

/// Handle to the running session
#[derive(Clone)]
pub struct MatchHandle {
    pub input_tx: mpsc::Sender<PlayerInput>,
    pub outbound: broadcast::Sender<Envelope>,
    pub players: Arc<ConnectedPlayers>,
    /// The session's clock, for stamping inbound messages
    pub clock: SimClock,
    game_state: watch::Receiver<GameState>,
    next_player_id: Arc<AtomicU32>,
}

impl MatchHandle {
    pub fn allocate_player_id(&self) -> PlayerId {
        self.next_player_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn game_state(&self) -> GameState {
        *self.game_state.borrow()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.outbound.subscribe()
    }

    /// Queue a message for the next tick; `false` once the session has stopped
    pub async fn submit(&self, player_id: PlayerId, msg: ClientMsg) -> bool {
        let input = PlayerInput {
            player_id,
            msg,
            received_at: self.clock.now(),
        };
        self.input_tx.send(input).await.is_ok()
    }
}

/// The authoritative session
pub struct GameMatch {
    config: SessionConfig,
    ctx: SessionContext,
    machine: GameStateMachine,
    zone: ZoneSimulation,
    win: WinDetector,
    compensator: LagCompensator,
    world: SphereWorld,
    timers: Scheduler<MatchAction>,
    input_rx: mpsc::Receiver<PlayerInput>,
    inputs_closed: bool,
    outbound: broadcast::Sender<Envelope>,
    clock: SimClock,
    presentation: Box<dyn Presentation>,
    pending_shots: Vec<(PlayerId, ShootRequest)>,
    leaderboard: Option<Vec<LeaderboardEntry>>,
    post_win_elapsed: bool,
    last_ping: Option<f64>,
    now: f64,
    tick: u64,
}

impl GameMatch {
    /// Create the session; `track` may be absent, which disables zone
    /// elimination and lap counting.
    pub fn new(
        config: SessionConfig,
        track: Option<Arc<dyn TrackGeometry>>,
        world: SphereWorld,
        presentation: Box<dyn Presentation>,
    ) -> (Self, MatchHandle) {
        let (input_tx, input_rx) = mpsc::channel(INPUT_QUEUE);
        let (outbound, _) = broadcast::channel(OUTBOUND_QUEUE);
        let clock = SimClock::new();
        let ctx = SessionContext::new(track);

        let handle = MatchHandle {
            input_tx,
            outbound: outbound.clone(),
            players: ctx.players.clone(),
            clock,
            game_state: ctx.game_state.subscribe(),
            next_player_id: Arc::new(AtomicU32::new(1)),
        };

        let mut game_match = Self {
            zone: ZoneSimulation::new(config.zone),
            compensator: LagCompensator::new(config.smoothing_window),
            config,
            ctx,
            machine: GameStateMachine::new(),
            win: WinDetector::new(),
            world,
            timers: Scheduler::new(),
            input_rx,
            inputs_closed: false,
            outbound,
            clock,
            presentation,
            pending_shots: Vec::new(),
            leaderboard: None,
            post_win_elapsed: false,
            last_ping: None,
            now: 0.0,
            tick: 0,
        };

        let initial = game_match.ctx.game_state.get();
        game_match
            .machine
            .sync_to(initial, game_match.presentation.as_mut());
        let zone = game_match.zone.state();
        game_match.write_zone(zone);

        (game_match, handle)
    }

    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    pub fn game_state(&self) -> GameState {
        self.ctx.game_state.get()
    }

    pub fn zone_state(&self) -> ZoneState {
        self.ctx.zone.get()
    }

    pub fn world(&self) -> &SphereWorld {
        &self.world
    }

    pub fn leaderboard(&self) -> Option<&[LeaderboardEntry]> {
        self.leaderboard.as_deref()
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Run the authoritative tick loop until every input sender is gone
    pub async fn run(mut self) {
        let tick_rate = self.config.tick_rate.max(1);
        let dt = tick_delta(tick_rate);
        info!(
            tick_rate,
            min_players = self.config.min_players,
            max_players = self.config.max_players,
            "Session started"
        );

        let mut ticker = interval(Duration::from_secs_f64(1.0 / tick_rate as f64));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let now = self.clock.now();
            self.step(now, dt);

            if self.inputs_closed {
                info!("Input channel closed, stopping session");
                break;
            }
        }
    }

    /// One simulation tick at session time `now`
    pub fn step(&mut self, now: f64, dt: f32) {
        self.now = now;
        self.tick += 1;

        self.process_inputs();
        self.run_timers();
        self.sync_players(dt);
        self.resolve_shots();
        self.update_state();
        self.update_zone(dt);
        self.publish();

        trace!(tick = self.tick, now, "Tick complete");
    }

    /// Drain every queued input
    fn process_inputs(&mut self) {
        loop {
            match self.input_rx.try_recv() {
                Ok(input) => self.handle_input(input),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.inputs_closed = true;
                    break;
                }
            }
        }
    }

    fn handle_input(&mut self, input: PlayerInput) {
        let PlayerInput {
            player_id,
            msg,
            received_at,
        } = input;

        if !matches!(msg, ClientMsg::Join { .. }) && !self.ctx.players.contains(player_id) {
            debug!(player_id, "Dropping input from player not in session");
            return;
        }

        match msg {
            ClientMsg::Join { name } => self.handle_join(player_id, &name),
            ClientMsg::SetReady { ready } => self.handle_ready(player_id, ready),
            ClientMsg::Snapshot {
                player_id: subject,
                snapshot,
            } => self.handle_snapshot(player_id, subject, snapshot, received_at),
            ClientMsg::Shoot(request) => self.pending_shots.push((player_id, request)),
            ClientMsg::Pong { server_time } => self.handle_pong(player_id, server_time, received_at),
            ClientMsg::Leave => self.handle_leave(player_id, "left"),
        }
    }

    /// Handle player join request
    fn handle_join(&mut self, player_id: PlayerId, requested_name: &str) {
        if self.ctx.players.contains(player_id) {
            warn!(player_id, "Player already in session");
            return;
        }

        if self.ctx.players.len() >= self.config.max_players {
            self.outbound.deliver(
                Target::Player(player_id),
                ServerMsg::Error {
                    code: "session_full".to_string(),
                    message: "Session is full".to_string(),
                },
            );
            return;
        }

        let name = display_name(player_id, requested_name);
        let entry = PlayerEntry::new(
            player_id,
            name.clone(),
            self.config.history_retention(),
            self.config.weapon.max_health,
        );
        // Late joiners are alive but only take part from the next round
        entry.state.lock().alive = true;
        self.ctx.players.insert(entry);

        self.outbound.deliver(
            Target::Player(player_id),
            ServerMsg::Welcome {
                player_id,
                server_time: self.now,
                tick_rate: self.config.tick_rate,
                smoothing_window: self.config.smoothing_window,
                game_state: self.ctx.game_state.get(),
                zone: self.ctx.zone.get(),
                players: self.roster(),
            },
        );

        self.outbound.deliver(
            Target::AllExcept(player_id),
            ServerMsg::PlayerJoined {
                player: PlayerInfo {
                    player_id,
                    name: name.clone(),
                    ready: false,
                    alive: true,
                },
            },
        );

        // Seed the newcomer's observers with everyone's latest position
        for other in self.ctx.players.snapshot() {
            if other.id == player_id {
                continue;
            }
            if let Some(snapshot) = other.latest_snapshot() {
                self.outbound.deliver(
                    Target::Player(player_id),
                    ServerMsg::PlayerSnapshot {
                        player_id: other.id,
                        snapshot,
                    },
                );
            }
        }

        info!(
            player_id,
            name = %name,
            player_count = self.ctx.players.len(),
            "Player joined session"
        );
    }

    fn handle_ready(&mut self, player_id: PlayerId, ready: bool) {
        let state = self.ctx.game_state.get();
        if !matches!(state, GameState::WaitingToReadyUp | GameState::ReadiedUp) {
            debug!(player_id, state = ?state, "Ignoring ready change outside ready-up");
            return;
        }
        let Some(entry) = self.ctx.players.get(player_id) else {
            return;
        };

        entry.state.lock().ready = ready;
        debug!(player_id, ready, "Ready state changed");

        if !ready && state == GameState::ReadiedUp {
            info!(player_id, "Player unreadied, countdown cancelled");
            self.cancel_countdown();
        }
    }

    /// Owner-published movement. Only the owner may write its own motion.
    ///
    /// Snapshots with non-finite components, or stamped further ahead of
    /// the server clock than one expected round trip, are dropped unrelayed.
    fn handle_snapshot(
        &mut self,
        sender: PlayerId,
        subject: PlayerId,
        snapshot: Snapshot,
        received_at: f64,
    ) {
        if !snapshot.is_finite() {
            warn!(sender, subject, "Dropped snapshot with non-finite values");
            return;
        }
        let horizon = received_at + self.config.max_expected_rtt;
        if snapshot.send_time > horizon {
            warn!(
                sender,
                subject,
                send_time = snapshot.send_time,
                horizon,
                "Dropped snapshot stamped in the future"
            );
            return;
        }

        let Some(entry) = self.ctx.players.get(subject) else {
            debug!(sender, subject, "Snapshot for unknown player");
            return;
        };

        let mut state = entry.state.lock();
        if state.motion.write(Writer::Client(sender), snapshot).is_err() {
            // logged by the replicated value; the owner's data stands
            return;
        }
        if !entry.history.write().append(snapshot) {
            trace!(
                player_id = subject,
                send_time = snapshot.send_time,
                "Dropped out-of-order snapshot"
            );
        }
    }

    fn handle_pong(&mut self, player_id: PlayerId, server_time: f64, received_at: f64) {
        let Some(entry) = self.ctx.players.get(player_id) else {
            return;
        };
        let sample = received_at - server_time;
        let rtt = entry.state.lock().rtt.record(sample);
        trace!(player_id, sample, rtt = ?rtt, "RTT sample");
    }

    /// Handle player leaving or disconnecting
    fn handle_leave(&mut self, player_id: PlayerId, reason: &str) {
        // In-flight rollbacks hold their own reference to the history
        let Some(entry) = self.ctx.players.remove(player_id) else {
            return;
        };
        self.world.remove_hitbox(player_id);
        self.pending_shots.retain(|(shooter, _)| *shooter != player_id);

        self.outbound.deliver(
            Target::All,
            ServerMsg::PlayerLeft {
                player_id,
                reason: reason.to_string(),
            },
        );

        info!(
            player_id,
            name = %entry.name,
            player_count = self.ctx.players.len(),
            "Player left session"
        );

        if self.ctx.players.is_empty() && self.ctx.game_state.get() != GameState::WaitingToReadyUp {
            info!("All players left, resetting session");
            self.reset_session();
        }
    }

    fn run_timers(&mut self) {
        for action in self.timers.drain_due(self.now) {
            match action {
                MatchAction::CountdownElapsed => {
                    if self.ctx.game_state.get() == GameState::ReadiedUp
                        && self.set_state(GameState::Playing)
                    {
                        self.begin_round();
                    }
                }
                MatchAction::PostWinElapsed => self.post_win_elapsed = true,
                MatchAction::PodiumElapsed => {
                    info!("Podium finished, resetting session");
                    self.reset_session();
                    // anything else due was scheduled before the reset
                    break;
                }
            }
        }
    }

    /// Move hitboxes to the latest owner data and fold movement into stats
    fn sync_players(&mut self, dt: f32) {
        let playing = self.ctx.game_state.get() == GameState::Playing;
        let track = self.ctx.track.clone();

        for entry in self.ctx.players.snapshot() {
            let latest = entry.latest_snapshot();
            let mut player = entry.state.lock();

            let targetable = player.alive && (player.participating || !playing);
            match latest {
                Some(snapshot) if targetable => {
                    self.world.upsert_hitbox(entry.id, snapshot.position);
                }
                _ => {
                    self.world.remove_hitbox(entry.id);
                }
            }

            if !(playing && player.participating && player.alive) {
                continue;
            }
            let Some(snapshot) = latest else {
                continue;
            };

            player
                .stats
                .record(self.now, snapshot.position, snapshot.speed(), dt);
            if let Some(track) = &track {
                let projection = track.project(snapshot.position);
                player.laps.update(projection.lap_fraction);
                player.stats.laps_completed = player.laps.laps_completed();
            }
        }
    }

    /// Validate queued shots one at a time; each rollback is restored
    /// before the next begins.
    fn resolve_shots(&mut self) {
        let shots = std::mem::take(&mut self.pending_shots);
        for (shooter, request) in shots {
            self.resolve_one(shooter, &request);
        }
    }

    fn resolve_one(&mut self, shooter: PlayerId, request: &ShootRequest) {
        let playing = self.ctx.game_state.get() == GameState::Playing;
        let Some(shooter_entry) = self.ctx.players.get(shooter) else {
            return;
        };
        let (can_shoot, rtt) = {
            let state = shooter_entry.state.lock();
            (
                state.alive && (state.participating || !playing),
                state.rtt.rtt(),
            )
        };
        if !can_shoot {
            debug!(shooter, shot_id = request.shot_id, "Dropping shot from eliminated player");
            return;
        }

        let victim_history = request
            .claimed_victim
            .and_then(|victim| self.ctx.players.get(victim))
            .map(|victim| victim.history.clone());
        let history_guard = victim_history.as_ref().map(|history| history.read());

        let (verdict, _) = resolve_shot(
            &self.compensator,
            &mut self.world,
            shooter,
            request,
            self.config.weapon.range,
            history_guard.as_deref(),
            rtt,
            self.config.smoothing_window,
        );
        drop(history_guard);

        self.outbound.deliver(Target::All, ServerMsg::ShootVerdict(verdict));
        self.presentation.shot_fired(&verdict, false);

        if let Some(victim) = verdict.victim {
            if playing && victim != shooter {
                self.apply_hit(shooter, victim);
            }
        }
    }

    /// Damage comes from the verdict only, never from a client's claim
    fn apply_hit(&mut self, shooter: PlayerId, victim: PlayerId) {
        let Some(entry) = self.ctx.players.get(victim) else {
            return;
        };
        let (health, died) = {
            let mut state = entry.state.lock();
            if !(state.alive && state.participating) {
                return;
            }
            let (health, died) = apply_damage(state.health, self.config.weapon.damage);
            state.health = health;
            if died {
                state.alive = false;
            }
            (health, died)
        };

        self.outbound.deliver(
            Target::All,
            ServerMsg::Vitals {
                player_id: victim,
                health,
                alive: !died,
            },
        );
        debug!(shooter, victim, health, "Hit applied");

        if died {
            self.on_death(victim, DeathCause::Shot { by: shooter });
        }
    }

    fn eliminate(&mut self, player_id: PlayerId, cause: DeathCause) {
        let Some(entry) = self.ctx.players.get(player_id) else {
            return;
        };
        {
            let mut state = entry.state.lock();
            if !state.alive {
                return;
            }
            state.alive = false;
            state.health = 0.0;
        }

        self.outbound.deliver(
            Target::All,
            ServerMsg::Vitals {
                player_id,
                health: 0.0,
                alive: false,
            },
        );
        self.on_death(player_id, cause);
    }

    fn on_death(&mut self, player_id: PlayerId, cause: DeathCause) {
        self.world.remove_hitbox(player_id);
        self.outbound
            .deliver(Target::All, ServerMsg::PlayerDied { player_id, cause });
        self.presentation.player_died(player_id, cause);
        info!(player_id, cause = ?cause, "Player eliminated");

        self.check_win();
    }

    fn update_state(&mut self) {
        match self.ctx.game_state.get() {
            GameState::WaitingToReadyUp => {
                if self.all_ready() && self.set_state(GameState::ReadiedUp) {
                    let ends_at = self.now + self.config.countdown_secs.max(0.0);
                    self.timers.schedule_at(ends_at, MatchAction::CountdownElapsed);
                    self.outbound
                        .deliver(Target::All, ServerMsg::Countdown { ends_at });
                    info!(ends_at, "Countdown started");
                }
            }
            GameState::ReadiedUp => {
                if self.ctx.players.len() < self.config.min_players {
                    info!("Not enough players, countdown cancelled");
                    self.cancel_countdown();
                }
            }
            GameState::Playing => self.check_win(),
            GameState::Win => {
                if self.leaderboard.is_none() {
                    self.build_leaderboard();
                }
                // the reveal waits for both the delay and the final standings
                if self.post_win_elapsed
                    && self.leaderboard.is_some()
                    && self.set_state(GameState::Podium)
                {
                    self.timers.schedule_after(
                        self.now,
                        self.config.podium_secs,
                        MatchAction::PodiumElapsed,
                    );
                }
            }
            GameState::Podium => {}
        }
    }

    fn all_ready(&self) -> bool {
        let players = self.ctx.players.snapshot();
        players.len() >= self.config.min_players
            && players.iter().all(|entry| entry.state.lock().ready)
    }

    /// Alive and dead counts among this round's participants
    fn participant_counts(&self) -> (usize, usize) {
        let mut alive = 0;
        let mut dead = 0;
        for entry in self.ctx.players.snapshot() {
            let state = entry.state.lock();
            if !state.participating {
                continue;
            }
            if state.alive {
                alive += 1;
            } else {
                dead += 1;
            }
        }
        (alive, dead)
    }

    fn check_win(&mut self) {
        if self.ctx.game_state.get() != GameState::Playing {
            return;
        }
        let (alive, dead) = self.participant_counts();
        if let Some(verdict) = self.win.check(alive, dead) {
            self.declare_win(verdict);
        }
    }

    fn declare_win(&mut self, verdict: WinVerdict) {
        if !self.set_state(GameState::Win) {
            return;
        }

        let mut winners = Vec::new();
        for entry in self.ctx.players.snapshot() {
            let mut state = entry.state.lock();
            state.won = verdict == WinVerdict::Win && state.participating && state.alive;
            if state.won {
                winners.push(entry.id);
            }
        }

        info!(verdict = ?verdict, winners = ?winners, "Round over");
        self.post_win_elapsed = false;
        self.timers.schedule_after(
            self.now,
            self.config.post_win_secs,
            MatchAction::PostWinElapsed,
        );
    }

    fn build_leaderboard(&mut self) {
        let mut entries: Vec<LeaderboardEntry> = self
            .ctx
            .players
            .snapshot()
            .iter()
            .filter_map(|entry| {
                let state = entry.state.lock();
                state.participating.then(|| {
                    LeaderboardEntry::from_stats(entry.id, &entry.name, &state.stats, state.won)
                })
            })
            .collect();
        sort_leaderboard(&mut entries);

        self.outbound.deliver(
            Target::All,
            ServerMsg::Leaderboard {
                entries: entries.clone(),
            },
        );
        self.presentation.leaderboard_ready(&entries);
        debug!(entries = entries.len(), "Leaderboard built");
        self.leaderboard = Some(entries);
    }

    fn update_zone(&mut self, dt: f32) {
        if self.ctx.game_state.get() != GameState::Playing {
            return;
        }

        let track = self.ctx.track.clone();
        let mut fractions = Vec::new();
        let mut progress = Vec::new();
        if track.is_some() {
            for entry in self.ctx.players.snapshot() {
                let state = entry.state.lock();
                if !(state.participating && state.alive) {
                    continue;
                }
                let absolute = state.laps.progress();
                // players with no position yet still face the wall but do not steer it
                if state.laps.has_sample() {
                    fractions.push(absolute.rem_euclid(1.0));
                }
                progress.push((entry.id, absolute));
            }
        }

        let zone = self.zone.step(&fractions, dt);
        self.write_zone(zone);

        let Some(track) = track else {
            return;
        };
        self.presentation.zone_moved(&zone.markers(track.as_ref()));

        let (chasing, _) = zone.wall_progress(track.length());
        for (player_id, absolute) in progress {
            if absolute < chasing {
                debug!(player_id, progress = absolute, chasing, "Caught by the zone");
                self.eliminate(player_id, DeathCause::Zone);
            }
        }
    }

    fn publish(&mut self) {
        if let Some(state) = self.ctx.game_state.take_dirty() {
            self.outbound
                .deliver(Target::All, ServerMsg::GameState { state });
        }
        if let Some(zone) = self.ctx.zone.take_dirty() {
            self.outbound.deliver(Target::All, ServerMsg::Zone { zone });
        }

        let players = self.ctx.players.snapshot();
        for entry in &players {
            let moved = entry.state.lock().motion.take_dirty().is_some();
            if !moved {
                continue;
            }
            if let Some(snapshot) = entry.latest_snapshot() {
                self.outbound.deliver(
                    Target::AllExcept(entry.id),
                    ServerMsg::PlayerSnapshot {
                        player_id: entry.id,
                        snapshot,
                    },
                );
            }
        }

        let ping_due = self
            .last_ping
            .map_or(true, |last| self.now - last >= self.config.ping_interval_secs);
        if ping_due {
            self.last_ping = Some(self.now);
            for entry in &players {
                self.outbound.deliver(
                    Target::Player(entry.id),
                    ServerMsg::Ping {
                        server_time: self.now,
                        rtt: entry.rtt(),
                    },
                );
            }
        }
    }

    fn set_state(&mut self, to: GameState) -> bool {
        match self.machine.transition(
            &mut self.ctx.game_state,
            Writer::Server,
            to,
            self.presentation.as_mut(),
        ) {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "Game state transition rejected");
                false
            }
        }
    }

    fn write_zone(&mut self, zone: ZoneState) {
        if let Err(err) = self.ctx.zone.write(Writer::Server, zone) {
            warn!(error = %err, "Zone update rejected");
        }
    }

    fn begin_round(&mut self) {
        self.restore_players(true);
        self.win.reset();
        self.leaderboard = None;
        self.post_win_elapsed = false;
        self.zone.reset();
        let zone = self.zone.state();
        self.write_zone(zone);
        info!(players = self.ctx.players.len(), "Round started");
    }

    fn cancel_countdown(&mut self) {
        self.timers.clear();
        self.set_state(GameState::WaitingToReadyUp);
    }

    /// Back to ready-up. Timers scheduled before the reset never fire.
    fn reset_session(&mut self) {
        self.timers.clear();
        self.pending_shots.clear();
        if self.ctx.game_state.get() != GameState::WaitingToReadyUp {
            self.set_state(GameState::WaitingToReadyUp);
        }
        self.restore_players(false);
        self.win.reset();
        self.leaderboard = None;
        self.post_win_elapsed = false;
        self.zone.reset();
        let zone = self.zone.state();
        self.write_zone(zone);
    }

    /// Full health, fresh stats, not ready
    fn restore_players(&mut self, participating: bool) {
        for entry in self.ctx.players.snapshot() {
            {
                let mut state = entry.state.lock();
                state.ready = false;
                state.participating = participating;
                state.alive = true;
                state.health = self.config.weapon.max_health;
                state.won = false;
                state.stats = Default::default();
                state.laps = Default::default();
            }
            self.outbound.deliver(
                Target::All,
                ServerMsg::Vitals {
                    player_id: entry.id,
                    health: self.config.weapon.max_health,
                    alive: true,
                },
            );
        }
    }

    fn roster(&self) -> Vec<PlayerInfo> {
        self.ctx
            .players
            .snapshot()
            .iter()
            .map(|entry| {
                let state = entry.state.lock();
                PlayerInfo {
                    player_id: entry.id,
                    name: entry.name.clone(),
                    ready: state.ready,
                    alive: state.alive,
                }
            })
            .collect()
    }
}

/// Trimmed, printable, bounded display name
fn display_name(player_id: PlayerId, requested: &str) -> String {
    let name: String = requested
        .trim()
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_NAME_LEN)
        .collect();
    if name.is_empty() {
        format!("Player {player_id}")
    } else {
        name
    }
}
