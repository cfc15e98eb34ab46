//! Lag-compensated shot validation through the authoritative session

use glam::Vec3;
use tokio::sync::broadcast;

use zone_sync::config::SessionConfig;
use zone_sync::game::physics::SphereWorld;
use zone_sync::game::presentation::TracingPresentation;
use zone_sync::game::shoot::{ShootRequest, ShootVerdict};
use zone_sync::game::{GameMatch, MatchHandle, PlayerId, PlayerInput, Snapshot};
use zone_sync::net::transport::Envelope;
use zone_sync::ws::protocol::{ClientMsg, ServerMsg};

const DT: f32 = 0.05;

fn session() -> (GameMatch, MatchHandle, broadcast::Receiver<Envelope>) {
    session_with_window(0.0)
}

fn session_with_window(
    smoothing_window: f64,
) -> (GameMatch, MatchHandle, broadcast::Receiver<Envelope>) {
    let config = SessionConfig {
        smoothing_window,
        ..SessionConfig::default()
    };
    let (game, handle) = GameMatch::new(
        config,
        None,
        SphereWorld::new(0.5),
        Box::new(TracingPresentation::new("server")),
    );
    let rx = handle.subscribe();
    (game, handle, rx)
}

fn send(handle: &MatchHandle, player_id: PlayerId, msg: ClientMsg, at: f64) {
    handle
        .input_tx
        .try_send(PlayerInput {
            player_id,
            msg,
            received_at: at,
        })
        .unwrap();
}

fn snapshot(handle: &MatchHandle, player_id: PlayerId, t: f64, position: Vec3) {
    send(
        handle,
        player_id,
        ClientMsg::Snapshot {
            player_id,
            snapshot: Snapshot::at_rest(t, position),
        },
        t,
    );
}

fn verdicts(rx: &mut broadcast::Receiver<Envelope>) -> Vec<ShootVerdict> {
    let mut out = Vec::new();
    while let Ok(envelope) = rx.try_recv() {
        if let ServerMsg::ShootVerdict(verdict) = envelope.msg {
            out.push(verdict);
        }
    }
    out
}

/// Victim was at the origin at t=9.9 and at (5,0,0) by t=10.0. The shooter
/// fires at t=10.0 down +Z through the origin.
fn moving_victim_scenario(rtt: Option<f64>) -> (ShootVerdict, PlayerId) {
    let (mut game, handle, mut rx) = session();
    let shooter = handle.allocate_player_id();
    let victim = handle.allocate_player_id();

    send(&handle, shooter, ClientMsg::Join { name: "shooter".into() }, 9.0);
    send(&handle, victim, ClientMsg::Join { name: "victim".into() }, 9.0);
    game.step(9.0, DT);

    snapshot(&handle, shooter, 9.9, Vec3::new(0.0, 0.0, -10.0));
    snapshot(&handle, victim, 9.9, Vec3::ZERO);
    snapshot(&handle, victim, 10.0, Vec3::new(5.0, 0.0, 0.0));
    if let Some(rtt) = rtt {
        send(&handle, shooter, ClientMsg::Pong { server_time: 10.0 - rtt }, 10.0);
    }
    send(
        &handle,
        shooter,
        ClientMsg::Shoot(ShootRequest {
            shot_id: 0,
            claimed_time: 10.0,
            origin: Vec3::new(0.0, 0.0, -10.0),
            direction: Vec3::Z,
            claimed_victim: Some(victim),
        }),
        10.0,
    );
    game.step(10.0, DT);

    // the live hitbox is where the victim is now
    assert_eq!(
        zone_sync::game::physics::HitTestWorld::hitbox(game.world(), victim),
        Some(Vec3::new(5.0, 0.0, 0.0))
    );

    let verdicts = verdicts(&mut rx);
    assert_eq!(verdicts.len(), 1);
    (verdicts[0], victim)
}

#[test]
fn shot_is_tested_against_where_the_shooter_saw_the_victim() {
    let (verdict, victim) = moving_victim_scenario(Some(0.2));

    assert_eq!(verdict.victim, Some(victim));
    let hit_point = verdict.hit_point.unwrap();
    assert!(hit_point.x.abs() < 1e-4);
    assert!((hit_point.z + 0.5).abs() < 1e-4);
    // observers present it one smoothing window after the claim
    assert_eq!(verdict.time, 10.0);
}

#[test]
fn without_rtt_the_claim_is_tested_at_the_claimed_instant() {
    let (verdict, _) = moving_victim_scenario(None);

    // at t=10.0 the victim had already moved out of the ray
    assert_eq!(verdict.victim, None);
    assert_eq!(verdict.hit_point, None);
}

/// With a smoothing window the shooter rendered the victim one window
/// behind the one-way delay: 10.0 - 0.1 - 0.1 = 9.8, which puts the victim
/// at x = 3 between its samples at t=9.5 and t=10.0.
#[test]
fn smoothing_window_moves_the_rewind_further_back() {
    let (mut game, handle, mut rx) = session_with_window(0.1);
    let shooter = handle.allocate_player_id();
    let victim = handle.allocate_player_id();

    send(&handle, shooter, ClientMsg::Join { name: "shooter".into() }, 9.0);
    send(&handle, victim, ClientMsg::Join { name: "victim".into() }, 9.0);
    game.step(9.0, DT);

    let origin = Vec3::new(3.0, 0.0, -10.0);
    snapshot(&handle, shooter, 9.5, origin);
    snapshot(&handle, victim, 9.5, Vec3::ZERO);
    snapshot(&handle, victim, 10.0, Vec3::new(5.0, 0.0, 0.0));
    send(&handle, shooter, ClientMsg::Pong { server_time: 9.8 }, 10.0);
    send(
        &handle,
        shooter,
        ClientMsg::Shoot(ShootRequest {
            shot_id: 0,
            claimed_time: 10.0,
            origin,
            direction: Vec3::Z,
            claimed_victim: Some(victim),
        }),
        10.0,
    );
    game.step(10.0, DT);

    let verdicts = verdicts(&mut rx);
    assert_eq!(verdicts.len(), 1);
    assert_eq!(verdicts[0].victim, Some(victim));
    let hit_point = verdicts[0].hit_point.unwrap();
    assert!((hit_point.x - 3.0).abs() < 1e-3);
    assert!((hit_point.z + 0.5).abs() < 1e-3);
    assert!((verdicts[0].time - 10.1).abs() < 1e-9);

    assert_eq!(
        zone_sync::game::physics::HitTestWorld::hitbox(game.world(), victim),
        Some(Vec3::new(5.0, 0.0, 0.0))
    );
}

#[test]
fn rollback_leaves_the_world_as_it_was() {
    let (mut game, handle, mut rx) = session();
    let shooter = handle.allocate_player_id();
    let first = handle.allocate_player_id();
    let second = handle.allocate_player_id();
    for (id, name) in [(shooter, "s"), (first, "a"), (second, "b")] {
        send(&handle, id, ClientMsg::Join { name: name.into() }, 0.0);
    }
    game.step(0.0, DT);

    snapshot(&handle, shooter, 0.5, Vec3::new(0.0, 0.0, -10.0));
    snapshot(&handle, first, 0.5, Vec3::ZERO);
    snapshot(&handle, first, 1.0, Vec3::new(3.0, 0.0, 0.0));
    snapshot(&handle, second, 0.5, Vec3::new(0.0, 0.0, 5.0));
    snapshot(&handle, second, 1.0, Vec3::new(-3.0, 0.0, 5.0));
    send(&handle, shooter, ClientMsg::Pong { server_time: 0.0 }, 1.0);

    // two rewinds in one tick, each to a different victim
    for (shot_id, victim) in [(0, first), (1, second)] {
        send(
            &handle,
            shooter,
            ClientMsg::Shoot(ShootRequest {
                shot_id,
                claimed_time: 1.0,
                origin: Vec3::new(0.0, 0.0, -10.0),
                direction: Vec3::Z,
                claimed_victim: Some(victim),
            }),
            1.0,
        );
    }
    game.step(1.0, DT);

    let results = verdicts(&mut rx);
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].victim, Some(first));
    assert_eq!(results[1].victim, Some(second));

    use zone_sync::game::physics::HitTestWorld;
    assert_eq!(game.world().hitbox(first), Some(Vec3::new(3.0, 0.0, 0.0)));
    assert_eq!(game.world().hitbox(second), Some(Vec3::new(-3.0, 0.0, 5.0)));
}
