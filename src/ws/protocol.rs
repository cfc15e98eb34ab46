//! WebSocket protocol message definitions
//!
//! Control traffic is JSON text frames. The two high-rate messages,
//! player snapshots and zone updates, travel as binary frames: a one-byte
//! tag, then the fixed-size wire encoding.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::game::leaderboard::LeaderboardEntry;
use crate::game::presentation::DeathCause;
use crate::game::shoot::{ShootRequest, ShootVerdict};
use crate::game::snapshot::Snapshot;
use crate::game::state_machine::GameState;
use crate::game::zone::ZoneState;
use crate::game::PlayerId;
use crate::net::wire::{decode, encode_into, WireError};

/// Binary frame tag: `[tag][player_id u32][Snapshot]`
pub const FRAME_SNAPSHOT: u8 = 1;
/// Binary frame tag: `[tag][ZoneState]`
pub const FRAME_ZONE: u8 = 2;

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Join the session under a display name
    Join { name: String },

    /// Mark ready (or not) while waiting
    SetReady { ready: bool },

    /// Owner-published movement for `player_id`
    Snapshot {
        player_id: PlayerId,
        snapshot: Snapshot,
    },

    /// Hit-scan shot request
    Shoot(ShootRequest),

    /// Echo of a server ping
    Pong { server_time: f64 },

    Leave,
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// First message on a connection
    Welcome {
        player_id: PlayerId,
        server_time: f64,
        tick_rate: u32,
        smoothing_window: f64,
        game_state: GameState,
        zone: ZoneState,
        players: Vec<PlayerInfo>,
    },

    PlayerJoined { player: PlayerInfo },

    PlayerLeft { player_id: PlayerId, reason: String },

    /// Relayed owner snapshot
    PlayerSnapshot {
        player_id: PlayerId,
        snapshot: Snapshot,
    },

    /// Authoritative game state
    GameState { state: GameState },

    /// Countdown to `Playing` ends at this server time
    Countdown { ends_at: f64 },

    Zone { zone: ZoneState },

    ShootVerdict(ShootVerdict),

    /// Replicated health and elimination
    Vitals {
        player_id: PlayerId,
        health: f32,
        alive: bool,
    },

    PlayerDied { player_id: PlayerId, cause: DeathCause },

    /// Final standings, sent once per round
    Leaderboard { entries: Vec<LeaderboardEntry> },

    /// Clock sync request; `rtt` is the server's current estimate for this peer
    Ping { server_time: f64, rtt: Option<f64> },

    Error { code: String, message: String },
}

/// Player info for join/roster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub player_id: PlayerId,
    pub name: String,
    pub ready: bool,
    pub alive: bool,
}

/// Binary encoding for the high-rate server messages; `None` means send as JSON
pub fn encode_server_frame(msg: &ServerMsg) -> Option<Result<Bytes, WireError>> {
    let mut buf = BytesMut::new();
    let result = match msg {
        ServerMsg::PlayerSnapshot {
            player_id,
            snapshot,
        } => {
            buf.put_u8(FRAME_SNAPSHOT);
            buf.put_u32(*player_id);
            encode_into(snapshot, &mut buf)
        }
        ServerMsg::Zone { zone } => {
            buf.put_u8(FRAME_ZONE);
            encode_into(zone, &mut buf)
        }
        _ => return None,
    };
    Some(result.map(|()| buf.freeze()))
}

pub fn decode_server_frame(frame: &[u8]) -> Result<ServerMsg, WireError> {
    let (tag, body) = split_tag(frame)?;
    match tag {
        FRAME_SNAPSHOT => {
            let (player_id, body) = split_player(body)?;
            Ok(ServerMsg::PlayerSnapshot {
                player_id,
                snapshot: decode(body)?,
            })
        }
        FRAME_ZONE => Ok(ServerMsg::Zone { zone: decode(body)? }),
        other => Err(WireError::UnknownTag(other)),
    }
}

pub fn encode_client_snapshot(player_id: PlayerId, snapshot: &Snapshot) -> Result<Bytes, WireError> {
    let mut buf = BytesMut::new();
    buf.put_u8(FRAME_SNAPSHOT);
    buf.put_u32(player_id);
    encode_into(snapshot, &mut buf)?;
    Ok(buf.freeze())
}

pub fn decode_client_frame(frame: &[u8]) -> Result<ClientMsg, WireError> {
    let (tag, body) = split_tag(frame)?;
    match tag {
        FRAME_SNAPSHOT => {
            let (player_id, body) = split_player(body)?;
            Ok(ClientMsg::Snapshot {
                player_id,
                snapshot: decode(body)?,
            })
        }
        other => Err(WireError::UnknownTag(other)),
    }
}

fn split_tag(frame: &[u8]) -> Result<(u8, &[u8]), WireError> {
    match frame.split_first() {
        Some((tag, body)) => Ok((*tag, body)),
        None => Err(WireError::Length {
            expected: 1,
            actual: 0,
        }),
    }
}

fn split_player(mut body: &[u8]) -> Result<(PlayerId, &[u8]), WireError> {
    if body.len() < 4 {
        return Err(WireError::Length {
            expected: 4,
            actual: body.len(),
        });
    }
    let player_id = body.get_u32();
    Ok((player_id, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn control_messages_use_tagged_json() {
        let json = serde_json::to_string(&ClientMsg::SetReady { ready: true }).unwrap();
        assert_eq!(json, r#"{"type":"set_ready","ready":true}"#);

        let parsed: ClientMsg = serde_json::from_str(
            r#"{"type":"shoot","shot_id":3,"claimed_time":1.5,"origin":[0.0,0.0,0.0],"direction":[1.0,0.0,0.0],"claimed_victim":null}"#,
        )
        .unwrap();
        assert!(matches!(parsed, ClientMsg::Shoot(ShootRequest { shot_id: 3, .. })));

        let state = serde_json::to_string(&ServerMsg::GameState {
            state: GameState::ReadiedUp,
        })
        .unwrap();
        assert_eq!(state, r#"{"type":"game_state","state":"readied_up"}"#);
    }

    #[test]
    fn snapshot_frames_carry_the_player() {
        let snapshot = Snapshot::at_rest(2.0, Vec3::new(1.0, 2.0, 3.0));
        let frame = encode_client_snapshot(7, &snapshot).unwrap();
        assert_eq!(frame[0], FRAME_SNAPSHOT);

        match tokio_test::assert_ok!(decode_client_frame(&frame)) {
            ClientMsg::Snapshot {
                player_id,
                snapshot: decoded,
            } => {
                assert_eq!(player_id, 7);
                assert_eq!(decoded, snapshot);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn only_high_rate_messages_go_binary() {
        let zone = ServerMsg::Zone {
            zone: ZoneState {
                progress: 0.5,
                width: 20.0,
                speed: 0.0,
            },
        };
        let frame = encode_server_frame(&zone).unwrap().unwrap();
        assert_eq!(decode_server_frame(&frame).unwrap(), zone);

        let ping = ServerMsg::Ping {
            server_time: 1.0,
            rtt: None,
        };
        assert!(encode_server_frame(&ping).is_none());
    }

    #[test]
    fn malformed_frames_are_rejected() {
        assert!(decode_client_frame(&[]).is_err());
        assert_eq!(decode_client_frame(&[9, 0, 0]), Err(WireError::UnknownTag(9)));
        assert!(matches!(
            decode_client_frame(&[FRAME_SNAPSHOT, 0, 0]),
            Err(WireError::Length { .. })
        ));
        // client frames never carry zone updates
        assert_eq!(decode_client_frame(&[FRAME_ZONE]), Err(WireError::UnknownTag(FRAME_ZONE)));
    }
}
