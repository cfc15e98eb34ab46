//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::app::AppState;
use crate::game::{MatchHandle, PlayerId};
use crate::net::transport::Envelope;
use crate::util::rate_limit::PeerRateLimiter;
use crate::ws::protocol::{decode_client_frame, encode_server_frame, ClientMsg, ServerMsg};

type WsSink = futures::stream::SplitSink<WebSocket, Message>;
type WsStream = futures::stream::SplitStream<WebSocket>;

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Display name; the session falls back to `Player <id>`
    #[serde(default)]
    pub name: Option<String>,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    let player_id = state.game.allocate_player_id();
    info!(player_id, "WebSocket upgrade");
    let name = query.name.unwrap_or_default();
    ws.on_upgrade(move |socket| handle_socket(socket, player_id, name, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, player_id: PlayerId, name: String, state: AppState) {
    info!(player_id, "New WebSocket connection");

    let (ws_sink, ws_stream) = socket.split();

    // Subscribe first so the welcome produced by the join is not missed
    let outbound = state.game.subscribe();
    if !state.game.submit(player_id, ClientMsg::Join { name }).await {
        error!(player_id, "Session is not running");
        return;
    }

    run_session(player_id, &state.game, ws_sink, ws_stream, outbound).await;

    info!(player_id, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    player_id: PlayerId,
    game: &MatchHandle,
    mut ws_sink: WsSink,
    mut ws_stream: WsStream,
    mut outbound: broadcast::Receiver<Envelope>,
) {
    let rate_limiter = PeerRateLimiter::new();

    // Writer task: session envelopes addressed to this peer -> WebSocket
    let writer_handle = tokio::spawn(async move {
        loop {
            match outbound.recv().await {
                Ok(envelope) => {
                    if !envelope.target.includes(player_id) {
                        continue;
                    }
                    if let Err(e) = send_msg(&mut ws_sink, &envelope.msg).await {
                        debug!(player_id, error = %e, "WebSocket send failed");
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(player_id, lagged_count = n, "Client lagged, skipping {} messages", n);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!(player_id, "Outbound channel closed");
                    break;
                }
            }
        }
    });

    // Reader loop: WebSocket -> session inputs
    while let Some(result) = ws_stream.next().await {
        let client_msg = match result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMsg>(&text) {
                Ok(msg) => msg,
                Err(e) => {
                    warn!(player_id, error = %e, "Failed to parse client message");
                    continue;
                }
            },
            Ok(Message::Binary(frame)) => match decode_client_frame(&frame) {
                Ok(msg) => msg,
                Err(e) => {
                    warn!(player_id, error = %e, "Failed to decode binary frame");
                    continue;
                }
            },
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
            Ok(Message::Close(_)) => {
                info!(player_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(player_id, error = %e, "WebSocket error");
                break;
            }
        };

        if !admit(&rate_limiter, &client_msg) {
            warn!(player_id, "Rate limited client message");
            continue;
        }
        // the leave below covers an explicit one
        if client_msg == ClientMsg::Leave {
            break;
        }
        if !game.submit(player_id, client_msg).await {
            debug!(player_id, "Input channel closed");
            break;
        }
    }

    // Signal disconnect to the session
    let _ = game.submit(player_id, ClientMsg::Leave).await;

    writer_handle.abort();
}

/// Apply the per-category rate limit for `msg`
fn admit(limiter: &PeerRateLimiter, msg: &ClientMsg) -> bool {
    match msg {
        ClientMsg::Snapshot { .. } => limiter.check_snapshot(),
        ClientMsg::Shoot(_) => limiter.check_shoot(),
        _ => limiter.check_control(),
    }
}

/// Send a message over WebSocket; snapshots and zone updates go binary
async fn send_msg(sink: &mut WsSink, msg: &ServerMsg) -> Result<(), String> {
    let frame = match encode_server_frame(msg) {
        Some(Ok(bytes)) => Message::Binary(bytes.to_vec()),
        Some(Err(e)) => {
            warn!(error = %e, "Binary encode failed, sending JSON");
            Message::Text(serde_json::to_string(msg).map_err(|e| e.to_string())?)
        }
        None => Message::Text(serde_json::to_string(msg).map_err(|e| e.to_string())?),
    };
    sink.send(frame).await.map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::shoot::ShootRequest;
    use glam::Vec3;

    #[test]
    fn shots_and_control_use_separate_budgets() {
        let limiter = PeerRateLimiter::new();
        let ready = ClientMsg::SetReady { ready: true };
        let shot = ClientMsg::Shoot(ShootRequest {
            shot_id: 1,
            claimed_time: 0.0,
            origin: Vec3::ZERO,
            direction: Vec3::X,
            claimed_victim: None,
        });

        // exhaust the control budget
        let admitted = (0..50).filter(|_| admit(&limiter, &ready)).count();
        assert!(admitted < 50);
        assert!(admit(&limiter, &shot));
    }

    #[test]
    fn query_name_is_optional() {
        let query: WsQuery = serde_json::from_str("{}").unwrap();
        assert!(query.name.is_none());
    }
}
