//! WebSocket upgrade handler and session coordinator
//!
//! A session owns no game state. It translates socket events into
//! [`GameCommand`]s for the engine task and pumps engine broadcasts from
//! its per-connection channel back onto the socket.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::app::AppState;
use crate::game::{GameCommand, OUTBOUND_BUFFER};
use crate::util::rate_limit::PlayerRateLimiter;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_sink, mut ws_stream) = socket.split();

    // Register with the engine; the reply carries our player id or a
    // capacity rejection.
    let (conn_tx, mut conn_rx) = mpsc::channel::<String>(OUTBOUND_BUFFER);
    let (reply_tx, reply_rx) = oneshot::channel();

    if state
        .game
        .cmd_tx
        .send(GameCommand::Join {
            conn: conn_tx,
            reply: reply_tx,
        })
        .await
        .is_err()
    {
        return;
    }

    let player_id = match reply_rx.await {
        Ok(Ok(player_id)) => player_id,
        Ok(Err(e)) => {
            warn!(error = %e, "Rejecting connection");
            let msg = ServerMsg::Error {
                message: e.to_string(),
            };
            if let Ok(json) = serde_json::to_string(&msg) {
                let _ = ws_sink.send(Message::Text(json)).await;
            }
            let _ = ws_sink.close().await;
            return;
        }
        Err(_) => return,
    };

    info!(player_id = %player_id, "WebSocket session started");

    // Writer task: engine fanout -> socket
    let writer_id = player_id.clone();
    let writer = tokio::spawn(async move {
        while let Some(frame) = conn_rx.recv().await {
            if let Err(e) = ws_sink.send(Message::Text(frame)).await {
                debug!(player_id = %writer_id, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    // Reader loop: socket -> engine commands
    let rate_limiter = PlayerRateLimiter::new();
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(player_id = %player_id, "Rate limited input message");
                    continue;
                }

                let cmd = match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(ClientMsg::Update { data }) => GameCommand::Update {
                        player_id: player_id.clone(),
                        data,
                    },
                    Ok(ClientMsg::Shoot) => GameCommand::Shoot {
                        player_id: player_id.clone(),
                    },
                    Ok(ClientMsg::ChangeName { name }) => GameCommand::Rename {
                        player_id: player_id.clone(),
                        name,
                    },
                    Err(e) => {
                        warn!(player_id = %player_id, error = %e, "Discarding malformed message");
                        continue;
                    }
                };

                if state.game.cmd_tx.send(cmd).await.is_err() {
                    break;
                }
            }
            Ok(Message::Close(_)) => {
                debug!(player_id = %player_id, "Client initiated close");
                break;
            }
            Ok(_) => {
                // Binary frames and ping/pong are ignored
            }
            Err(e) => {
                debug!(player_id = %player_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    let _ = state
        .game
        .cmd_tx
        .send(GameCommand::Leave {
            player_id: player_id.clone(),
        })
        .await;

    writer.abort();
    info!(player_id = %player_id, "WebSocket session closed");
}
