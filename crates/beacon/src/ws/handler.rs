//! WebSocket handler for client connections.

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message as WsMessage, WebSocket},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::api::AppState;

use super::types::{ClientCommand, ServerFrame};

/// Ping interval for keepalive.
const PING_INTERVAL_SECS: u64 = 30;

/// Size of the per-connection control-frame buffer.
const FRAME_BUFFER_SIZE: usize = 16;

/// WebSocket upgrade handler.
///
/// GET /ws
pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

/// Handle one WebSocket connection: one session per socket, one ordered
/// outbound stream, inbound control commands.
async fn handle_ws_connection(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let session_id = Uuid::new_v4().to_string();
    info!("websocket connected, session {}", session_id);

    let mut subscription = state.coordinator.subscribe(&session_id).await;
    let cancel = subscription.cancel_token();

    if send_json(&mut sender, &ServerFrame::Connected { session_id: session_id.clone() })
        .await
        .is_err()
    {
        cancel.cancel();
        state.coordinator.close_session(&session_id).await;
        return;
    }

    // Control frames (pong, errors) go through a channel so the inbound
    // loop never touches the sink directly.
    let (frame_tx, mut frame_rx) = mpsc::channel::<ServerFrame>(FRAME_BUFFER_SIZE);

    let send_task = tokio::spawn(async move {
        let mut ping_interval =
            tokio::time::interval(Duration::from_secs(PING_INTERVAL_SECS));
        ping_interval.tick().await; // first tick fires immediately

        loop {
            tokio::select! {
                msg = subscription.recv() => {
                    let Some(msg) = msg else { break };
                    let json = match serde_json::to_string(&msg) {
                        Ok(j) => j,
                        Err(e) => {
                            warn!("failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if sender.send(WsMessage::Text(json.into())).await.is_err() {
                        break;
                    }
                }

                Some(frame) = frame_rx.recv() => {
                    if send_json(&mut sender, &frame).await.is_err() {
                        break;
                    }
                }

                _ = ping_interval.tick() => {
                    if send_json(&mut sender, &ServerFrame::Ping).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    while let Some(msg_result) = receiver.next().await {
        match msg_result {
            Ok(WsMessage::Text(text)) => {
                match serde_json::from_str::<ClientCommand>(&text) {
                    Ok(cmd) => handle_command(&state, &session_id, &frame_tx, cmd).await,
                    Err(e) => {
                        warn!("unparseable command on session {}: {}", session_id, e);
                        let _ = frame_tx
                            .send(ServerFrame::Error {
                                message: format!("invalid command: {}", e),
                            })
                            .await;
                    }
                }
            }
            Ok(WsMessage::Close(_)) => {
                info!("client closed session {}", session_id);
                break;
            }
            Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) => {
                // protocol-level keepalive, handled by axum
            }
            Ok(WsMessage::Binary(_)) => {
                debug!("ignoring binary frame on session {}", session_id);
            }
            Err(e) => {
                warn!("websocket error on session {}: {}", session_id, e);
                break;
            }
        }
    }

    // The session is scoped to this socket: tear it down so the registry
    // entry and its gap watcher do not outlive the connection. An
    // in-flight run sees `SessionNotFound` on its next publish and stops.
    cancel.cancel();
    send_task.abort();
    state.coordinator.close_session(&session_id).await;
    info!("websocket closed, session {}", session_id);
}

async fn handle_command(
    state: &AppState,
    session_id: &str,
    frame_tx: &mpsc::Sender<ServerFrame>,
    cmd: ClientCommand,
) {
    match cmd {
        ClientCommand::Query { query } => {
            state.coordinator.begin_query(session_id, &query).await;

            let coordinator = state.coordinator.clone();
            let runtime = state.runtime.clone();
            let session_id = session_id.to_string();
            tokio::spawn(async move {
                if let Err(e) = runtime.run(coordinator, &session_id, &query).await {
                    warn!("agent run failed for session {}: {}", session_id, e);
                }
            });
        }
        ClientCommand::Ping => {
            let _ = frame_tx.send(ServerFrame::Pong).await;
        }
        ClientCommand::Pong => {
            debug!("pong from client on session {}", session_id);
        }
    }
}

async fn send_json<S>(sender: &mut S, frame: &ServerFrame) -> Result<(), ()>
where
    S: SinkExt<WsMessage> + Unpin,
{
    let json = serde_json::to_string(frame).map_err(|_| ())?;
    sender.send(WsMessage::Text(json.into())).await.map_err(|_| ())
}
