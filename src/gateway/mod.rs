pub mod connection;
pub mod events;
pub mod heartbeat;
pub mod hub;
pub mod protocol;

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::error::AppError;
use crate::state::AppState;
use events::{close_code, opcode, GatewayMessage, JoinData, ReadyData};
use hub::{HubError, Registration};
use protocol::{ProtocolError, SyncMessage};

pub async fn ws_upgrade(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Response, AppError> {
    if !state.store().contains(&session_id) {
        return Err(AppError::NotFound("session not found".to_string()));
    }
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, session_id)))
}

type WsSink = SplitSink<WebSocket, Message>;

async fn send_frame(sink: &mut WsSink, frame: &GatewayMessage) -> bool {
    sink.send(Message::Text(frame.to_text().into())).await.is_ok()
}

fn invalid_session(reason: &str) -> GatewayMessage {
    GatewayMessage::with_data(
        opcode::INVALID_SESSION,
        serde_json::json!({ "reason": reason }),
    )
}

fn hub_error_frame(err: HubError) -> GatewayMessage {
    match err {
        HubError::Protocol(e) => e.to_frame(),
        HubError::Store(e) => GatewayMessage::with_data(
            opcode::ERROR,
            serde_json::json!({ "code": "not_found", "message": e.to_string() }),
        ),
        HubError::UnknownConnection(_) => ProtocolError::NotJoined.to_frame(),
    }
}

async fn handle_socket(socket: WebSocket, state: AppState, session_id: String) {
    let (mut ws_sink, mut ws_stream) = socket.split();
    let heartbeat = state.heartbeat;

    // Send HELLO
    let hello = GatewayMessage::with_data(
        opcode::HELLO,
        serde_json::json!({ "heartbeatInterval": heartbeat.interval.as_millis() as u64 }),
    );
    if !send_frame(&mut ws_sink, &hello).await {
        return;
    }

    // Wait for JOIN
    let join_timeout = tokio::time::sleep(heartbeat.join_timeout);
    tokio::pin!(join_timeout);

    let (registration, mut rx): (Registration, mpsc::UnboundedReceiver<String>) = loop {
        tokio::select! {
            _ = &mut join_timeout => {
                tracing::debug!("connection to session {session_id} never joined");
                let _ = send_frame(&mut ws_sink, &invalid_session("join timed out")).await;
                let _ = ws_sink.close().await;
                return;
            }
            msg = ws_stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let gw_msg = match serde_json::from_str::<GatewayMessage>(&text) {
                            Ok(m) => m,
                            Err(e) => {
                                let frame = ProtocolError::Decode(e.to_string()).to_frame();
                                if !send_frame(&mut ws_sink, &frame).await {
                                    return;
                                }
                                continue;
                            }
                        };
                        let reply = match gw_msg.op {
                            opcode::JOIN => {
                                let join = match gw_msg.data {
                                    None => JoinData::default(),
                                    Some(data) => match serde_json::from_value::<JoinData>(data) {
                                        Ok(join) => join,
                                        Err(e) => {
                                            let frame = ProtocolError::Decode(e.to_string()).to_frame();
                                            if !send_frame(&mut ws_sink, &frame).await {
                                                return;
                                            }
                                            continue;
                                        }
                                    },
                                };
                                let (tx, rx) = mpsc::unbounded_channel::<String>();
                                match state.hub.register(&session_id, &join.display_name(), tx).await {
                                    Ok(registration) => break (registration, rx),
                                    Err(e) => {
                                        tracing::debug!("join to session {session_id} refused: {e}");
                                        let _ = send_frame(&mut ws_sink, &invalid_session(&e.to_string())).await;
                                        let _ = ws_sink.close().await;
                                        return;
                                    }
                                }
                            }
                            opcode::HEARTBEAT => GatewayMessage::new(opcode::HEARTBEAT_ACK),
                            _ => ProtocolError::NotJoined.to_frame(),
                        };
                        if !send_frame(&mut ws_sink, &reply).await {
                            return;
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                    _ => {}
                }
            }
        }
    };

    let connection_id = registration.connection_id.clone();
    let participant_id = registration.participant.id.clone();

    // Send READY
    let ready = ReadyData {
        connection_id: registration.connection_id,
        participant: registration.participant,
        session: registration.session,
        executions: registration.executions,
        heartbeat_interval: heartbeat.interval.as_millis() as u64,
    };
    let ready = GatewayMessage::with_data(
        opcode::READY,
        serde_json::to_value(&ready).unwrap_or_default(),
    );
    if !send_frame(&mut ws_sink, &ready).await {
        state.hub.unregister(&session_id, &connection_id).await;
        return;
    }

    let mut last_heartbeat = Instant::now();
    let mut heartbeat_check = tokio::time::interval(heartbeat.interval);

    loop {
        tokio::select! {
            // Frames fanned out by the hub
            queued = rx.recv() => {
                match queued {
                    Some(text) => {
                        if ws_sink.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            // Heartbeat check
            _ = heartbeat_check.tick() => {
                if last_heartbeat.elapsed() > heartbeat.timeout {
                    tracing::info!("participant {participant_id} in session {session_id} timed out");
                    let _ = ws_sink
                        .send(Message::Close(Some(CloseFrame {
                            code: close_code::SESSION_TIMED_OUT,
                            reason: Utf8Bytes::from_static("heartbeat timed out"),
                        })))
                        .await;
                    break;
                }
            }
            // Incoming frames
            msg = ws_stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = handle_frame(
                            &state,
                            &session_id,
                            &connection_id,
                            text.as_str(),
                            &mut last_heartbeat,
                        )
                        .await;
                        if let Some(frame) = reply {
                            if !send_frame(&mut ws_sink, &frame).await {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
        }
    }

    state.hub.unregister(&session_id, &connection_id).await;
}

/// Handle one text frame from a joined connection. Returns the frame to send
/// back to that connection only, if any.
async fn handle_frame(
    state: &AppState,
    session_id: &str,
    connection_id: &str,
    text: &str,
    last_heartbeat: &mut Instant,
) -> Option<GatewayMessage> {
    let gw_msg = match serde_json::from_str::<GatewayMessage>(text) {
        Ok(m) => m,
        Err(e) => return Some(ProtocolError::Decode(e.to_string()).to_frame()),
    };

    match gw_msg.op {
        opcode::HEARTBEAT => {
            *last_heartbeat = Instant::now();
            Some(GatewayMessage::new(opcode::HEARTBEAT_ACK))
        }
        opcode::EVENT => {
            let Some(data) = gw_msg.data else {
                return Some(ProtocolError::MissingField("data").to_frame());
            };
            let message = match SyncMessage::parse(data) {
                Ok(message) => message,
                Err(e) => {
                    tracing::debug!("rejected frame on connection {connection_id}: {e}");
                    return Some(e.to_frame());
                }
            };
            match state.hub.publish(session_id, connection_id, message).await {
                Ok(_) => None,
                Err(e) => {
                    tracing::debug!("publish on connection {connection_id} refused: {e}");
                    Some(hub_error_frame(e))
                }
            }
        }
        opcode::JOIN => Some(ProtocolError::AlreadyJoined.to_frame()),
        op => Some(ProtocolError::UnknownOpcode(op).to_frame()),
    }
}
