//! The viewer-facing WebSocket endpoint (§4.2 connect path, message
//! handling, disconnect path). Grounded in the teacher's
//! `SessionChannel::handle_communications` (split socket, one send task, one
//! receive task, raced with the shutdown token) but generalized from a
//! single-node broadcast channel to a per-connection queue plus a
//! cross-node topic subscription (§4.3, §5).

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::IntoResponse,
};
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::debug;

use crate::{
    keyspace::{self, Keyspace},
    protocol::{ClientMessage, PlaybackState, ServerMessage},
    utils::{now_millis, HandleErr},
    AppError, AppResult,
};

use super::{
    connection::{ConnectionHandle, ConnectionId},
    session::SessionHub,
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    session_id: String,
    #[serde(default)]
    is_host: bool,
}

/// GET /ws?session_id=&is_host= (§6).
pub async fn connect(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<ConnectQuery>,
) -> AppResult<impl IntoResponse> {
    if state.is_at_capacity() {
        return Err(AppError::Status(StatusCode::SERVICE_UNAVAILABLE));
    }

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, query.session_id, query.is_host)))
}

async fn handle_socket(socket: WebSocket, state: AppState, session_id: String, is_host: bool) {
    let hub = state.sessions.hub(&session_id);
    let connection_id = state.sessions.next_connection_id();
    let (connection, outbound_rx) = ConnectionHandle::new(connection_id, is_host);

    state.increment_load();
    hub.join(connection.clone());

    let (sender, receiver) = socket.split();

    if !is_host {
        if let Some(initial) = load_initial_state(&state, &session_id).await {
            connection.try_send(initial);
        }
    }

    let mut send_task = tokio::spawn(pump_outbound(sender, outbound_rx));
    let mut recv_task = tokio::spawn(receive_inbound(
        receiver,
        state.clone(),
        hub.clone(),
        connection_id,
        is_host,
    ));

    tokio::select! {
        _ = state.shutdown.cancelled() => {
            send_task.abort();
            recv_task.abort();
        }
        _ = &mut send_task => { recv_task.abort(); }
        _ = &mut recv_task => { send_task.abort(); }
    }

    hub.leave(connection_id);
    state.decrement_load();
}

/// §4.2 connect path step 7: a joining participant immediately gets the
/// current stored state, if any.
async fn load_initial_state(state: &AppState, session_id: &str) -> Option<ServerMessage> {
    let state_key = keyspace::session_state_key(session_id);
    let raw = state
        .keyspace
        .get(&state_key)
        .await
        .log_warn_with_msg("failed to read initial state for joiner")
        .flatten()?;
    let playback_state = serde_json::from_str::<PlaybackState>(&raw)
        .log_warn_with_msg("stored state is not valid PlaybackState")?;
    Some(ServerMessage::StateUpdate {
        state: playback_state,
        server_time: now_millis(),
    })
}

async fn pump_outbound(
    mut sender: SplitSink<WebSocket, Message>,
    mut outbound_rx: mpsc::Receiver<ServerMessage>,
) {
    while let Some(message) = outbound_rx.recv().await {
        let Some(text) =
            serde_json::to_string(&message).log_err_with_msg("failed to serialize outbound message")
        else {
            continue;
        };
        if sender
            .send(Message::Text(text))
            .await
            .log_warn_with_msg("failed to write to websocket, closing connection")
            .is_none()
        {
            break;
        }
    }
}

async fn receive_inbound(
    mut receiver: SplitStream<WebSocket>,
    state: AppState,
    hub: Arc<SessionHub>,
    connection_id: ConnectionId,
    is_host: bool,
) {
    while let Some(message) = receiver.next().await {
        let Ok(message) = message else { break };

        match message {
            Message::Text(text) => {
                handle_client_message(&text, &state, &hub, connection_id, is_host).await;
            }
            Message::Close(_) => break,
            Message::Binary(_) | Message::Ping(_) | Message::Pong(_) => continue,
        }
    }
}

async fn handle_client_message(
    text: &str,
    state: &AppState,
    hub: &SessionHub,
    connection_id: ConnectionId,
    is_host: bool,
) {
    let Ok(message) = serde_json::from_str::<ClientMessage>(text) else {
        debug!("dropping malformed client frame: {text}");
        return;
    };

    match message {
        ClientMessage::StateUpdate { state: incoming } => {
            if !is_host {
                debug!(connection_id, "ignoring stateUpdate from non-host connection");
                return;
            }
            hub.apply_host_state_update(incoming, state.clock_skew_guard)
                .await;
        }
        ClientMessage::VideoMetadataRequest => {
            hub.send_to(
                connection_id,
                ServerMessage::VideoMetadata {
                    state: state.manifest,
                },
            );
        }
        ClientMessage::Heartbeat => {
            hub.send_to(connection_id, ServerMessage::HeartbeatAck);
        }
    }
}
