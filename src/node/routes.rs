//! The streaming node's HTTP/WS surface (§6): viewer WebSocket attach,
//! health, and the read-only HLS proxy.

use axum::{
    extract::State,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::Serialize;

use crate::cors;

use super::{hls, state::AppState, ws};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::connect))
        .route("/status", get(status))
        .route("/hls/:session_id/master.m3u8", get(hls::master_playlist))
        .route(
            "/hls/:session_id/:quality/playlist.m3u8",
            get(hls::quality_playlist),
        )
        .route(
            "/hls/:session_id/:quality/:segment_name",
            get(hls::segment),
        )
        .layer(cors::permissive())
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    node_id: String,
    load: u32,
    capacity: u32,
    active_sessions: usize,
}

async fn status(State(state): State<AppState>) -> impl IntoResponse {
    Json(StatusResponse {
        node_id: state.node_id.to_string(),
        load: state.current_load(),
        capacity: state.capacity,
        active_sessions: state.sessions.active_session_count(),
    })
}
