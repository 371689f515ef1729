//! The director's HTTP surface (§4.1, §6): session creation, join validation,
//! and the streaming-node register/heartbeat endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    cors,
    ids::{HostToken, SessionKey},
    keyspace::{self, SESSION_TTL},
    protocol::PlaybackState,
    utils::{now_millis, HandleErr},
    AppError, AppResult,
};

use super::state::AppState;
use crate::director::registry::NodeDescriptor;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:key/validate", get(validate_session))
        .route(
            "/api/streaming-servers/register",
            post(register_streaming_server),
        )
        .route(
            "/api/streaming-servers/heartbeat",
            post(heartbeat_streaming_server),
        )
        .route("/status", get(status))
        .layer(cors::permissive())
}

#[derive(Debug, Serialize)]
struct CreateSessionResponse {
    session_key: String,
    host_token: String,
}

/// POST /api/sessions (§4.1 Create session).
///
/// On any keyspace write failure, best-effort rolls back whichever keys were
/// already written before failing the call with 503.
async fn create_session(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let session_key = SessionKey::generate();
    let host_token = HostToken::generate();

    let existence_key = keyspace::session_key(&session_key.to_string());
    let host_key = keyspace::session_host_key(&session_key.to_string());
    let state_key = keyspace::session_state_key(&session_key.to_string());

    let initial_state = PlaybackState::initial(now_millis());
    let serialized_state =
        serde_json::to_string(&initial_state).expect("PlaybackState always serializes");

    if let Err(err) = write_session(
        &state,
        &existence_key,
        &host_key,
        &state_key,
        &host_token,
        &serialized_state,
    )
    .await
    {
        warn!("failed to create session, rolling back: {err:?}");
        state.keyspace.delete(&existence_key).await.log_warn();
        state.keyspace.delete(&host_key).await.log_warn();
        state.keyspace.delete(&state_key).await.log_warn();
        return Err(AppError::Status(StatusCode::SERVICE_UNAVAILABLE));
    }

    Ok(Json(CreateSessionResponse {
        session_key: session_key.to_string(),
        host_token: host_token.to_string(),
    }))
}

async fn write_session(
    state: &AppState,
    existence_key: &str,
    host_key: &str,
    state_key: &str,
    host_token: &HostToken,
    serialized_state: &str,
) -> AppResult<()> {
    state
        .keyspace
        .set_ex(existence_key, "1", SESSION_TTL)
        .await?;
    state
        .keyspace
        .set_ex(host_key, &host_token.to_string(), SESSION_TTL)
        .await?;
    state
        .keyspace
        .set_ex(state_key, serialized_state, SESSION_TTL)
        .await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct ValidateQuery {
    host_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ValidateResponse {
    Valid {
        valid: bool,
        is_host: bool,
        streaming_url: String,
    },
    NotFound {
        valid: bool,
        error: &'static str,
    },
    Unavailable {
        error: &'static str,
    },
}

/// GET /api/sessions/{key}/validate (§4.1 Validate session).
async fn validate_session(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<ValidateQuery>,
) -> AppResult<impl IntoResponse> {
    let existence_key = keyspace::session_key(&key);
    let exists = state.keyspace.get(&existence_key).await?.is_some();

    if !exists {
        return Ok((
            StatusCode::OK,
            Json(ValidateResponse::NotFound {
                valid: false,
                error: "session_not_found",
            }),
        ));
    }

    let Some(streaming_url) = state.registry.select() else {
        return Ok((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ValidateResponse::Unavailable {
                error: "no_streaming_servers_available",
            }),
        ));
    };

    let host_key = keyspace::session_host_key(&key);
    let stored_host_token = state.keyspace.get(&host_key).await?;
    let is_host = match (&query.host_token, &stored_host_token) {
        (Some(supplied), Some(stored)) => supplied == stored,
        _ => false,
    };

    Ok((
        StatusCode::OK,
        Json(ValidateResponse::Valid {
            valid: true,
            is_host,
            streaming_url,
        }),
    ))
}

async fn register_streaming_server(
    State(state): State<AppState>,
    Json(descriptor): Json<NodeDescriptor>,
) -> impl IntoResponse {
    state.registry.register(descriptor);
    StatusCode::OK
}

async fn heartbeat_streaming_server(
    State(state): State<AppState>,
    Json(descriptor): Json<NodeDescriptor>,
) -> impl IntoResponse {
    state.registry.heartbeat(descriptor);
    StatusCode::OK
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    registered_nodes: usize,
    uptime_seconds: u64,
}

async fn status(State(state): State<AppState>) -> impl IntoResponse {
    Json(StatusResponse {
        registered_nodes: state.registry.len(),
        uptime_seconds: state.uptime_seconds(),
    })
}
