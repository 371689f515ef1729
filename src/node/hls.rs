//! Read-only HLS proxy onto the object-store collaborator (§4.2, §6). The
//! node never writes these paths; it only forwards GETs and guards against
//! path traversal in the one path segment a client controls freely.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::{AppError, AppResult};

use super::state::AppState;

/// GET /hls/{sessionID}/master.m3u8
pub async fn master_playlist(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> AppResult<impl IntoResponse> {
    proxy(&state, &format!("{session_id}/master.m3u8"), &headers).await
}

/// GET /hls/{sessionID}/{quality}/playlist.m3u8
pub async fn quality_playlist(
    State(state): State<AppState>,
    Path((session_id, quality)): Path<(String, String)>,
    headers: HeaderMap,
) -> AppResult<impl IntoResponse> {
    reject_traversal(&quality)?;
    proxy(
        &state,
        &format!("{session_id}/{quality}/playlist.m3u8"),
        &headers,
    )
    .await
}

/// GET /hls/{sessionID}/{quality}/{segmentName}
pub async fn segment(
    State(state): State<AppState>,
    Path((session_id, quality, segment_name)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> AppResult<impl IntoResponse> {
    reject_traversal(&quality)?;
    reject_traversal(&segment_name)?;
    proxy(
        &state,
        &format!("{session_id}/{quality}/{segment_name}"),
        &headers,
    )
    .await
}

/// Rejects any path component containing `..` or an embedded `/` (§4.2).
fn reject_traversal(component: &str) -> AppResult<()> {
    if component.contains("..") || component.contains('/') {
        return Err(AppError::Status(StatusCode::BAD_REQUEST));
    }
    Ok(())
}

async fn proxy(state: &AppState, upstream_path: &str, headers: &HeaderMap) -> AppResult<Response> {
    let url = format!("{}/{upstream_path}", state.object_store_base_url);

    let mut request = state.http_client.get(&url);
    if let Some(range) = headers.get(axum::http::header::RANGE) {
        request = request.header(axum::http::header::RANGE, range.clone());
    }

    let upstream = request.send().await.map_err(AppError::internal)?;

    let status = StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    if !upstream.status().is_success() {
        warn!(%url, %status, "object store returned non-success for HLS proxy request");
    }

    let mut response_headers = HeaderMap::new();
    for name in [
        axum::http::header::CONTENT_TYPE,
        axum::http::header::CONTENT_LENGTH,
        axum::http::header::CONTENT_RANGE,
        axum::http::header::ACCEPT_RANGES,
    ] {
        if let Some(value) = upstream.headers().get(&name) {
            response_headers.insert(name, value.clone());
        }
    }

    let body = Body::from_stream(upstream.bytes_stream());

    let mut response = Response::builder().status(status);
    if let Some(headers_mut) = response.headers_mut() {
        *headers_mut = response_headers;
    }
    response.body(body).map_err(AppError::internal)
}
