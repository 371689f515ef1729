//! Self-registration with the director (§4.1 Register/Heartbeat, §9: a node
//! re-registers itself after any director restart once its entry has
//! expired there). Runs well under the director's 60 s expiry window.

use std::time::Duration;

use tracing::warn;

use crate::{director::registry::NodeDescriptor, shutdown::Shutdown};

use super::state::AppState;

const REPORT_INTERVAL: Duration = Duration::from_secs(15);

pub async fn run(state: AppState, public_url: String, director_url: String, shutdown: Shutdown) {
    register(&state, &public_url, &director_url).await;

    loop {
        tokio::select! {
            _ = tokio::time::sleep(REPORT_INTERVAL) => {}
            _ = shutdown.cancelled() => return,
        }
        heartbeat(&state, &public_url, &director_url).await;
    }
}

async fn register(state: &AppState, public_url: &str, director_url: &str) {
    report(state, public_url, director_url, "register").await;
}

async fn heartbeat(state: &AppState, public_url: &str, director_url: &str) {
    report(state, public_url, director_url, "heartbeat").await;
}

async fn report(state: &AppState, public_url: &str, director_url: &str, endpoint: &str) {
    let descriptor = NodeDescriptor {
        id: state.node_id.to_string(),
        url: public_url.to_owned(),
        capacity: state.capacity,
        current_load: state.current_load(),
    };

    let url = format!("{director_url}/api/streaming-servers/{endpoint}");
    let result = state.http_client.post(&url).json(&descriptor).send().await;
    match result {
        Ok(response) if response.status().is_success() => {}
        Ok(response) => warn!(status = %response.status(), endpoint, "director rejected self-report"),
        Err(err) => warn!(endpoint, "failed to reach director: {err}"),
    }
}
