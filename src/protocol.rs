//! The wire format shared by the director's JSON HTTP API and the streaming
//! node's WebSocket envelope (§4.3, §6), plus the state-convergence record
//! itself (§3).

use serde::{Deserialize, Serialize};

/// The unit of synchronization (§3). Every session has exactly one of these
/// stored in the keyspace at any time; `timestamp` is the ordering key for
/// the last-writer-wins rule in §4.3.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackState {
    pub paused: bool,
    pub current_time: f64,
    pub playback_rate: f64,
    /// Milliseconds since epoch, authored by the host at the moment of change.
    pub timestamp: u64,
}

impl PlaybackState {
    pub fn initial(now_ms: u64) -> Self {
        Self {
            paused: true,
            current_time: 0.0,
            playback_rate: 1.0,
            timestamp: now_ms,
        }
    }

    /// §4.3: a write is accepted iff its timestamp is strictly greater than
    /// the stored record's. Equal timestamps lose.
    pub fn supersedes(&self, stored: &PlaybackState) -> bool {
        self.timestamp > stored.timestamp
    }
}

/// Fixed-per-deployment manifest metadata (§4.2) returned for a
/// `videoMetadata` request. Values are configured, not derived from a real
/// transcoder, per the Non-goals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoManifest {
    pub chunk_duration: f64,
    pub chunk_count: u32,
    pub video_duration: f64,
    pub video_file_type: &'static str,
}

/// Messages a viewer client sends to a streaming node (§6).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "stateUpdate")]
    StateUpdate { state: PlaybackState },
    #[serde(rename = "videoMetadata")]
    VideoMetadataRequest,
    #[serde(rename = "heartbeat")]
    Heartbeat,
}

/// Messages a streaming node sends to a viewer client (§6).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "stateUpdate", rename_all = "camelCase")]
    StateUpdate {
        state: PlaybackState,
        server_time: u64,
    },
    #[serde(rename = "videoMetadata")]
    VideoMetadata { state: VideoManifest },
    #[serde(rename = "heartbeatAck")]
    HeartbeatAck,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strictly_greater_timestamp_supersedes() {
        let stored = PlaybackState {
            paused: false,
            current_time: 10.0,
            playback_rate: 1.0,
            timestamp: 1000,
        };
        let higher = PlaybackState {
            timestamp: 1001,
            ..stored
        };
        let equal = PlaybackState { ..stored };
        let lower = PlaybackState {
            timestamp: 999,
            ..stored
        };

        assert!(higher.supersedes(&stored));
        assert!(!equal.supersedes(&stored));
        assert!(!lower.supersedes(&stored));
    }

    #[test]
    fn client_message_deserializes_by_tag() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"stateUpdate","state":{"paused":false,"currentTime":1.5,"playbackRate":1.0,"timestamp":42}}"#,
        )
        .unwrap();
        assert!(matches!(msg, ClientMessage::StateUpdate { state } if state.timestamp == 42));

        let msg: ClientMessage = serde_json::from_str(r#"{"type":"heartbeat"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Heartbeat));
    }

    #[test]
    fn server_message_serializes_camel_case() {
        let msg = ServerMessage::StateUpdate {
            state: PlaybackState::initial(0),
            server_time: 5,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"currentTime\""));
        assert!(json.contains("\"serverTime\":5"));
    }
}
