use serde::{Deserialize, Serialize};

use crate::logging::Logging;
use crate::protocol::VideoManifest;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Restart-only.
    pub port: u16,
    /// Node ID this process registers itself under; also restart-only in
    /// practice (changing it mid-flight just means the director sees a new
    /// node and the old entry expires on its own).
    pub node_id: String,
    /// Externally-reachable base URL advertised to the director and handed
    /// back to viewers as `streaming_url`.
    pub public_url: String,
    pub director_url: String,
    pub keyspace_url: String,
    /// Max concurrent viewers this node admits (§3, §4.2).
    pub capacity: u32,
    pub object_store_base_url: String,
    pub manifest: ManifestConfig,
    /// Opt-in hardening for §4.3's last-writer-wins rule (§9 clock skew):
    /// when a host's write would otherwise be rejected for a regressing
    /// timestamp, bump it to `max(prev_timestamp + 1, now)` instead of
    /// dropping it. Off by default - a host with a correct clock never
    /// needs it, and it masks a misbehaving client rather than fixing it.
    pub clock_skew_guard: bool,
    pub logging: Logging,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            node_id: "node-1".to_owned(),
            public_url: "http://127.0.0.1:5000".to_owned(),
            director_url: "http://127.0.0.1:4000".to_owned(),
            keyspace_url: "redis://127.0.0.1:6379".to_owned(),
            capacity: 500,
            object_store_base_url: "http://127.0.0.1:9000".to_owned(),
            manifest: ManifestConfig::default(),
            clock_skew_guard: false,
            logging: Logging::Info,
        }
    }
}

/// Static per-deployment manifest values (§4.2): "a production variant would
/// derive them from the transcoder output - deferred".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestConfig {
    pub chunk_duration: f64,
    pub chunk_count: u32,
    pub video_duration: f64,
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            chunk_duration: 10.0,
            chunk_count: 0,
            video_duration: 0.0,
        }
    }
}

impl ManifestConfig {
    pub fn to_manifest(self) -> VideoManifest {
        VideoManifest {
            chunk_duration: self.chunk_duration,
            chunk_count: self.chunk_count,
            video_duration: self.video_duration,
            video_file_type: "mp4",
        }
    }
}
