use serde::{Deserialize, Serialize};

use crate::logging::Logging;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectorConfig {
    /// Restart-only: read once at startup (matches the teacher's note that
    /// changing the port only takes effect after a restart).
    pub port: u16,
    pub keyspace_url: String,
    pub logging: Logging,
}

impl Default for DirectorConfig {
    fn default() -> Self {
        Self {
            port: 4000,
            keyspace_url: "redis://127.0.0.1:6379".to_owned(),
            logging: Logging::Info,
        }
    }
}
