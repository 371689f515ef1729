use std::{sync::Arc, time::Instant};

use crate::{director::registry::NodeRegistry, keyspace::Keyspace};

#[derive(Clone)]
pub struct AppState {
    pub keyspace: Arc<dyn Keyspace>,
    pub registry: NodeRegistry,
    started_at: Instant,
}

impl AppState {
    pub fn new(keyspace: Arc<dyn Keyspace>, registry: NodeRegistry) -> Self {
        Self {
            keyspace,
            registry,
            started_at: Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
