use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};

use crate::{keyspace::Keyspace, protocol::VideoManifest, shutdown::Shutdown};

use super::session::SessionRegistry;

#[derive(Clone)]
pub struct AppState {
    pub keyspace: Arc<dyn Keyspace>,
    pub sessions: SessionRegistry,
    pub manifest: VideoManifest,
    pub http_client: reqwest::Client,
    pub object_store_base_url: Arc<str>,
    pub node_id: Arc<str>,
    pub capacity: u32,
    pub clock_skew_guard: bool,
    load: Arc<AtomicU32>,
    pub shutdown: Shutdown,
}

impl AppState {
    pub fn new(
        keyspace: Arc<dyn Keyspace>,
        sessions: SessionRegistry,
        manifest: VideoManifest,
        object_store_base_url: String,
        node_id: String,
        capacity: u32,
        clock_skew_guard: bool,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            keyspace,
            sessions,
            manifest,
            http_client: reqwest::Client::new(),
            object_store_base_url: object_store_base_url.into(),
            node_id: node_id.into(),
            capacity,
            clock_skew_guard,
            load: Arc::new(AtomicU32::new(0)),
            shutdown,
        }
    }

    /// True once the node-wide load counter has reached its declared
    /// capacity (§4.2 connect path step 2).
    pub fn is_at_capacity(&self) -> bool {
        self.load.load(Ordering::SeqCst) >= self.capacity
    }

    pub fn current_load(&self) -> u32 {
        self.load.load(Ordering::SeqCst)
    }

    pub fn increment_load(&self) {
        self.load.fetch_add(1, Ordering::SeqCst);
    }

    pub fn decrement_load(&self) {
        self.load
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                Some(n.saturating_sub(1))
            })
            .ok();
    }
}
