//! The streaming-node registry (§4.1, §5): a single read-write lock over the
//! node map. Selection takes a read lock; register/heartbeat/expiry take a
//! write lock. The registry is in-memory only (§9) - a director restart
//! erases all node knowledge until each node's next heartbeat re-registers it.

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::Shutdown;

/// The node-supplied descriptor carried on both `register` and `heartbeat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub id: String,
    pub url: String,
    pub capacity: u32,
    pub current_load: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Active,
    Inactive,
}

struct NodeEntry {
    url: String,
    capacity: u32,
    current_load: u32,
    status: Status,
    last_ping: Instant,
}

/// Nodes whose last heartbeat is older than this are swept from the registry.
pub const NODE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Clone, Default)]
pub struct NodeRegistry {
    nodes: std::sync::Arc<RwLock<HashMap<String, NodeEntry>>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the entry for `descriptor.id`, marking it active.
    pub fn register(&self, descriptor: NodeDescriptor) {
        self.nodes.write().insert(
            descriptor.id,
            NodeEntry {
                url: descriptor.url,
                capacity: descriptor.capacity,
                current_load: descriptor.current_load,
                status: Status::Active,
                last_ping: Instant::now(),
            },
        );
    }

    /// Updates load/last-ping and re-activates an existing entry. Unknown IDs
    /// are silently ignored - a node whose entry expired must re-register.
    pub fn heartbeat(&self, descriptor: NodeDescriptor) {
        let mut nodes = self.nodes.write();
        let Some(entry) = nodes.get_mut(&descriptor.id) else {
            return;
        };
        entry.url = descriptor.url;
        entry.capacity = descriptor.capacity;
        entry.current_load = descriptor.current_load;
        entry.status = Status::Active;
        entry.last_ping = Instant::now();
    }

    /// Least-loaded active node by `current_load / capacity`, skipping any
    /// node that is inactive or already at capacity. Deterministic within a
    /// call: ties go to whichever entry is encountered first in the map's
    /// (stable-for-this-snapshot) iteration order.
    pub fn select(&self) -> Option<String> {
        let nodes = self.nodes.read();

        let mut best: Option<(&str, f64)> = None;
        for (id, entry) in nodes.iter() {
            if entry.status != Status::Active || entry.current_load >= entry.capacity {
                continue;
            }
            let ratio = f64::from(entry.current_load) / f64::from(entry.capacity);
            match best {
                Some((_, best_ratio)) if ratio >= best_ratio => {}
                _ => best = Some((id, ratio)),
            }
        }

        best.map(|(id, _)| nodes.get(id).expect("id came from this map").url.clone())
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every entry whose last heartbeat is older than [`NODE_TIMEOUT`].
    pub fn sweep_expired(&self) {
        let mut nodes = self.nodes.write();
        let before = nodes.len();
        nodes.retain(|_, entry| entry.last_ping.elapsed() < NODE_TIMEOUT);
        let removed = before - nodes.len();
        if removed > 0 {
            info!("expired {removed} streaming node(s) from the registry");
        }
    }

    /// Runs the periodic expiry sweep every 60s until shutdown (§4.1).
    pub async fn run_expiry_sweep(self, shutdown: Shutdown) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(NODE_TIMEOUT) => {}
                _ = shutdown.cancelled() => return,
            }
            self.sweep_expired();
        }
    }
}
