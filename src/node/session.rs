//! A streaming node's view of a session: the set of locally-attached viewers
//! (§3 ClientConnection, §5 per-session lock) and the node's subscription to
//! that session's keyspace topic (§4.2 connect path step 6, §9 subscription
//! lifecycle).

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::{
    keyspace::{self, Keyspace, SESSION_TTL},
    protocol::{PlaybackState, ServerMessage},
    shutdown::Shutdown,
    utils::{now_millis, HandleErr, Ignore},
};

use super::connection::{ConnectionHandle, ConnectionId};

/// How long a session's local connection bucket must sit empty before its
/// topic subscription is torn down (§9: deferred to a background sweep
/// rather than synchronously on last-departure).
const IDLE_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

struct HubInner {
    connections: HashMap<ConnectionId, ConnectionHandle>,
    subscription: Option<JoinHandle<()>>,
    empty_since: Option<Instant>,
}

/// One session's worth of local state on this node. Cheap to keep around
/// once a session has no viewers - it just holds an empty map until the
/// idle sweep reclaims it.
pub struct SessionHub {
    session_id: String,
    keyspace: Arc<dyn Keyspace>,
    inner: Mutex<HubInner>,
    /// Serializes the read-compare-write sequence for host state updates
    /// (§4.3, §5): held across the await chain, unlike `inner`.
    write_lock: tokio::sync::Mutex<()>,
}

impl SessionHub {
    fn new(session_id: String, keyspace: Arc<dyn Keyspace>) -> Arc<Self> {
        Arc::new(Self {
            session_id,
            keyspace,
            inner: Mutex::new(HubInner {
                connections: HashMap::new(),
                subscription: None,
                empty_since: None,
            }),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Registers a local viewer, subscribing to the session topic first if
    /// this is the first local viewer (§4.2 step 6).
    pub fn join(self: &Arc<Self>, connection: ConnectionHandle) {
        let mut inner = self.inner.lock();
        if inner.connections.is_empty() && inner.subscription.is_none() {
            inner.subscription = Some(self.clone().spawn_subscription());
        }
        inner.connections.insert(connection.id, connection);
        inner.empty_since = None;
    }

    /// Removes a local viewer. Does not tear down the subscription - that is
    /// left to the idle sweep (§9).
    pub fn leave(&self, connection_id: ConnectionId) {
        let mut inner = self.inner.lock();
        inner.connections.remove(&connection_id);
        if inner.connections.is_empty() {
            inner.empty_since = Some(Instant::now());
        }
    }

    /// Non-blocking fan-out to every locally-attached viewer (§4.2 topic
    /// delivery). The connection snapshot is taken under the lock and the
    /// lock is released before any send, per §5.
    pub fn broadcast_local(&self, message: ServerMessage) {
        let snapshot: Vec<ConnectionHandle> =
            self.inner.lock().connections.values().cloned().collect();
        for connection in snapshot {
            connection.try_send(message.clone());
        }
    }

    pub fn connection_count(&self) -> usize {
        self.inner.lock().connections.len()
    }

    /// Replies to a single connection, used for `videoMetadata` and
    /// `heartbeatAck` which are answered to the sender only (§4.2).
    pub fn send_to(&self, connection_id: ConnectionId, message: ServerMessage) {
        if let Some(connection) = self.inner.lock().connections.get(&connection_id) {
            connection.try_send(message);
        }
    }

    /// Applies the last-writer-wins rule (§4.3) to a host's `stateUpdate`:
    /// reads the stored state, accepts the write iff its timestamp is
    /// strictly greater, persists and publishes it, and broadcasts it to
    /// this node's local viewers immediately rather than waiting for the
    /// publish to round-trip back through the subscription (§2). Returns
    /// whether the write was accepted.
    ///
    /// When `clock_skew_guard` is set (§9), a write that would otherwise
    /// lose to a regressing host clock is bumped to
    /// `max(stored.timestamp + 1, now)` and accepted instead of dropped.
    pub async fn apply_host_state_update(
        &self,
        mut incoming: PlaybackState,
        clock_skew_guard: bool,
    ) -> bool {
        let _serialize = self.write_lock.lock().await;

        let state_key = keyspace::session_state_key(&self.session_id);
        let stored = self
            .keyspace
            .get(&state_key)
            .await
            .log_warn_with_msg("failed to read stored state before host write")
            .flatten()
            .and_then(|raw| {
                serde_json::from_str::<PlaybackState>(&raw)
                    .log_warn_with_msg("stored state is not valid PlaybackState")
            });

        if clock_skew_guard {
            if let Some(stored) = &stored {
                if !incoming.supersedes(stored) {
                    incoming.timestamp = (stored.timestamp + 1).max(now_millis());
                }
            }
        }

        let accepted = match &stored {
            Some(stored) => incoming.supersedes(stored),
            None => true,
        };
        if !accepted {
            return false;
        }

        let Some(serialized) =
            serde_json::to_string(&incoming).log_err_with_msg("failed to serialize PlaybackState")
        else {
            return false;
        };

        if self
            .keyspace
            .set_ex(&state_key, &serialized, SESSION_TTL)
            .await
            .log_warn_with_msg("failed to persist accepted host write")
            .is_none()
        {
            return false;
        }

        let topic = keyspace::session_topic(&self.session_id);
        self.keyspace
            .publish(&topic, &serialized)
            .await
            .log_warn_with_msg("failed to publish accepted host write")
            .ignore();

        self.broadcast_local(ServerMessage::StateUpdate {
            state: incoming,
            server_time: now_millis(),
        });

        true
    }

    fn is_idle_since(&self, threshold: Duration) -> bool {
        let inner = self.inner.lock();
        inner.connections.is_empty()
            && inner
                .empty_since
                .is_some_and(|since| since.elapsed() >= threshold)
    }

    /// Aborts the forwarding task and clears the subscription slot. Safe to
    /// call on a hub with no subscription.
    fn unsubscribe(&self) {
        if let Some(handle) = self.inner.lock().subscription.take() {
            handle.abort();
        }
    }

    fn spawn_subscription(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let topic = keyspace::session_topic(&self.session_id);
            let mut stream = match self.keyspace.subscribe(&topic).await {
                Ok(stream) => stream,
                Err(err) => {
                    warn!(session_id = %self.session_id, "failed to subscribe to session topic: {err:?}");
                    return;
                }
            };

            while let Some(payload) = stream.next().await {
                let Some(state) = serde_json::from_str::<PlaybackState>(&payload)
                    .log_warn_with_msg("malformed PlaybackState on session topic")
                else {
                    continue;
                };
                self.broadcast_local(ServerMessage::StateUpdate {
                    state,
                    server_time: now_millis(),
                });
            }
        })
    }
}

/// All sessions a node currently knows about locally, keyed by session ID.
#[derive(Clone)]
pub struct SessionRegistry {
    keyspace: Arc<dyn Keyspace>,
    hubs: Arc<Mutex<HashMap<String, Arc<SessionHub>>>>,
    next_connection_id: Arc<AtomicU64>,
}

impl SessionRegistry {
    pub fn new(keyspace: Arc<dyn Keyspace>) -> Self {
        Self {
            keyspace,
            hubs: Arc::new(Mutex::new(HashMap::new())),
            next_connection_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Returns the hub for a session, creating it if this is the first time
    /// the node has seen that session ID.
    pub fn hub(&self, session_id: &str) -> Arc<SessionHub> {
        self.hubs
            .lock()
            .entry(session_id.to_owned())
            .or_insert_with(|| SessionHub::new(session_id.to_owned(), self.keyspace.clone()))
            .clone()
    }

    pub fn next_connection_id(&self) -> ConnectionId {
        self.next_connection_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn active_session_count(&self) -> usize {
        self.hubs
            .lock()
            .values()
            .filter(|hub| hub.connection_count() > 0)
            .count()
    }

    /// Periodically drops subscriptions (and the hub entry itself) for
    /// sessions that have had no local viewer for a full sweep interval.
    pub async fn run_idle_sweep(self, shutdown: Shutdown) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(IDLE_SWEEP_INTERVAL) => {}
                _ = shutdown.cancelled() => return,
            }
            self.sweep_idle_hubs();
        }
    }

    fn sweep_idle_hubs(&self) {
        self.hubs.lock().retain(|_, hub| {
            if hub.is_idle_since(IDLE_SWEEP_INTERVAL) {
                hub.unsubscribe();
                false
            } else {
                true
            }
        });
    }
}
