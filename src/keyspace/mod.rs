//! The shared keyspace collaborator (§2, §3): a low-latency key/value store
//! with TTL plus a topic-based pub/sub channel. Modeled as a thin async trait
//! so the director and the streaming node can be unit-tested against an
//! in-memory fake without a real Redis, while the production binaries talk
//! to the real thing.

mod memory;
mod redis_backend;

pub use memory::InMemoryKeyspace;
pub use redis_backend::RedisKeyspace;

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::AppResult;

/// Session records are TTL'd to 24h from last write (§3).
pub const SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[async_trait]
pub trait Keyspace: Send + Sync + 'static {
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()>;
    async fn get(&self, key: &str) -> AppResult<Option<String>>;
    async fn delete(&self, key: &str) -> AppResult<()>;
    async fn publish(&self, topic: &str, payload: &str) -> AppResult<()>;
    /// Subscribes to a topic, returning a stream of every payload published
    /// to it from now on (no history, no delivery guarantee - §1 Non-goals).
    async fn subscribe(&self, topic: &str) -> AppResult<BoxStream<'static, String>>;
}

pub fn session_key(key: &str) -> String {
    format!("session:{key}")
}

pub fn session_host_key(key: &str) -> String {
    format!("session:{key}:host")
}

pub fn session_state_key(key: &str) -> String {
    format!("session:{key}:state")
}

pub fn session_topic(key: &str) -> String {
    format!("session-updates:{key}")
}
