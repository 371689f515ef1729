use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use futures_util::{stream::BoxStream, StreamExt};
use parking_lot::Mutex;
use tokio_stream::wrappers::BroadcastStream;

use crate::AppResult;

use super::Keyspace;

struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-process stand-in for the shared keyspace, used by unit tests so the
/// last-writer-wins and TTL-adjacent logic can be exercised without a real
/// Redis. Sharing one instance across two `Keyspace` handles emulates two
/// streaming nodes talking through the same backing store, including
/// cross-node pub/sub fan-out (§8 scenario 4).
#[derive(Clone, Default)]
pub struct InMemoryKeyspace {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    topics: Arc<Mutex<HashMap<String, tokio::sync::broadcast::Sender<String>>>>,
}

impl InMemoryKeyspace {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Keyspace for InMemoryKeyspace {
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        self.entries.lock().insert(
            key.to_owned(),
            Entry {
                value: value.to_owned(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get(key) else {
            return Ok(None);
        };
        if entry.expires_at <= Instant::now() {
            entries.remove(key);
            return Ok(None);
        }
        Ok(Some(entry.value.clone()))
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: &str) -> AppResult<()> {
        let topics = self.topics.lock();
        if let Some(sender) = topics.get(topic) {
            // No subscribers is not an error: the spec treats publish failure
            // as soft-drop, and "nobody is listening" is the common case
            // right after the last local viewer of a session departs.
            let _ = sender.send(payload.to_owned());
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> AppResult<BoxStream<'static, String>> {
        let mut topics = self.topics.lock();
        let sender = topics
            .entry(topic.to_owned())
            .or_insert_with(|| tokio::sync::broadcast::channel(256).0)
            .clone();
        drop(topics);

        let stream = BroadcastStream::new(sender.subscribe()).filter_map(|item| item.ok());
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_returns_none_for_missing_key() {
        let ks = InMemoryKeyspace::new();
        assert_eq!(ks.get("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let ks = InMemoryKeyspace::new();
        ks.set_ex("k", "v", Duration::from_secs(60)).await.unwrap();
        assert_eq!(ks.get("k").await.unwrap(), Some("v".to_owned()));
    }

    #[tokio::test]
    async fn expired_entry_reads_as_missing() {
        let ks = InMemoryKeyspace::new();
        ks.set_ex("k", "v", Duration::from_millis(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(ks.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_removes_key() {
        let ks = InMemoryKeyspace::new();
        ks.set_ex("k", "v", Duration::from_secs(60)).await.unwrap();
        ks.delete("k").await.unwrap();
        assert_eq!(ks.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn subscriber_receives_published_payload() {
        let ks = InMemoryKeyspace::new();
        let mut stream = ks.subscribe("topic").await.unwrap();
        ks.publish("topic", "hello").await.unwrap();
        let received = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .unwrap();
        assert_eq!(received, Some("hello".to_owned()));
    }

    #[tokio::test]
    async fn two_handles_to_the_same_keyspace_share_state() {
        let ks_a = InMemoryKeyspace::new();
        let ks_b = ks_a.clone();

        ks_a.set_ex("k", "v", Duration::from_secs(60)).await.unwrap();
        assert_eq!(ks_b.get("k").await.unwrap(), Some("v".to_owned()));
    }
}
