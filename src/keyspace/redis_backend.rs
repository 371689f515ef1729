use std::time::Duration;

use async_trait::async_trait;
use futures_util::{stream::BoxStream, StreamExt};
use redis::{aio::ConnectionManager, AsyncCommands, Client};

use crate::AppResult;

use super::Keyspace;

/// Production keyspace backend. Reads/writes/deletes go through a
/// `ConnectionManager`, which multiplexes commands over a single connection
/// and reconnects transparently on failure; pub/sub needs its own dedicated
/// connection per the redis-rs API, so `subscribe` opens one on demand.
#[derive(Clone)]
pub struct RedisKeyspace {
    client: Client,
    commands: ConnectionManager,
}

impl RedisKeyspace {
    pub async fn connect(url: &str) -> AppResult<Self> {
        let client = Client::open(url)?;
        let commands = client.get_connection_manager().await?;
        Ok(Self { client, commands })
    }
}

#[async_trait]
impl Keyspace for RedisKeyspace {
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        let mut conn = self.commands.clone();
        let seconds = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(key, value, seconds).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut conn = self.commands.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let mut conn = self.commands.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: &str) -> AppResult<()> {
        let mut conn = self.commands.clone();
        conn.publish::<_, _, ()>(topic, payload).await?;
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> AppResult<BoxStream<'static, String>> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(topic).await?;

        let stream = pubsub
            .into_on_message()
            .filter_map(|msg| async move { msg.get_payload::<String>().ok() });

        Ok(Box::pin(stream))
    }
}
