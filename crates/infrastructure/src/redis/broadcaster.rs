use application::{BroadcastError, FeedBroadcast, FeedBroadcaster};
use async_trait::async_trait;
use redis::aio::ConnectionManager;

/// 通过 Redis Pub/Sub 推送时间线事件，频道名即 `FeedBroadcast::channel`
#[derive(Clone)]
pub struct RedisFeedBroadcaster {
    conn: ConnectionManager,
}

impl RedisFeedBroadcaster {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl FeedBroadcaster for RedisFeedBroadcaster {
    async fn broadcast(&self, payload: FeedBroadcast) -> Result<(), BroadcastError> {
        let body = serde_json::to_string(&payload.event)
            .map_err(|err| BroadcastError::failed(err.to_string()))?;
        let mut conn = self.conn.clone();
        let receivers: u64 = redis::cmd("PUBLISH")
            .arg(&payload.channel)
            .arg(body)
            .query_async(&mut conn)
            .await
            .map_err(|err| BroadcastError::failed(err.to_string()))?;
        tracing::trace!(channel = %payload.channel, receivers, "feed event published");
        Ok(())
    }
}
