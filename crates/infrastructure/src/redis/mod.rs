//! Redis 适配器
//!
//! 时间线（ZSET）、在线状态（ZSET + 带 TTL 的状态键）、位置索引（GEO）和 Pub/Sub 推送。
//! 所有适配器共享一个 `ConnectionManager`，断线后自动重连。

pub mod broadcaster;
pub mod error;
pub mod geo;
pub mod presence;
pub mod timeline;

pub use broadcaster::RedisFeedBroadcaster;
pub use error::{RedisError, RedisResult};
pub use geo::RedisGeoIndex;
pub use presence::RedisPresenceStore;
pub use timeline::RedisTimelineStore;

/// 建立带自动重连的连接
pub async fn connect(url: &str) -> RedisResult<redis::aio::ConnectionManager> {
    let client = redis::Client::open(url)?;
    let manager = redis::aio::ConnectionManager::new(client).await?;
    tracing::info!("redis connection manager ready");
    Ok(manager)
}
