use application::{ApplicationResult, PresenceStore};
use async_trait::async_trait;
use domain::UserId;
use redis::aio::ConnectionManager;

use super::error::{score_to_i64, RedisError};

/// 最后活跃时间：ZSET，成员为用户 ID，分数为秒级时间戳
pub const PRESENCE_KEY: &str = "presence:online";

/// Redis 实现的在线状态存储
///
/// 状态标签单独存成带 TTL 的字符串键，过期交给 Redis。
#[derive(Clone)]
pub struct RedisPresenceStore {
    conn: ConnectionManager,
}

impl RedisPresenceStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    fn status_key(user_id: UserId) -> String {
        format!("presence:status:{}", user_id)
    }
}

#[async_trait]
impl PresenceStore for RedisPresenceStore {
    async fn record_seen(
        &self,
        user_id: UserId,
        seen_at: i64,
        status: &str,
        status_ttl_secs: u64,
    ) -> ApplicationResult<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .cmd("ZADD")
            .arg(PRESENCE_KEY)
            .arg(seen_at)
            .arg(user_id.to_string())
            .ignore()
            .cmd("SETEX")
            .arg(Self::status_key(user_id))
            .arg(status_ttl_secs.max(1))
            .arg(status)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(RedisError::from)?;
        Ok(())
    }

    async fn last_seen(&self, user_id: UserId) -> ApplicationResult<Option<i64>> {
        let mut conn = self.conn.clone();
        let score: Option<f64> = redis::cmd("ZSCORE")
            .arg(PRESENCE_KEY)
            .arg(user_id.to_string())
            .query_async(&mut conn)
            .await
            .map_err(RedisError::from)?;
        Ok(score.map(|s| score_to_i64(PRESENCE_KEY, s)).transpose()?)
    }

    async fn seen_since(&self, cutoff: i64) -> ApplicationResult<Vec<UserId>> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(PRESENCE_KEY)
            .arg(cutoff)
            .arg("+inf")
            .query_async(&mut conn)
            .await
            .map_err(RedisError::from)?;

        Ok(members
            .into_iter()
            .filter_map(|member| match member.parse::<UserId>() {
                Ok(user_id) => Some(user_id),
                Err(_) => {
                    tracing::warn!(member = %member, "skipping malformed presence member");
                    None
                }
            })
            .collect())
    }

    async fn status(&self, user_id: UserId, _now: i64) -> ApplicationResult<Option<String>> {
        let mut conn = self.conn.clone();
        let status: Option<String> = redis::cmd("GET")
            .arg(Self::status_key(user_id))
            .query_async(&mut conn)
            .await
            .map_err(RedisError::from)?;
        Ok(status)
    }

    async fn remove_seen_before(&self, cutoff: i64) -> ApplicationResult<u64> {
        let mut conn = self.conn.clone();
        let removed: u64 = redis::cmd("ZREMRANGEBYSCORE")
            .arg(PRESENCE_KEY)
            .arg("-inf")
            .arg(cutoff)
            .query_async(&mut conn)
            .await
            .map_err(RedisError::from)?;
        Ok(removed)
    }
}
