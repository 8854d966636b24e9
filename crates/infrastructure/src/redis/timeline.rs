//! 基于 Redis 有序集合的时间线存储
//!
//! 每个时间线键一个 ZSET，成员是帖子 ID，分数是发布时间（秒）。
//! 分数相同时 ZREVRANGEBYSCORE 按成员字典序倒序返回，与 `PostId` 的降序一致。

use application::{ApplicationResult, ScoreBound, ScoreRange, TimelineEntry, TimelineStore};
use async_trait::async_trait;
use domain::{PostId, Score, TimelineKey};
use redis::aio::ConnectionManager;

use super::error::{score_to_i64, RedisError, RedisResult};

#[derive(Clone)]
pub struct RedisTimelineStore {
    conn: ConnectionManager,
}

impl RedisTimelineStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    fn max_arg(bound: ScoreBound) -> String {
        match bound {
            ScoreBound::Inclusive(v) => v.to_string(),
            ScoreBound::Exclusive(v) => format!("({v}"),
            ScoreBound::Unbounded => "+inf".to_string(),
        }
    }

    fn min_arg(bound: ScoreBound) -> String {
        match bound {
            ScoreBound::Inclusive(v) => v.to_string(),
            ScoreBound::Exclusive(v) => format!("({v}"),
            ScoreBound::Unbounded => "-inf".to_string(),
        }
    }

    fn parse_entries(key: &str, raw: Vec<(String, f64)>) -> RedisResult<Vec<TimelineEntry>> {
        raw.into_iter()
            .map(|(member, score)| {
                let post_id = member
                    .parse::<PostId>()
                    .map_err(|err| RedisError::invalid_data(key, err.to_string()))?;
                Ok(TimelineEntry {
                    post_id,
                    score: score_to_i64(key, score)?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl TimelineStore for RedisTimelineStore {
    async fn add(&self, key: &TimelineKey, post_id: PostId, score: Score) -> ApplicationResult<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("ZADD")
            .arg(key.storage_key())
            .arg(score)
            .arg(post_id.to_string())
            .query_async(&mut conn)
            .await
            .map_err(RedisError::from)?;
        tracing::debug!(key = %key, post_id = %post_id, score, "timeline entry written");
        Ok(())
    }

    async fn range_by_score_desc(
        &self,
        key: &TimelineKey,
        range: ScoreRange,
        offset: usize,
        count: usize,
    ) -> ApplicationResult<Vec<TimelineEntry>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let storage_key = key.storage_key();
        let mut conn = self.conn.clone();
        let raw: Vec<(String, f64)> = redis::cmd("ZREVRANGEBYSCORE")
            .arg(&storage_key)
            .arg(Self::max_arg(range.max))
            .arg(Self::min_arg(range.min))
            .arg("WITHSCORES")
            .arg("LIMIT")
            .arg(offset)
            .arg(count)
            .query_async(&mut conn)
            .await
            .map_err(RedisError::from)?;
        Ok(Self::parse_entries(&storage_key, raw)?)
    }

    async fn trim_to_max_size(&self, key: &TimelineKey, max_size: usize) -> ApplicationResult<u64> {
        let stop = -(max_size as i64) - 1;
        let mut conn = self.conn.clone();
        let removed: u64 = redis::cmd("ZREMRANGEBYRANK")
            .arg(key.storage_key())
            .arg(0)
            .arg(stop)
            .query_async(&mut conn)
            .await
            .map_err(RedisError::from)?;
        if removed > 0 {
            tracing::debug!(key = %key, removed, max_size, "timeline trimmed");
        }
        Ok(removed)
    }

    async fn remove(&self, key: &TimelineKey, post_id: PostId) -> ApplicationResult<bool> {
        let mut conn = self.conn.clone();
        let removed: u64 = redis::cmd("ZREM")
            .arg(key.storage_key())
            .arg(post_id.to_string())
            .query_async(&mut conn)
            .await
            .map_err(RedisError::from)?;
        Ok(removed > 0)
    }

    async fn len(&self, key: &TimelineKey) -> ApplicationResult<u64> {
        let mut conn = self.conn.clone();
        let len: u64 = redis::cmd("ZCARD")
            .arg(key.storage_key())
            .query_async(&mut conn)
            .await
            .map_err(RedisError::from)?;
        Ok(len)
    }

    async fn score(&self, key: &TimelineKey, post_id: PostId) -> ApplicationResult<Option<Score>> {
        let storage_key = key.storage_key();
        let mut conn = self.conn.clone();
        let score: Option<f64> = redis::cmd("ZSCORE")
            .arg(&storage_key)
            .arg(post_id.to_string())
            .query_async(&mut conn)
            .await
            .map_err(RedisError::from)?;
        Ok(score
            .map(|score| score_to_i64(&storage_key, score))
            .transpose()?)
    }

    /// 写入和裁剪放进同一个 MULTI 事务
    async fn add_bounded(
        &self,
        key: &TimelineKey,
        post_id: PostId,
        score: Score,
        max_size: usize,
    ) -> ApplicationResult<()> {
        let storage_key = key.storage_key();
        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .cmd("ZADD")
            .arg(&storage_key)
            .arg(score)
            .arg(post_id.to_string())
            .ignore()
            .cmd("ZREMRANGEBYRANK")
            .arg(&storage_key)
            .arg(0)
            .arg(-(max_size as i64) - 1)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(RedisError::from)?;
        Ok(())
    }
}
