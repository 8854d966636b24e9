//! 基础设施层实现。
//!
//! Redis 上的时间线、在线状态、位置索引与推送，PostgreSQL 上的帖子与关系图，
//! 实现应用/领域层定义的接口。

pub mod builder;
pub mod postgres;
pub mod redis;

pub use builder::{Infrastructure, InfrastructureError};
pub use postgres::{create_pg_pool, PgPostRepository, PgSocialGraph};
pub use crate::redis::{
    RedisError, RedisFeedBroadcaster, RedisGeoIndex, RedisPresenceStore, RedisTimelineStore,
};
