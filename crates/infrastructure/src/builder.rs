use std::sync::Arc;

use application::{FeedBroadcaster, GeoIndex, PresenceStore, TimelineStore};
use config::AppConfig;
use domain::{PostRepository, SocialGraph};
use thiserror::Error;

use crate::{
    postgres::{create_pg_pool, PgPostRepository, PgSocialGraph},
    redis::{
        self as redis_adapters, RedisError, RedisFeedBroadcaster, RedisGeoIndex, RedisPresenceStore,
        RedisTimelineStore,
    },
};

#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("redis error: {0}")]
    Redis(#[from] RedisError),
}

/// 连接好的全部适配器
#[derive(Clone)]
pub struct Infrastructure {
    pub timelines: Arc<RedisTimelineStore>,
    pub presence: Arc<RedisPresenceStore>,
    pub geo: Arc<RedisGeoIndex>,
    pub broadcaster: Arc<RedisFeedBroadcaster>,
    pub posts: Arc<PgPostRepository>,
    pub social_graph: Arc<PgSocialGraph>,
}

impl Infrastructure {
    pub async fn connect(config: &AppConfig) -> Result<Self, InfrastructureError> {
        let conn = redis_adapters::connect(&config.redis.url).await?;
        let pool = create_pg_pool(&config.database.url, config.database.max_connections).await?;
        tracing::info!(
            max_connections = config.database.max_connections,
            "postgres pool ready"
        );

        Ok(Self {
            timelines: Arc::new(RedisTimelineStore::new(conn.clone())),
            presence: Arc::new(RedisPresenceStore::new(conn.clone())),
            geo: Arc::new(RedisGeoIndex::new(conn.clone())),
            broadcaster: Arc::new(RedisFeedBroadcaster::new(conn)),
            posts: Arc::new(PgPostRepository::new(pool.clone())),
            social_graph: Arc::new(PgSocialGraph::new(pool)),
        })
    }
}

impl Infrastructure {
    pub fn timeline_store(&self) -> Arc<dyn TimelineStore> {
        self.timelines.clone()
    }

    pub fn presence_store(&self) -> Arc<dyn PresenceStore> {
        self.presence.clone()
    }

    pub fn geo_index(&self) -> Arc<dyn GeoIndex> {
        self.geo.clone()
    }

    pub fn feed_broadcaster(&self) -> Arc<dyn FeedBroadcaster> {
        self.broadcaster.clone()
    }

    pub fn post_repository(&self) -> Arc<dyn PostRepository> {
        self.posts.clone()
    }

    pub fn social_graph(&self) -> Arc<dyn SocialGraph> {
        self.social_graph.clone()
    }
}
