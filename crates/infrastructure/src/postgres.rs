//! 帖子记录与社交关系图的 PostgreSQL 适配器
//!
//! 表结构由帖子服务维护，这里只读。

use async_trait::async_trait;
use domain::{Post, PostId, PostRepository, RepositoryError, RepositoryResult, SocialGraph, UserId};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use time::PrimitiveDateTime;
use uuid::Uuid;

fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    RepositoryError::storage_with_source("postgres query failed", err)
}

#[derive(Debug, FromRow)]
struct PostRecord {
    id: Uuid,
    author_id: Uuid,
    content: String,
    created_at: PrimitiveDateTime,
}

impl From<PostRecord> for Post {
    fn from(value: PostRecord) -> Self {
        Post {
            id: PostId::from(value.id),
            author_id: UserId::from(value.author_id),
            content: value.content,
            // 列是不带时区的 TIMESTAMP，写入方按 UTC 存储
            created_at: value.created_at.assume_utc(),
        }
    }
}

#[derive(Clone)]
pub struct PgPostRepository {
    pool: PgPool,
}

impl PgPostRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PostRepository for PgPostRepository {
    async fn find_by_id(&self, id: PostId) -> RepositoryResult<Option<Post>> {
        let record = sqlx::query_as::<_, PostRecord>(
            "SELECT id, author_id, content, created_at FROM status_updates WHERE id = $1",
        )
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(record.map(Post::from))
    }

    async fn find_many(&self, ids: &[PostId]) -> RepositoryResult<Vec<Post>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = ids.iter().copied().map(Uuid::from).collect();
        let records = sqlx::query_as::<_, PostRecord>(
            "SELECT id, author_id, content, created_at FROM status_updates WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(records.into_iter().map(Post::from).collect())
    }
}

/// 关注者 = 指向作者且已接受的好友关系的发起方
#[derive(Clone)]
pub struct PgSocialGraph {
    pool: PgPool,
}

impl PgSocialGraph {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SocialGraph for PgSocialGraph {
    async fn follower_ids(&self, author_id: UserId) -> RepositoryResult<Vec<UserId>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT from_user_id FROM relationships \
             WHERE to_user_id = $1 AND type = 'FRIEND' AND status = 'ACCEPTED'",
        )
        .bind(Uuid::from(author_id))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(ids.into_iter().map(UserId::from).collect())
    }
}

pub async fn create_pg_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}
