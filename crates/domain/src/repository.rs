//! 外部协作方接口
//!
//! 帖子的关系型存储与社交关系图不属于 feed 引擎，这里只定义引擎调用它们的契约。

use async_trait::async_trait;

use crate::errors::RepositoryResult;
use crate::post::Post;
use crate::value_objects::{PostId, UserId};

/// 帖子记录存储，按 ID 可达。
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait PostRepository: Send + Sync {
    async fn find_by_id(&self, id: PostId) -> RepositoryResult<Option<Post>>;

    /// 批量回查，不保证返回顺序，缺失的 ID 直接省略
    async fn find_many(&self, ids: &[PostId]) -> RepositoryResult<Vec<Post>>;
}

/// 社交关系图
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait SocialGraph: Send + Sync {
    /// 关注（已接受好友关系指向）该作者的用户
    async fn follower_ids(&self, author_id: UserId) -> RepositoryResult<Vec<UserId>>;
}
