use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use domain::{Post, PostId, PostRepository, Score, TimelineKey, UserId};

use crate::{
    clock::Clock,
    error::{with_timeout, ApplicationError, ApplicationResult},
    fanout::{FanoutDispatcher, FanoutJob},
    pagination::{paginate, Page, PageRequest},
    timeline::{ScoreRange, TimelineEntry, TimelineStore},
};

#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub default_page_size: usize,
    pub max_page_size: usize,
    pub global_timeline_cap: usize,
    pub read_timeout: Duration,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self::from(&config::FeedConfig::default())
    }
}

impl From<&config::FeedConfig> for FeedSettings {
    fn from(value: &config::FeedConfig) -> Self {
        Self {
            default_page_size: value.default_page_size,
            max_page_size: value.max_page_size,
            global_timeline_cap: value.global_timeline_cap,
            read_timeout: value.read_timeout(),
        }
    }
}

pub struct FeedServiceDependencies {
    pub timelines: Arc<dyn TimelineStore>,
    pub dispatcher: Arc<dyn FanoutDispatcher>,
    pub clock: Arc<dyn Clock>,
    /// 回查帖子内容，不需要 `feed_posts` 时可以省略
    pub posts: Option<Arc<dyn PostRepository>>,
    pub settings: FeedSettings,
}

/// Feed 用例：发布（入队写扩散）、分页读取、撤回与全局时间线裁剪。
///
/// 读路径从不返回错误：存储不可用或超时时返回空页。
pub struct FeedService {
    timelines: Arc<dyn TimelineStore>,
    dispatcher: Arc<dyn FanoutDispatcher>,
    clock: Arc<dyn Clock>,
    posts: Option<Arc<dyn PostRepository>>,
    settings: FeedSettings,
}

impl FeedService {
    pub fn new(deps: FeedServiceDependencies) -> Self {
        Self {
            timelines: deps.timelines,
            dispatcher: deps.dispatcher,
            clock: deps.clock,
            posts: deps.posts,
            settings: deps.settings,
        }
    }

    pub fn settings(&self) -> &FeedSettings {
        &self.settings
    }

    /// 以当前时间为分数，把写扩散任务交给后台
    pub async fn publish(
        &self,
        post_id: PostId,
        author_id: UserId,
        follower_ids: Vec<UserId>,
    ) -> ApplicationResult<FanoutJob> {
        self.dispatch(post_id, author_id, Some(follower_ids)).await
    }

    /// 关注者由后台 worker 通过社交关系图解析
    pub async fn publish_post(&self, post_id: PostId, author_id: UserId) -> ApplicationResult<FanoutJob> {
        self.dispatch(post_id, author_id, None).await
    }

    async fn dispatch(
        &self,
        post_id: PostId,
        author_id: UserId,
        follower_ids: Option<Vec<UserId>>,
    ) -> ApplicationResult<FanoutJob> {
        let job = FanoutJob {
            post_id,
            author_id,
            follower_ids,
            published_at: self.clock.epoch_seconds(),
        };
        self.dispatcher.enqueue(job.clone()).await?;
        tracing::debug!(
            post_id = %post_id,
            author_id = %author_id,
            score = job.published_at,
            "post queued for fan-out"
        );
        Ok(job)
    }

    /// 游标分页读取，条目带分数
    pub async fn feed_entries(&self, key: TimelineKey, request: &PageRequest) -> Page<TimelineEntry> {
        let limit = request
            .effective_limit(self.settings.default_page_size, self.settings.max_page_size);
        let range = ScoreRange::older_than(request.after());

        let fetched = match self.read(&key, range, 0, limit + 1).await {
            Some(entries) => entries,
            None => return Page::empty(),
        };
        paginate(fetched, limit, |entry| entry.score)
    }

    pub async fn feed(&self, key: TimelineKey, request: &PageRequest) -> Page<PostId> {
        self.feed_entries(key, request).await.map(|entry| entry.post_id)
    }

    /// 旧的页码分页接口，`page` 从 1 开始
    pub async fn feed_page_by_offset(&self, key: TimelineKey, page: usize, page_size: usize) -> Vec<PostId> {
        let page_size = page_size.clamp(1, self.settings.max_page_size.max(1));
        let offset = page.saturating_sub(1).saturating_mul(page_size);
        self.read(&key, ScoreRange::latest(), offset, page_size)
            .await
            .unwrap_or_default()
            .into_iter()
            .map(|entry| entry.post_id)
            .collect()
    }

    /// 读取一页并回查帖子内容，保持时间线顺序，已删除的帖子直接跳过
    pub async fn feed_posts(&self, key: TimelineKey, request: &PageRequest) -> Page<Post> {
        let page = self.feed(key, request).await;
        let Some(posts) = self.posts.as_ref() else {
            tracing::warn!("post repository not configured, returning empty page");
            return Page::empty();
        };
        if page.items.is_empty() {
            return page.with_items(Vec::new());
        }

        let found = with_timeout("feed.hydrate", self.settings.read_timeout, async {
            posts.find_many(&page.items).await.map_err(ApplicationError::from)
        })
        .await;
        let mut by_id: HashMap<PostId, Post> = match found {
            Ok(found) => found.into_iter().map(|post| (post.id, post)).collect(),
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "post hydration degraded to empty page");
                return Page::empty();
            }
        };

        let ordered: Vec<Post> = page.items.iter().filter_map(|id| by_id.remove(id)).collect();
        page.with_items(ordered)
    }

    /// 从全局时间线和给定关注者的时间线中移除帖子，返回实际删除的条数
    pub async fn retract(&self, post_id: PostId, follower_ids: &[UserId]) -> ApplicationResult<usize> {
        let mut removed = 0usize;
        let keys = std::iter::once(TimelineKey::Global)
            .chain(follower_ids.iter().copied().map(TimelineKey::for_user));
        for key in keys {
            if self.timelines.remove(&key, post_id).await? {
                removed += 1;
            }
        }
        tracing::info!(post_id = %post_id, removed, "post retracted from timelines");
        Ok(removed)
    }

    /// 把全局时间线裁剪到上限
    pub async fn trim_global(&self) -> ApplicationResult<u64> {
        self.timelines
            .trim_to_max_size(&TimelineKey::Global, self.settings.global_timeline_cap)
            .await
    }

    /// 帖子在某条时间线中的分数
    pub async fn score_of(&self, key: TimelineKey, post_id: PostId) -> ApplicationResult<Option<Score>> {
        self.timelines.score(&key, post_id).await
    }

    async fn read(
        &self,
        key: &TimelineKey,
        range: ScoreRange,
        offset: usize,
        count: usize,
    ) -> Option<Vec<TimelineEntry>> {
        let result = with_timeout(
            "feed.read",
            self.settings.read_timeout,
            self.timelines.range_by_score_desc(key, range, offset, count),
        )
        .await;
        match result {
            Ok(entries) => Some(entries),
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "feed read degraded to empty page");
                None
            }
        }
    }
}
