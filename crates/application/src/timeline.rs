use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ApplicationResult;
use domain::{PostId, Score, TimelineKey};

/// 时间线中的一条记录
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub post_id: PostId,
    pub score: Score,
}

/// 分数区间的一端
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreBound {
    Inclusive(Score),
    Exclusive(Score),
    Unbounded,
}

impl ScoreBound {
    fn admits_below(&self, score: Score) -> bool {
        match *self {
            ScoreBound::Inclusive(max) => score <= max,
            ScoreBound::Exclusive(max) => score < max,
            ScoreBound::Unbounded => true,
        }
    }

    fn admits_above(&self, score: Score) -> bool {
        match *self {
            ScoreBound::Inclusive(min) => score >= min,
            ScoreBound::Exclusive(min) => score > min,
            ScoreBound::Unbounded => true,
        }
    }
}

/// 倒序范围查询的分数区间，默认 `(-inf, +inf)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreRange {
    pub max: ScoreBound,
    pub min: ScoreBound,
}

impl ScoreRange {
    /// 从最新开始
    pub fn latest() -> Self {
        Self {
            max: ScoreBound::Unbounded,
            min: ScoreBound::Unbounded,
        }
    }

    /// 严格早于游标值，游标分页使用
    pub fn older_than(score: Option<Score>) -> Self {
        Self {
            max: score.map_or(ScoreBound::Unbounded, ScoreBound::Exclusive),
            min: ScoreBound::Unbounded,
        }
    }

    /// `(min, max]`
    pub fn between(max: Option<Score>, min: Option<Score>) -> Self {
        Self {
            max: max.map_or(ScoreBound::Unbounded, ScoreBound::Inclusive),
            min: min.map_or(ScoreBound::Unbounded, ScoreBound::Exclusive),
        }
    }

    pub fn contains(&self, score: Score) -> bool {
        self.max.admits_below(score) && self.min.admits_above(score)
    }
}

impl Default for ScoreRange {
    fn default() -> Self {
        Self::latest()
    }
}

/// 按分数排序的时间线存储。
///
/// 同一个键内 `post_id` 唯一，重复写入只会覆盖分数。读取按分数降序，
/// 分数相同时按 `post_id` 降序。所有操作都是一次存储往返，
/// 实现不得在调用期间持有进程内锁跨越 I/O。
#[async_trait]
pub trait TimelineStore: Send + Sync {
    /// 插入或更新一条记录（幂等）
    async fn add(&self, key: &TimelineKey, post_id: PostId, score: Score) -> ApplicationResult<()>;

    /// 返回分数落在区间内的记录，从 `offset` 开始最多 `count` 条，分数高的在前
    async fn range_by_score_desc(
        &self,
        key: &TimelineKey,
        range: ScoreRange,
        offset: usize,
        count: usize,
    ) -> ApplicationResult<Vec<TimelineEntry>>;

    /// 只保留分数最高的 `max_size` 条，返回删除的条数
    async fn trim_to_max_size(&self, key: &TimelineKey, max_size: usize) -> ApplicationResult<u64>;

    /// 删除一条记录，返回它之前是否存在
    async fn remove(&self, key: &TimelineKey, post_id: PostId) -> ApplicationResult<bool>;

    async fn len(&self, key: &TimelineKey) -> ApplicationResult<u64>;

    async fn score(&self, key: &TimelineKey, post_id: PostId) -> ApplicationResult<Option<Score>>;

    /// 写入后立即裁剪。两步之间不是事务，并发写同一个键时长度可能短暂超过上限。
    async fn add_bounded(
        &self,
        key: &TimelineKey,
        post_id: PostId,
        score: Score,
        max_size: usize,
    ) -> ApplicationResult<()> {
        self.add(key, post_id, score).await?;
        self.trim_to_max_size(key, max_size).await?;
        Ok(())
    }
}

/// 内存实现的时间线存储（用于测试与单机开发）
pub mod memory {
    use super::*;
    use crate::error::ApplicationError;
    use std::collections::{BTreeSet, HashMap};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::RwLock;

    #[derive(Default)]
    struct Timeline {
        scores: HashMap<PostId, Score>,
        /// 升序；倒序遍历即得到 (分数降序, post_id 降序)
        ordered: BTreeSet<(Score, PostId)>,
    }

    impl Timeline {
        fn upsert(&mut self, post_id: PostId, score: Score) {
            if let Some(previous) = self.scores.insert(post_id, score) {
                self.ordered.remove(&(previous, post_id));
            }
            self.ordered.insert((score, post_id));
        }

        fn remove(&mut self, post_id: PostId) -> bool {
            match self.scores.remove(&post_id) {
                Some(score) => {
                    self.ordered.remove(&(score, post_id));
                    true
                }
                None => false,
            }
        }

        fn trim(&mut self, max_size: usize) -> u64 {
            let excess = self.ordered.len().saturating_sub(max_size);
            let doomed: Vec<(Score, PostId)> = self.ordered.iter().take(excess).copied().collect();
            for (score, post_id) in &doomed {
                self.ordered.remove(&(*score, *post_id));
                self.scores.remove(post_id);
            }
            doomed.len() as u64
        }
    }

    pub struct MemoryTimelineStore {
        timelines: RwLock<HashMap<TimelineKey, Timeline>>,
        available: AtomicBool,
    }

    impl Default for MemoryTimelineStore {
        fn default() -> Self {
            Self::new()
        }
    }

    impl MemoryTimelineStore {
        pub fn new() -> Self {
            Self {
                timelines: RwLock::new(HashMap::new()),
                available: AtomicBool::new(true),
            }
        }

        /// 模拟存储宕机：不可用时所有操作返回基础设施错误
        pub fn set_available(&self, available: bool) {
            self.available.store(available, Ordering::SeqCst);
        }

        fn ensure_available(&self) -> ApplicationResult<()> {
            if self.available.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(ApplicationError::infrastructure("timeline store unavailable"))
            }
        }

        fn poisoned() -> ApplicationError {
            ApplicationError::infrastructure("timeline store lock poisoned")
        }
    }

    #[async_trait]
    impl TimelineStore for MemoryTimelineStore {
        async fn add(&self, key: &TimelineKey, post_id: PostId, score: Score) -> ApplicationResult<()> {
            self.ensure_available()?;
            let mut timelines = self.timelines.write().map_err(|_| Self::poisoned())?;
            timelines.entry(*key).or_default().upsert(post_id, score);
            Ok(())
        }

        async fn range_by_score_desc(
            &self,
            key: &TimelineKey,
            range: ScoreRange,
            offset: usize,
            count: usize,
        ) -> ApplicationResult<Vec<TimelineEntry>> {
            self.ensure_available()?;
            let timelines = self.timelines.read().map_err(|_| Self::poisoned())?;
            let Some(timeline) = timelines.get(key) else {
                return Ok(Vec::new());
            };
            Ok(timeline
                .ordered
                .iter()
                .rev()
                .filter(|(score, _)| range.contains(*score))
                .skip(offset)
                .take(count)
                .map(|(score, post_id)| TimelineEntry {
                    post_id: *post_id,
                    score: *score,
                })
                .collect())
        }

        async fn trim_to_max_size(&self, key: &TimelineKey, max_size: usize) -> ApplicationResult<u64> {
            self.ensure_available()?;
            let mut timelines = self.timelines.write().map_err(|_| Self::poisoned())?;
            Ok(timelines
                .get_mut(key)
                .map(|timeline| timeline.trim(max_size))
                .unwrap_or(0))
        }

        async fn remove(&self, key: &TimelineKey, post_id: PostId) -> ApplicationResult<bool> {
            self.ensure_available()?;
            let mut timelines = self.timelines.write().map_err(|_| Self::poisoned())?;
            Ok(timelines
                .get_mut(key)
                .map(|timeline| timeline.remove(post_id))
                .unwrap_or(false))
        }

        async fn len(&self, key: &TimelineKey) -> ApplicationResult<u64> {
            self.ensure_available()?;
            let timelines = self.timelines.read().map_err(|_| Self::poisoned())?;
            Ok(timelines
                .get(key)
                .map(|timeline| timeline.scores.len() as u64)
                .unwrap_or(0))
        }

        async fn score(&self, key: &TimelineKey, post_id: PostId) -> ApplicationResult<Option<Score>> {
            self.ensure_available()?;
            let timelines = self.timelines.read().map_err(|_| Self::poisoned())?;
            Ok(timelines
                .get(key)
                .and_then(|timeline| timeline.scores.get(&post_id).copied()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryTimelineStore;
    use super::*;
    use domain::UserId;
    use uuid::Uuid;

    fn post() -> PostId {
        PostId::from(Uuid::new_v4())
    }

    fn user_key() -> TimelineKey {
        TimelineKey::for_user(UserId::from(Uuid::new_v4()))
    }

    #[tokio::test]
    async fn add_is_idempotent() {
        let store = MemoryTimelineStore::new();
        let key = user_key();
        let id = post();

        store.add(&key, id, 1_000).await.unwrap();
        store.add(&key, id, 1_000).await.unwrap();

        assert_eq!(store.len(&key).await.unwrap(), 1);
        assert_eq!(store.score(&key, id).await.unwrap(), Some(1_000));
    }

    #[tokio::test]
    async fn re_adding_overwrites_score() {
        let store = MemoryTimelineStore::new();
        let key = TimelineKey::Global;
        let id = post();

        store.add(&key, id, 1_000).await.unwrap();
        store.add(&key, id, 2_000).await.unwrap();

        assert_eq!(store.len(&key).await.unwrap(), 1);
        let entries = store
            .range_by_score_desc(&key, ScoreRange::latest(), 0, 10)
            .await
            .unwrap();
        assert_eq!(entries, vec![TimelineEntry { post_id: id, score: 2_000 }]);
    }

    #[tokio::test]
    async fn range_is_descending_with_bounds() {
        let store = MemoryTimelineStore::new();
        let key = user_key();
        let ids: Vec<PostId> = (0..5).map(|_| post()).collect();
        for (i, id) in ids.iter().enumerate() {
            store.add(&key, *id, 100 + i as i64).await.unwrap();
        }

        let all = store
            .range_by_score_desc(&key, ScoreRange::latest(), 0, 10)
            .await
            .unwrap();
        let scores: Vec<i64> = all.iter().map(|e| e.score).collect();
        assert_eq!(scores, vec![104, 103, 102, 101, 100]);

        // (101, 103]
        let window = store
            .range_by_score_desc(&key, ScoreRange::between(Some(103), Some(101)), 0, 10)
            .await
            .unwrap();
        let scores: Vec<i64> = window.iter().map(|e| e.score).collect();
        assert_eq!(scores, vec![103, 102]);

        let older = store
            .range_by_score_desc(&key, ScoreRange::older_than(Some(103)), 1, 2)
            .await
            .unwrap();
        let scores: Vec<i64> = older.iter().map(|e| e.score).collect();
        assert_eq!(scores, vec![101, 100]);
    }

    #[tokio::test]
    async fn equal_scores_are_ordered_by_post_id_descending() {
        let store = MemoryTimelineStore::new();
        let key = TimelineKey::Global;
        let mut ids: Vec<PostId> = (0..6).map(|_| post()).collect();
        for id in &ids {
            store.add(&key, *id, 42).await.unwrap();
        }
        ids.sort_by(|a, b| b.cmp(a));

        let entries = store
            .range_by_score_desc(&key, ScoreRange::latest(), 0, 10)
            .await
            .unwrap();
        let got: Vec<PostId> = entries.iter().map(|e| e.post_id).collect();
        assert_eq!(got, ids);
    }

    #[tokio::test]
    async fn trim_keeps_highest_scores() {
        let store = MemoryTimelineStore::new();
        let key = user_key();
        // 乱序写入 1200 条
        let mut scores: Vec<i64> = (0..1_200).map(|i| (i * 7_919) % 1_200).collect();
        scores.dedup();
        for score in &scores {
            store.add(&key, post(), *score).await.unwrap();
        }

        let removed = store.trim_to_max_size(&key, 500).await.unwrap();
        assert_eq!(removed, 700);
        assert_eq!(store.len(&key).await.unwrap(), 500);

        let kept = store
            .range_by_score_desc(&key, ScoreRange::latest(), 0, 1_000)
            .await
            .unwrap();
        let min_kept = kept.iter().map(|e| e.score).min().unwrap();
        assert_eq!(min_kept, 700);
        assert_eq!(kept.first().map(|e| e.score), Some(1_199));
    }

    #[tokio::test]
    async fn trim_below_size_is_noop() {
        let store = MemoryTimelineStore::new();
        let key = user_key();
        store.add(&key, post(), 1).await.unwrap();
        assert_eq!(store.trim_to_max_size(&key, 500).await.unwrap(), 0);
        assert_eq!(store.trim_to_max_size(&user_key(), 500).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn add_bounded_enforces_cap() {
        let store = MemoryTimelineStore::new();
        let key = user_key();
        for score in 0..10 {
            store.add_bounded(&key, post(), score, 3).await.unwrap();
        }
        let kept = store
            .range_by_score_desc(&key, ScoreRange::latest(), 0, 10)
            .await
            .unwrap();
        let scores: Vec<i64> = kept.iter().map(|e| e.score).collect();
        assert_eq!(scores, vec![9, 8, 7]);
    }

    #[tokio::test]
    async fn remove_and_unavailable() {
        let store = MemoryTimelineStore::new();
        let key = TimelineKey::Global;
        let id = post();
        store.add(&key, id, 5).await.unwrap();
        assert!(store.remove(&key, id).await.unwrap());
        assert!(!store.remove(&key, id).await.unwrap());

        store.set_available(false);
        let err = store.add(&key, id, 5).await.unwrap_err();
        assert!(err.is_transient());
    }
}
