//! 写扩散（fan-out-on-write）
//!
//! 发布请求只把 [`FanoutJob`] 放进队列，后台 [`FanoutWorkerPool`] 消费队列并调用
//! [`FanoutEngine::execute`]：写全局时间线，再并发写每个关注者的个人时间线。
//! 分数在入队时确定，重试或重复投递只会写入相同的分数。

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::broadcaster::{FeedBroadcast, FeedBroadcaster, FeedEvent};
use crate::error::{with_timeout, ApplicationError, ApplicationResult};
use crate::retry::{retry_async, RetryConfig};
use crate::timeline::TimelineStore;
use domain::{PostId, Score, SocialGraph, TimelineKey, UserId};

/// 一次写扩散任务
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanoutJob {
    pub post_id: PostId,
    pub author_id: UserId,
    /// 为空时由 worker 通过社交关系图解析
    pub follower_ids: Option<Vec<UserId>>,
    pub published_at: Score,
}

/// 任务执行结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanoutReport {
    pub post_id: PostId,
    pub global_written: bool,
    pub delivered: usize,
    pub failed: Vec<UserId>,
}

impl FanoutReport {
    pub fn is_complete(&self) -> bool {
        self.global_written && self.failed.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct FanoutSettings {
    pub follower_timeline_cap: usize,
    pub follower_concurrency: usize,
    pub write_timeout: Duration,
    pub retry: RetryConfig,
    pub broadcast_new_posts: bool,
}

impl FanoutSettings {
    pub fn from_config(feed: &config::FeedConfig, fanout: &config::FanoutConfig) -> Self {
        Self {
            follower_timeline_cap: feed.follower_timeline_cap,
            follower_concurrency: fanout.follower_concurrency.max(1),
            write_timeout: fanout.write_timeout(),
            retry: RetryConfig::from(fanout),
            broadcast_new_posts: fanout.broadcast_new_posts,
        }
    }
}

impl Default for FanoutSettings {
    fn default() -> Self {
        Self::from_config(&config::FeedConfig::default(), &config::FanoutConfig::default())
    }
}

pub struct FanoutEngine {
    timelines: Arc<dyn TimelineStore>,
    social_graph: Option<Arc<dyn SocialGraph>>,
    broadcaster: Option<Arc<dyn FeedBroadcaster>>,
    settings: FanoutSettings,
}

impl FanoutEngine {
    pub fn new(timelines: Arc<dyn TimelineStore>, settings: FanoutSettings) -> Self {
        Self {
            timelines,
            social_graph: None,
            broadcaster: None,
            settings,
        }
    }

    pub fn with_social_graph(mut self, social_graph: Arc<dyn SocialGraph>) -> Self {
        self.social_graph = Some(social_graph);
        self
    }

    pub fn with_broadcaster(mut self, broadcaster: Arc<dyn FeedBroadcaster>) -> Self {
        self.broadcaster = Some(broadcaster);
        self
    }

    /// 执行一次写扩散。
    ///
    /// 单个关注者写失败（重试用尽）只记录在报告里，不影响其他关注者；
    /// 只有关注者解析失败才返回错误。
    pub async fn execute(&self, job: FanoutJob) -> ApplicationResult<FanoutReport> {
        let global_written = match self
            .write_with_retry(TimelineKey::Global, job.post_id, job.published_at, None)
            .await
        {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(
                    post_id = %job.post_id,
                    error = %err,
                    "global timeline write failed after retries"
                );
                false
            }
        };

        let followers = match job.follower_ids.clone() {
            Some(ids) => ids,
            None => self.resolve_followers(job.author_id).await?,
        };
        let followers = dedupe(followers);

        let (post_id, score) = (job.post_id, job.published_at);
        let cap = Some(self.settings.follower_timeline_cap);
        let concurrency = self.settings.follower_concurrency;
        let results: Vec<(UserId, ApplicationResult<()>)> = stream::iter(followers)
            .map(move |follower| async move {
                let result = self
                    .write_with_retry(TimelineKey::for_user(follower), post_id, score, cap)
                    .await;
                (follower, result)
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut delivered = Vec::with_capacity(results.len());
        let mut failed = Vec::new();
        for (follower, result) in results {
            match result {
                Ok(()) => delivered.push(follower),
                Err(err) => {
                    tracing::error!(
                        post_id = %job.post_id,
                        follower_id = %follower,
                        error = %err,
                        "follower timeline write failed after retries"
                    );
                    failed.push(follower);
                }
            }
        }

        self.notify(&job, &delivered).await;

        let report = FanoutReport {
            post_id: job.post_id,
            global_written,
            delivered: delivered.len(),
            failed,
        };
        tracing::info!(
            post_id = %job.post_id,
            author_id = %job.author_id,
            followers = report.delivered + report.failed.len(),
            delivered = report.delivered,
            failed = report.failed.len(),
            "fan-out finished"
        );
        Ok(report)
    }

    async fn resolve_followers(&self, author_id: UserId) -> ApplicationResult<Vec<UserId>> {
        let Some(social_graph) = self.social_graph.as_ref() else {
            return Err(ApplicationError::Dispatch(
                "follower list missing and no social graph configured".to_string(),
            ));
        };
        retry_async(&self.settings.retry, ApplicationError::is_transient, || async move {
            social_graph
                .follower_ids(author_id)
                .await
                .map_err(ApplicationError::from)
        })
        .await
        .map_err(|err| {
            tracing::error!(author_id = %author_id, error = %err, "follower resolution failed");
            err
        })
    }

    async fn write_with_retry(
        &self,
        key: TimelineKey,
        post_id: PostId,
        score: Score,
        cap: Option<usize>,
    ) -> ApplicationResult<()> {
        let key = &key;
        retry_async(&self.settings.retry, ApplicationError::is_transient, || async move {
            let write = async {
                match cap {
                    Some(max_size) => self.timelines.add_bounded(key, post_id, score, max_size).await,
                    None => self.timelines.add(key, post_id, score).await,
                }
            };
            with_timeout("fanout.write", self.settings.write_timeout, write).await
        })
        .await
    }

    async fn notify(&self, job: &FanoutJob, delivered: &[UserId]) {
        if !self.settings.broadcast_new_posts {
            return;
        }
        let Some(broadcaster) = self.broadcaster.as_ref() else {
            return;
        };
        let event = FeedEvent::NewPost {
            post_id: job.post_id,
            author_id: job.author_id,
            score: job.published_at,
        };
        for follower in delivered {
            if let Err(err) = broadcaster
                .broadcast(FeedBroadcast::to_user(*follower, event.clone()))
                .await
            {
                tracing::warn!(follower_id = %follower, error = %err, "new post notification failed");
            }
        }
    }
}

fn dedupe(ids: Vec<UserId>) -> Vec<UserId> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

/// 任务派发器：至少一次投递，不保证任务间顺序
#[async_trait]
pub trait FanoutDispatcher: Send + Sync {
    async fn enqueue(&self, job: FanoutJob) -> ApplicationResult<()>;
}

/// 基于有界 mpsc 通道的派发器
///
/// 队列满时最多等待 `enqueue_timeout`，超时返回 `Dispatch` 错误，发布请求不会无限期挂起。
#[derive(Clone)]
pub struct ChannelFanoutDispatcher {
    sender: mpsc::Sender<FanoutJob>,
    enqueue_timeout: Duration,
}

impl ChannelFanoutDispatcher {
    pub fn new(sender: mpsc::Sender<FanoutJob>) -> Self {
        Self {
            sender,
            enqueue_timeout: config::FanoutConfig::default().enqueue_timeout(),
        }
    }

    pub fn with_enqueue_timeout(mut self, enqueue_timeout: Duration) -> Self {
        self.enqueue_timeout = enqueue_timeout;
        self
    }
}

#[async_trait]
impl FanoutDispatcher for ChannelFanoutDispatcher {
    async fn enqueue(&self, job: FanoutJob) -> ApplicationResult<()> {
        let post_id = job.post_id;
        match self.sender.send_timeout(job, self.enqueue_timeout).await {
            Ok(()) => {
                tracing::debug!(post_id = %post_id, "fan-out job queued");
                Ok(())
            }
            Err(SendTimeoutError::Timeout(_)) => {
                tracing::warn!(
                    post_id = %post_id,
                    timeout_ms = self.enqueue_timeout.as_millis() as u64,
                    "fan-out queue full, publish rejected"
                );
                Err(ApplicationError::Dispatch("fan-out queue full".to_string()))
            }
            Err(SendTimeoutError::Closed(_)) => {
                Err(ApplicationError::Dispatch("fan-out queue closed".to_string()))
            }
        }
    }
}

/// 创建派发器和对应的队列接收端
pub fn fanout_channel(capacity: usize) -> (ChannelFanoutDispatcher, mpsc::Receiver<FanoutJob>) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (ChannelFanoutDispatcher::new(sender), receiver)
}

/// 后台 worker 池
///
/// 同时执行的任务数由信号量限制。取消后停止接收新任务，
/// 把队列里剩余的任务执行完再退出。
pub struct FanoutWorkerPool {
    handle: JoinHandle<()>,
    shutdown: CancellationToken,
}

impl FanoutWorkerPool {
    pub fn spawn(
        engine: Arc<FanoutEngine>,
        mut queue: mpsc::Receiver<FanoutJob>,
        workers: usize,
        shutdown: CancellationToken,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(workers.max(1)));
        let token = shutdown.clone();

        let handle = tokio::spawn(async move {
            tracing::info!(workers, "fan-out worker pool started");
            let mut running = JoinSet::new();

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    Some(_) = running.join_next(), if !running.is_empty() => {}
                    job = queue.recv() => match job {
                        Some(job) => launch(&engine, &permits, &mut running, job).await,
                        None => break,
                    },
                }
            }

            queue.close();
            let mut drained = 0usize;
            while let Some(job) = queue.recv().await {
                drained += 1;
                launch(&engine, &permits, &mut running, job).await;
            }
            while running.join_next().await.is_some() {}
            tracing::info!(drained, "fan-out worker pool stopped");
        });

        Self { handle, shutdown }
    }

    /// 停止接收并等待队列排空
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(err) = self.handle.await {
            tracing::error!(error = %err, "fan-out worker pool panicked");
        }
    }
}

async fn launch(
    engine: &Arc<FanoutEngine>,
    permits: &Arc<Semaphore>,
    running: &mut JoinSet<()>,
    job: FanoutJob,
) {
    let permit = match permits.clone().acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => {
            tracing::error!(post_id = %job.post_id, "worker semaphore closed, job dropped");
            return;
        }
    };
    let engine = Arc::clone(engine);
    running.spawn(async move {
        let _permit = permit;
        let post_id = job.post_id;
        if let Err(err) = engine.execute(job).await {
            tracing::error!(post_id = %post_id, error = %err, "fan-out job failed");
        }
    });
}
