use async_trait::async_trait;
use domain::{PostId, Score, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

/// 推送给在线客户端的时间线事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedEvent {
    NewPost {
        post_id: PostId,
        author_id: UserId,
        score: Score,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedBroadcast {
    pub channel: String,
    pub event: FeedEvent,
}

impl FeedBroadcast {
    /// 发给某个用户的频道 `user:{id}`
    pub fn to_user(user_id: UserId, event: FeedEvent) -> Self {
        Self {
            channel: format!("user:{}", user_id),
            event,
        }
    }
}

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("broadcast failed: {0}")]
    Failed(String),
}

impl BroadcastError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

#[async_trait]
pub trait FeedBroadcaster: Send + Sync {
    async fn broadcast(&self, payload: FeedBroadcast) -> Result<(), BroadcastError>;
}

/// 进程内广播器，单机部署与测试使用
#[derive(Clone)]
pub struct LocalFeedBroadcaster {
    sender: broadcast::Sender<FeedBroadcast>,
}

impl LocalFeedBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FeedBroadcast> {
        self.sender.subscribe()
    }
}

impl Default for LocalFeedBroadcaster {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[async_trait]
impl FeedBroadcaster for LocalFeedBroadcaster {
    async fn broadcast(&self, payload: FeedBroadcast) -> Result<(), BroadcastError> {
        // 没有订阅者时 send 返回错误，这不算失败
        if self.sender.receiver_count() == 0 {
            return Ok(());
        }
        self.sender
            .send(payload)
            .map_err(|err| BroadcastError::failed(err.to_string()))?;
        Ok(())
    }
}
