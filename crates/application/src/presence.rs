use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::clock::Clock;
use crate::error::{with_timeout, ApplicationResult};
use domain::UserId;

/// 在线状态存储trait
///
/// 每个用户一条最后活跃时间（后写覆盖），外加一个独立过期的状态标签。
/// 是否在线完全由时间戳计算，记录是否存在不影响正确性。
#[async_trait]
pub trait PresenceStore: Send + Sync {
    /// 记录最后活跃时间，并写入 `status_ttl_secs` 后过期的状态标签
    async fn record_seen(
        &self,
        user_id: UserId,
        seen_at: i64,
        status: &str,
        status_ttl_secs: u64,
    ) -> ApplicationResult<()>;

    async fn last_seen(&self, user_id: UserId) -> ApplicationResult<Option<i64>>;

    /// 最后活跃时间 `>= cutoff` 的用户
    async fn seen_since(&self, cutoff: i64) -> ApplicationResult<Vec<UserId>>;

    /// 未过期的状态标签
    async fn status(&self, user_id: UserId, now: i64) -> ApplicationResult<Option<String>>;

    /// 删除最后活跃时间 `<= cutoff` 的记录，返回删除数量
    async fn remove_seen_before(&self, cutoff: i64) -> ApplicationResult<u64>;
}

/// 在线判定参数
#[derive(Debug, Clone)]
pub struct PresenceSettings {
    pub online_window_secs: i64,
    pub status_ttl_secs: u64,
    pub stale_after_secs: i64,
    pub read_timeout: Duration,
}

impl Default for PresenceSettings {
    fn default() -> Self {
        Self::from(&config::PresenceConfig::default())
    }
}

impl From<&config::PresenceConfig> for PresenceSettings {
    fn from(value: &config::PresenceConfig) -> Self {
        Self {
            online_window_secs: value.online_window_secs,
            status_ttl_secs: value.status_ttl_secs,
            stale_after_secs: value.stale_after_secs,
            read_timeout: value.read_timeout(),
        }
    }
}

pub const DEFAULT_STATUS: &str = "online";
const MAX_STATUS_LEN: usize = 32;

/// 在线状态跟踪器
///
/// 读路径带超时，存储不可用时降级为“所有人离线”。
pub struct PresenceTracker {
    store: Arc<dyn PresenceStore>,
    clock: Arc<dyn Clock>,
    settings: PresenceSettings,
}

impl PresenceTracker {
    pub fn new(store: Arc<dyn PresenceStore>, clock: Arc<dyn Clock>, settings: PresenceSettings) -> Self {
        Self {
            store,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &PresenceSettings {
        &self.settings
    }

    /// 用户活跃（心跳、发消息、建立连接）时调用
    pub async fn touch(&self, user_id: UserId, status: Option<&str>) -> ApplicationResult<()> {
        let status = normalize_status(status);
        let now = self.clock.epoch_seconds();
        self.store
            .record_seen(user_id, now, &status, self.settings.status_ttl_secs)
            .await?;

        tracing::debug!(user_id = %user_id, status = %status, "presence touched");
        Ok(())
    }

    pub async fn is_online(&self, user_id: UserId) -> bool {
        match self.last_seen(user_id).await {
            Some(last_seen) => self.clock.epoch_seconds() - last_seen <= self.settings.online_window_secs,
            None => false,
        }
    }

    pub async fn last_seen(&self, user_id: UserId) -> Option<i64> {
        let result = with_timeout(
            "presence.last_seen",
            self.settings.read_timeout,
            self.store.last_seen(user_id),
        )
        .await;
        match result {
            Ok(last_seen) => last_seen,
            Err(err) => {
                tracing::warn!(user_id = %user_id, error = %err, "presence lookup degraded to offline");
                None
            }
        }
    }

    /// 窗口内活跃过的全部用户
    pub async fn list_online(&self) -> Vec<UserId> {
        let cutoff = self.clock.epoch_seconds() - self.settings.online_window_secs;
        let result = with_timeout(
            "presence.list_online",
            self.settings.read_timeout,
            self.store.seen_since(cutoff),
        )
        .await;
        match result {
            Ok(users) => users,
            Err(err) => {
                tracing::warn!(error = %err, "online list degraded to empty");
                Vec::new()
            }
        }
    }

    pub async fn status(&self, user_id: UserId) -> Option<String> {
        let now = self.clock.epoch_seconds();
        let result = with_timeout(
            "presence.status",
            self.settings.read_timeout,
            self.store.status(user_id, now),
        )
        .await;
        result.unwrap_or_else(|err| {
            tracing::warn!(user_id = %user_id, error = %err, "presence status unavailable");
            None
        })
    }

    /// 清理长时间未活跃的记录，只用于控制存储规模
    pub async fn sweep_stale(&self, older_than_secs: Option<i64>) -> ApplicationResult<u64> {
        let older_than = older_than_secs.unwrap_or(self.settings.stale_after_secs);
        let cutoff = self.clock.epoch_seconds() - older_than;
        let removed = self.store.remove_seen_before(cutoff).await?;
        if removed > 0 {
            tracing::info!(removed, cutoff, "swept stale presence records");
        }
        Ok(removed)
    }
}

fn normalize_status(status: Option<&str>) -> String {
    let status = status.map(str::trim).filter(|s| !s.is_empty()).unwrap_or(DEFAULT_STATUS);
    status.chars().take(MAX_STATUS_LEN).collect()
}

/// 内存实现的在线状态存储（用于测试）
pub mod memory {
    use super::*;
    use crate::error::ApplicationError;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::RwLock;

    pub struct MemoryPresenceStore {
        last_seen: RwLock<HashMap<UserId, i64>>,
        statuses: RwLock<HashMap<UserId, (String, i64)>>,
        available: AtomicBool,
    }

    impl Default for MemoryPresenceStore {
        fn default() -> Self {
            Self::new()
        }
    }

    impl MemoryPresenceStore {
        pub fn new() -> Self {
            Self {
                last_seen: RwLock::new(HashMap::new()),
                statuses: RwLock::new(HashMap::new()),
                available: AtomicBool::new(true),
            }
        }

        pub fn set_available(&self, available: bool) {
            self.available.store(available, Ordering::SeqCst);
        }

        pub fn record_count(&self) -> usize {
            self.last_seen.read().map(|map| map.len()).unwrap_or(0)
        }

        pub fn status_count(&self) -> usize {
            self.statuses.read().map(|map| map.len()).unwrap_or(0)
        }

        fn ensure_available(&self) -> ApplicationResult<()> {
            if self.available.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(ApplicationError::infrastructure("presence store unavailable"))
            }
        }

        fn poisoned() -> ApplicationError {
            ApplicationError::infrastructure("presence store lock poisoned")
        }
    }

    #[async_trait]
    impl PresenceStore for MemoryPresenceStore {
        async fn record_seen(
            &self,
            user_id: UserId,
            seen_at: i64,
            status: &str,
            status_ttl_secs: u64,
        ) -> ApplicationResult<()> {
            self.ensure_available()?;
            self.last_seen
                .write()
                .map_err(|_| Self::poisoned())?
                .insert(user_id, seen_at);
            self.statuses
                .write()
                .map_err(|_| Self::poisoned())?
                .insert(user_id, (status.to_string(), seen_at + status_ttl_secs as i64));
            Ok(())
        }

        async fn last_seen(&self, user_id: UserId) -> ApplicationResult<Option<i64>> {
            self.ensure_available()?;
            let map = self.last_seen.read().map_err(|_| Self::poisoned())?;
            Ok(map.get(&user_id).copied())
        }

        async fn seen_since(&self, cutoff: i64) -> ApplicationResult<Vec<UserId>> {
            self.ensure_available()?;
            let map = self.last_seen.read().map_err(|_| Self::poisoned())?;
            Ok(map
                .iter()
                .filter(|(_, seen)| **seen >= cutoff)
                .map(|(user_id, _)| *user_id)
                .collect())
        }

        async fn status(&self, user_id: UserId, now: i64) -> ApplicationResult<Option<String>> {
            self.ensure_available()?;
            let map = self.statuses.read().map_err(|_| Self::poisoned())?;
            Ok(map
                .get(&user_id)
                .filter(|(_, expires_at)| now < *expires_at)
                .map(|(status, _)| status.clone()))
        }

        async fn remove_seen_before(&self, cutoff: i64) -> ApplicationResult<u64> {
            self.ensure_available()?;
            let mut map = self.last_seen.write().map_err(|_| Self::poisoned())?;
            let before = map.len();
            map.retain(|_, seen| *seen > cutoff);
            // 状态标签跟随最后活跃记录一起清理
            self.statuses
                .write()
                .map_err(|_| Self::poisoned())?
                .retain(|user_id, _| map.contains_key(user_id));
            Ok((before - map.len()) as u64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryPresenceStore;
    use super::*;
    use crate::clock::ManualClock;
    use uuid::Uuid;

    fn tracker(start: i64) -> (PresenceTracker, Arc<ManualClock>, Arc<MemoryPresenceStore>) {
        let clock = Arc::new(ManualClock::new(start));
        let store = Arc::new(MemoryPresenceStore::new());
        let tracker = PresenceTracker::new(store.clone(), clock.clone(), PresenceSettings::default());
        (tracker, clock, store)
    }

    fn user() -> UserId {
        UserId::from(Uuid::new_v4())
    }

    #[tokio::test]
    async fn online_window_boundaries() {
        let (tracker, clock, _) = tracker(10_000);
        let u = user();
        tracker.touch(u, None).await.unwrap();

        clock.set(10_059);
        assert!(tracker.is_online(u).await);
        clock.set(10_060);
        assert!(tracker.is_online(u).await, "60 seconds is still inside the window");
        clock.set(10_061);
        assert!(!tracker.is_online(u).await);
    }

    #[tokio::test]
    async fn unknown_user_is_offline() {
        let (tracker, _, _) = tracker(0);
        assert!(!tracker.is_online(user()).await);
    }

    #[tokio::test]
    async fn list_online_uses_the_same_window() {
        let (tracker, clock, _) = tracker(1_000);
        let early = user();
        let late = user();
        tracker.touch(early, None).await.unwrap();
        clock.set(1_030);
        tracker.touch(late, None).await.unwrap();

        clock.set(1_061);
        let online = tracker.list_online().await;
        assert_eq!(online, vec![late]);
        assert_eq!(tracker.is_online(early).await, online.contains(&early));
    }

    #[tokio::test]
    async fn status_expires_independently() {
        let (tracker, clock, _) = tracker(500);
        let u = user();
        tracker.touch(u, Some("idle")).await.unwrap();
        assert_eq!(tracker.status(u).await.as_deref(), Some("idle"));

        clock.advance(60);
        assert_eq!(tracker.status(u).await, None);
        assert!(tracker.is_online(u).await);
    }

    #[tokio::test]
    async fn blank_status_defaults_to_online() {
        let (tracker, _, _) = tracker(0);
        let u = user();
        tracker.touch(u, Some("   ")).await.unwrap();
        assert_eq!(tracker.status(u).await.as_deref(), Some(DEFAULT_STATUS));
    }

    #[tokio::test]
    async fn sweep_removes_only_old_records() {
        let (tracker, clock, store) = tracker(0);
        let old = user();
        tracker.touch(old, None).await.unwrap();
        clock.set(4_000);
        let fresh = user();
        tracker.touch(fresh, None).await.unwrap();

        let removed = tracker.sweep_stale(None).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.record_count(), 1);
        assert_eq!(store.status_count(), 1);
        assert!(tracker.is_online(fresh).await);
        assert_eq!(tracker.last_seen(old).await, None);
    }

    #[tokio::test]
    async fn unavailable_store_reads_as_offline() {
        let (tracker, _, store) = tracker(0);
        let u = user();
        tracker.touch(u, None).await.unwrap();

        store.set_available(false);
        assert!(!tracker.is_online(u).await);
        assert!(tracker.list_online().await.is_empty());
        assert!(tracker.touch(u, None).await.is_err());
    }
}
