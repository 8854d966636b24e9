//! 后台维护：定期裁剪全局时间线、清理过期的在线记录

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::presence::PresenceTracker;
use crate::services::FeedService;

#[derive(Debug, Clone)]
pub struct MaintenanceSchedule {
    pub global_trim_interval: Duration,
    pub presence_sweep_interval: Duration,
}

impl MaintenanceSchedule {
    pub fn from_config(config: &config::AppConfig) -> Self {
        Self {
            global_trim_interval: config.feed.global_trim_interval(),
            presence_sweep_interval: config.presence.sweep_interval(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub global_trimmed: u64,
    pub presence_swept: u64,
}

pub struct Maintenance {
    feed: Arc<FeedService>,
    presence: Arc<PresenceTracker>,
}

impl Maintenance {
    pub fn new(feed: Arc<FeedService>, presence: Arc<PresenceTracker>) -> Self {
        Self { feed, presence }
    }

    /// 两项任务各执行一次，失败只记日志
    pub async fn run_once(&self) -> MaintenanceReport {
        MaintenanceReport {
            global_trimmed: self.trim_global().await,
            presence_swept: self.sweep_presence().await,
        }
    }

    async fn trim_global(&self) -> u64 {
        match self.feed.trim_global().await {
            Ok(0) => 0,
            Ok(removed) => {
                tracing::info!(removed, "global timeline trimmed");
                removed
            }
            Err(err) => {
                tracing::warn!(error = %err, "global timeline trim failed");
                0
            }
        }
    }

    async fn sweep_presence(&self) -> u64 {
        self.presence.sweep_stale(None).await.unwrap_or_else(|err| {
            tracing::warn!(error = %err, "presence sweep failed");
            0
        })
    }

    /// 按各自的间隔循环执行，直到取消
    pub fn spawn(self: Arc<Self>, schedule: MaintenanceSchedule, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut trim = tokio::time::interval(schedule.global_trim_interval);
            let mut sweep = tokio::time::interval(schedule.presence_sweep_interval);
            trim.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            tracing::info!(
                trim_interval = ?schedule.global_trim_interval,
                sweep_interval = ?schedule.presence_sweep_interval,
                "maintenance loops started"
            );

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::info!("maintenance loops stopped");
                        break;
                    }
                    _ = trim.tick() => {
                        self.trim_global().await;
                    }
                    _ = sweep.tick() => {
                        self.sweep_presence().await;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::fanout::fanout_channel;
    use crate::presence::memory::MemoryPresenceStore;
    use crate::presence::PresenceSettings;
    use crate::services::{FeedServiceDependencies, FeedSettings};
    use crate::timeline::memory::MemoryTimelineStore;
    use crate::timeline::TimelineStore;
    use domain::{PostId, TimelineKey, UserId};
    use uuid::Uuid;

    fn build(cap: usize) -> (Arc<Maintenance>, Arc<MemoryTimelineStore>, Arc<ManualClock>, Arc<PresenceTracker>) {
        let store = Arc::new(MemoryTimelineStore::new());
        let clock = Arc::new(ManualClock::new(0));
        let (dispatcher, _queue) = fanout_channel(1);
        let feed = Arc::new(FeedService::new(FeedServiceDependencies {
            timelines: store.clone(),
            dispatcher: Arc::new(dispatcher),
            clock: clock.clone(),
            posts: None,
            settings: FeedSettings {
                global_timeline_cap: cap,
                ..FeedSettings::default()
            },
        }));
        let presence = Arc::new(PresenceTracker::new(
            Arc::new(MemoryPresenceStore::new()),
            clock.clone(),
            PresenceSettings::default(),
        ));
        (
            Arc::new(Maintenance::new(feed, presence.clone())),
            store,
            clock,
            presence,
        )
    }

    #[tokio::test]
    async fn run_once_trims_and_sweeps() {
        let (maintenance, store, clock, presence) = build(3);
        for i in 0..5 {
            store
                .add(&TimelineKey::Global, PostId::from(Uuid::new_v4()), i)
                .await
                .unwrap();
        }
        presence.touch(UserId::from(Uuid::new_v4()), None).await.unwrap();
        clock.set(3_601);

        let report = maintenance.run_once().await;
        assert_eq!(
            report,
            MaintenanceReport {
                global_trimmed: 2,
                presence_swept: 1,
            }
        );
        assert_eq!(store.len(&TimelineKey::Global).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn failures_are_swallowed() {
        let (maintenance, store, _, _) = build(3);
        store.set_available(false);
        assert_eq!(maintenance.run_once().await.global_trimmed, 0);
    }

    #[tokio::test]
    async fn loop_stops_on_cancel() {
        let (maintenance, store, _, _) = build(1);
        for i in 0..4 {
            store
                .add(&TimelineKey::Global, PostId::from(Uuid::new_v4()), i)
                .await
                .unwrap();
        }
        let shutdown = CancellationToken::new();
        let schedule = MaintenanceSchedule {
            global_trim_interval: Duration::from_millis(10),
            presence_sweep_interval: Duration::from_secs(60),
        };
        let handle = maintenance.spawn(schedule, shutdown.clone());

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();
        handle.await.unwrap();
        assert_eq!(store.len(&TimelineKey::Global).await.unwrap(), 1);
    }
}
