use std::sync::atomic::{AtomicI64, Ordering};

use domain::Timestamp;
use time::OffsetDateTime;

pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;

    /// Unix 秒，时间线分数与在线窗口都基于它
    fn epoch_seconds(&self) -> i64 {
        self.now().unix_timestamp()
    }
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        OffsetDateTime::now_utc()
    }
}

/// 手动推进的时钟，测试与回放时使用
#[derive(Debug)]
pub struct ManualClock {
    epoch_seconds: AtomicI64,
}

impl ManualClock {
    pub fn new(epoch_seconds: i64) -> Self {
        Self {
            epoch_seconds: AtomicI64::new(epoch_seconds),
        }
    }

    pub fn set(&self, epoch_seconds: i64) {
        self.epoch_seconds.store(epoch_seconds, Ordering::SeqCst);
    }

    pub fn advance(&self, seconds: i64) {
        self.epoch_seconds.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        OffsetDateTime::from_unix_timestamp(self.epoch_seconds.load(Ordering::SeqCst))
            .unwrap_or(OffsetDateTime::UNIX_EPOCH)
    }

    fn epoch_seconds(&self) -> i64 {
        self.epoch_seconds.load(Ordering::SeqCst)
    }
}
