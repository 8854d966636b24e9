//! 应用层实现。
//!
//! 时间线、在线状态、位置索引的存储抽象（附带内存实现），
//! 以及写扩散引擎、feed 用例和后台维护任务。

pub mod broadcaster;
pub mod clock;
pub mod cursor;
pub mod error;
pub mod fanout;
pub mod geo;
pub mod maintenance;
pub mod pagination;
pub mod presence;
pub mod retry;
pub mod services;
pub mod timeline;

pub use broadcaster::{BroadcastError, FeedBroadcast, FeedBroadcaster, FeedEvent, LocalFeedBroadcaster};
pub use clock::{Clock, ManualClock, SystemClock};
pub use cursor::CursorCodec;
pub use error::{ApplicationError, ApplicationResult};
pub use fanout::{
    fanout_channel, ChannelFanoutDispatcher, FanoutDispatcher, FanoutEngine, FanoutJob,
    FanoutReport, FanoutSettings, FanoutWorkerPool,
};
pub use geo::{DynamicRoomSuggestion, GeoIndex, GeoProximity, GeoSettings, NearbyUser};
pub use maintenance::{Maintenance, MaintenanceReport, MaintenanceSchedule};
pub use pagination::{paginate, Page, PageRequest};
pub use presence::{PresenceSettings, PresenceStore, PresenceTracker};
pub use retry::RetryConfig;
pub use services::{FeedService, FeedServiceDependencies, FeedSettings};
pub use timeline::{ScoreBound, ScoreRange, TimelineEntry, TimelineStore};
