use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{with_timeout, ApplicationResult};
use domain::{GeoPoint, UserId};

/// 附近的用户
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NearbyUser {
    pub user_id: UserId,
    pub distance_km: f64,
}

/// 用户位置索引
///
/// 每个用户至多一个位置，重复写入覆盖。
#[async_trait]
pub trait GeoIndex: Send + Sync {
    async fn upsert(&self, user_id: UserId, point: GeoPoint) -> ApplicationResult<()>;

    /// 半径内（含边界）的用户，按距离升序
    async fn search_within_radius(
        &self,
        center: GeoPoint,
        radius_km: f64,
    ) -> ApplicationResult<Vec<NearbyUser>>;

    async fn remove(&self, user_id: UserId) -> ApplicationResult<bool>;
}

/// 动态房间建议
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicRoomSuggestion {
    pub name: String,
    pub reason: String,
    pub lat: f64,
    pub lon: f64,
    pub count: usize,
}

pub const DYNAMIC_ROOM_NAME: &str = "Local Dynamic Room";
pub const DYNAMIC_ROOM_REASON: &str = "high activity";

/// 附近人数严格大于阈值时给出建议
pub fn dynamic_room_from(
    center: GeoPoint,
    nearby: &[NearbyUser],
    threshold: usize,
) -> Option<DynamicRoomSuggestion> {
    (nearby.len() > threshold).then(|| DynamicRoomSuggestion {
        name: DYNAMIC_ROOM_NAME.to_string(),
        reason: DYNAMIC_ROOM_REASON.to_string(),
        lat: center.lat,
        lon: center.lon,
        count: nearby.len(),
    })
}

#[derive(Debug, Clone)]
pub struct GeoSettings {
    pub default_radius_km: f64,
    pub dynamic_room_radius_km: f64,
    pub dynamic_room_threshold: usize,
    pub read_timeout: Duration,
}

impl Default for GeoSettings {
    fn default() -> Self {
        Self::from(&config::GeoConfig::default())
    }
}

impl From<&config::GeoConfig> for GeoSettings {
    fn from(value: &config::GeoConfig) -> Self {
        Self {
            default_radius_km: value.default_radius_km,
            dynamic_room_radius_km: value.dynamic_room_radius_km,
            dynamic_room_threshold: value.dynamic_room_threshold,
            read_timeout: value.read_timeout(),
        }
    }
}

/// 位置服务：写入位置、附近搜索与动态房间建议。
///
/// 无效坐标只记日志不写入；存储失败或超时时搜索降级为空结果。
pub struct GeoProximity {
    index: Arc<dyn GeoIndex>,
    settings: GeoSettings,
}

impl GeoProximity {
    pub fn new(index: Arc<dyn GeoIndex>, settings: GeoSettings) -> Self {
        Self { index, settings }
    }

    /// 返回是否真的写入
    pub async fn upsert(&self, user_id: UserId, lon: f64, lat: f64) -> ApplicationResult<bool> {
        let Some(point) = GeoPoint::new(lon, lat) else {
            tracing::warn!(user_id = %user_id, lon, lat, "ignoring out-of-range coordinates");
            return Ok(false);
        };
        self.index.upsert(user_id, point).await?;
        Ok(true)
    }

    pub async fn remove(&self, user_id: UserId) -> ApplicationResult<bool> {
        self.index.remove(user_id).await
    }

    pub async fn search(&self, lon: f64, lat: f64, radius_km: Option<f64>) -> Vec<NearbyUser> {
        let radius_km = radius_km
            .filter(|r| r.is_finite() && *r > 0.0)
            .unwrap_or(self.settings.default_radius_km);
        let Some(center) = GeoPoint::new(lon, lat) else {
            tracing::warn!(lon, lat, "search center out of range");
            return Vec::new();
        };
        self.search_around(center, radius_km).await
    }

    pub async fn suggest_dynamic_room(&self, lon: f64, lat: f64) -> Option<DynamicRoomSuggestion> {
        let center = GeoPoint::new(lon, lat)?;
        let nearby = self
            .search_around(center, self.settings.dynamic_room_radius_km)
            .await;
        dynamic_room_from(center, &nearby, self.settings.dynamic_room_threshold)
    }

    async fn search_around(&self, center: GeoPoint, radius_km: f64) -> Vec<NearbyUser> {
        let result = with_timeout(
            "geo.search",
            self.settings.read_timeout,
            self.index.search_within_radius(center, radius_km),
        )
        .await;
        match result {
            Ok(users) => users,
            Err(err) => {
                tracing::warn!(error = %err, radius_km, "geo search degraded to empty");
                Vec::new()
            }
        }
    }
}

/// 内存实现的位置索引，距离计算与 Redis GEO 使用相同的地球半径
pub mod memory {
    use super::*;
    use crate::error::ApplicationError;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::RwLock;

    pub struct MemoryGeoIndex {
        points: RwLock<HashMap<UserId, GeoPoint>>,
        available: AtomicBool,
    }

    impl Default for MemoryGeoIndex {
        fn default() -> Self {
            Self::new()
        }
    }

    impl MemoryGeoIndex {
        pub fn new() -> Self {
            Self {
                points: RwLock::new(HashMap::new()),
                available: AtomicBool::new(true),
            }
        }

        pub fn set_available(&self, available: bool) {
            self.available.store(available, Ordering::SeqCst);
        }

        fn ensure_available(&self) -> ApplicationResult<()> {
            if self.available.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(ApplicationError::infrastructure("geo index unavailable"))
            }
        }

        fn poisoned() -> ApplicationError {
            ApplicationError::infrastructure("geo index lock poisoned")
        }
    }

    #[async_trait]
    impl GeoIndex for MemoryGeoIndex {
        async fn upsert(&self, user_id: UserId, point: GeoPoint) -> ApplicationResult<()> {
            self.ensure_available()?;
            self.points
                .write()
                .map_err(|_| Self::poisoned())?
                .insert(user_id, point);
            Ok(())
        }

        async fn search_within_radius(
            &self,
            center: GeoPoint,
            radius_km: f64,
        ) -> ApplicationResult<Vec<NearbyUser>> {
            self.ensure_available()?;
            let points = self.points.read().map_err(|_| Self::poisoned())?;
            let mut nearby: Vec<NearbyUser> = points
                .iter()
                .map(|(user_id, point)| NearbyUser {
                    user_id: *user_id,
                    distance_km: center.distance_km(point),
                })
                .filter(|user| user.distance_km <= radius_km)
                .collect();
            nearby.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
            Ok(nearby)
        }

        async fn remove(&self, user_id: UserId) -> ApplicationResult<bool> {
            self.ensure_available()?;
            let mut points = self.points.write().map_err(|_| Self::poisoned())?;
            Ok(points.remove(&user_id).is_some())
        }
    }
}
