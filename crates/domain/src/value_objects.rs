use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::errors::DomainError;

/// 统一的时间戳类型。
pub type Timestamp = OffsetDateTime;

/// 时间线分数：发布时间的 Unix 秒数。
pub type Score = i64;

/// 用户唯一标识。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for UserId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl From<UserId> for Uuid {
    fn from(value: UserId) -> Self {
        value.0
    }
}

impl FromStr for UserId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| DomainError::invalid_argument("user_id", "not a valid uuid"))
    }
}

/// 帖子唯一标识。
///
/// `Ord` 与规范 UUID 字符串的字典序一致，时间线在分数相同时按它降序排列。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(pub Uuid);

impl PostId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for PostId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl From<PostId> for Uuid {
    fn from(value: PostId) -> Self {
        value.0
    }
}

impl FromStr for PostId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| DomainError::invalid_argument("post_id", "not a valid uuid"))
    }
}

/// 时间线键：全局时间线或某个用户的个性化时间线。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", content = "user_id", rename_all = "snake_case")]
pub enum TimelineKey {
    Global,
    User(UserId),
}

impl TimelineKey {
    pub fn for_user(user_id: UserId) -> Self {
        Self::User(user_id)
    }

    pub fn is_global(&self) -> bool {
        matches!(self, Self::Global)
    }

    /// 存储层使用的键名
    pub fn storage_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TimelineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimelineKey::Global => f.write_str("feed:global"),
            TimelineKey::User(user_id) => write!(f, "feed:user:{}", user_id),
        }
    }
}

/// 地理坐标（经度、纬度，单位为度）。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lon: f64,
    pub lat: f64,
}

impl GeoPoint {
    /// Redis GEO 可索引的纬度上限（EPSG:3857 投影边界）
    pub const MAX_LATITUDE: f64 = 85.051_128_78;
    /// 与 Redis GEODIST 相同的地球半径（公里）
    pub const EARTH_RADIUS_KM: f64 = 6_372.797_560_856;

    /// 校验坐标范围，越界或非有限值返回 `None`。
    pub fn new(lon: f64, lat: f64) -> Option<Self> {
        if !lon.is_finite() || !lat.is_finite() {
            return None;
        }
        if !(-180.0..=180.0).contains(&lon) || !(-Self::MAX_LATITUDE..=Self::MAX_LATITUDE).contains(&lat)
        {
            return None;
        }
        Some(Self { lon, lat })
    }

    /// 球面大圆距离（haversine），单位公里
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let d_lat = (other.lat - self.lat).to_radians();
        let d_lon = (other.lon - self.lon).to_radians();
        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        2.0 * Self::EARTH_RADIUS_KM * a.sqrt().asin()
    }
}
