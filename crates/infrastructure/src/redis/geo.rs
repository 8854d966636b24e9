use application::{ApplicationResult, GeoIndex, NearbyUser};
use async_trait::async_trait;
use domain::{GeoPoint, UserId};
use redis::aio::ConnectionManager;

use super::error::{RedisError, RedisResult};

pub const GEO_KEY: &str = "geo:users";

/// Redis GEO 位置索引（GEOADD / GEOSEARCH，需要 Redis 6.2+）
#[derive(Clone)]
pub struct RedisGeoIndex {
    conn: ConnectionManager,
}

impl RedisGeoIndex {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// GEOSEARCH ... WITHDIST 每一项是 `[member, distance]`
    fn parse_results(raw: Vec<Vec<String>>) -> RedisResult<Vec<NearbyUser>> {
        raw.into_iter()
            .filter_map(|item| match item.as_slice() {
                [member, distance] => Some((member.clone(), distance.clone())),
                _ => None,
            })
            .map(|(member, distance)| {
                let user_id = member
                    .parse::<UserId>()
                    .map_err(|err| RedisError::invalid_data(GEO_KEY, err.to_string()))?;
                let distance_km = distance
                    .parse::<f64>()
                    .map_err(|err| RedisError::invalid_data(GEO_KEY, err.to_string()))?;
                Ok(NearbyUser { user_id, distance_km })
            })
            .collect()
    }
}

#[async_trait]
impl GeoIndex for RedisGeoIndex {
    async fn upsert(&self, user_id: UserId, point: GeoPoint) -> ApplicationResult<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("GEOADD")
            .arg(GEO_KEY)
            .arg(point.lon)
            .arg(point.lat)
            .arg(user_id.to_string())
            .query_async(&mut conn)
            .await
            .map_err(RedisError::from)?;
        tracing::debug!(user_id = %user_id, lon = point.lon, lat = point.lat, "location updated");
        Ok(())
    }

    async fn search_within_radius(
        &self,
        center: GeoPoint,
        radius_km: f64,
    ) -> ApplicationResult<Vec<NearbyUser>> {
        let mut conn = self.conn.clone();
        let raw: Vec<Vec<String>> = redis::cmd("GEOSEARCH")
            .arg(GEO_KEY)
            .arg("FROMLONLAT")
            .arg(center.lon)
            .arg(center.lat)
            .arg("BYRADIUS")
            .arg(radius_km)
            .arg("km")
            .arg("ASC")
            .arg("WITHDIST")
            .query_async(&mut conn)
            .await
            .map_err(RedisError::from)?;
        Ok(Self::parse_results(raw)?)
    }

    async fn remove(&self, user_id: UserId) -> ApplicationResult<bool> {
        let mut conn = self.conn.clone();
        let removed: u64 = redis::cmd("ZREM")
            .arg(GEO_KEY)
            .arg(user_id.to_string())
            .query_async(&mut conn)
            .await
            .map_err(RedisError::from)?;
        Ok(removed > 0)
    }
}
