use std::sync::Arc;

use application::{
    fanout_channel,
    geo::memory::MemoryGeoIndex,
    presence::memory::MemoryPresenceStore,
    timeline::memory::MemoryTimelineStore,
    FanoutEngine, FanoutSettings, FanoutWorkerPool, FeedService, FeedServiceDependencies,
    FeedSettings, GeoProximity, GeoSettings, ManualClock, PresenceSettings, PresenceTracker,
};
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use web_api::{router, AppState};

pub const START: i64 = 1_000;

/// 全部使用内存后端的应用实例
pub struct TestApp {
    pub router: Router,
    pub clock: Arc<ManualClock>,
    pub timelines: Arc<MemoryTimelineStore>,
    pub presence_store: Arc<MemoryPresenceStore>,
    pub geo_index: Arc<MemoryGeoIndex>,
    pool: Option<FanoutWorkerPool>,
}

impl TestApp {
    pub fn new() -> Self {
        let clock = Arc::new(ManualClock::new(START));
        let timelines = Arc::new(MemoryTimelineStore::new());
        let presence_store = Arc::new(MemoryPresenceStore::new());
        let geo_index = Arc::new(MemoryGeoIndex::new());

        let engine = Arc::new(FanoutEngine::new(timelines.clone(), FanoutSettings::default()));
        let (dispatcher, queue) = fanout_channel(64);
        let pool = FanoutWorkerPool::spawn(engine, queue, 2, CancellationToken::new());

        let feed = Arc::new(FeedService::new(FeedServiceDependencies {
            timelines: timelines.clone(),
            dispatcher: Arc::new(dispatcher),
            clock: clock.clone(),
            posts: None,
            settings: FeedSettings::default(),
        }));
        let presence = Arc::new(PresenceTracker::new(
            presence_store.clone(),
            clock.clone(),
            PresenceSettings::default(),
        ));
        let geo = Arc::new(GeoProximity::new(geo_index.clone(), GeoSettings::default()));

        Self {
            router: router(AppState::new(feed, presence, geo)),
            clock,
            timelines,
            presence_store,
            geo_index,
            pool: Some(pool),
        }
    }

    /// 等待已入队的写扩散全部完成；之后不能再发布
    pub async fn drain_fanout(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.shutdown().await;
        }
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Method::GET, uri, None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, uri, Some(body)).await
    }

    pub async fn put(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(Method::PUT, uri, Some(body)).await
    }

    async fn send(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");

        let response = self.router.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }
}
