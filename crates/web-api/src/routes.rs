use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use application::{DynamicRoomSuggestion, NearbyUser, Page, PageRequest};
use domain::{PostId, Score, TimelineKey, UserId};

use crate::{error::ApiError, state::AppState};

#[derive(Debug, Default, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum FeedScope {
    #[default]
    Global,
    Following,
}

#[derive(Debug, Deserialize)]
struct FeedQuery {
    #[serde(default)]
    scope: FeedScope,
    user_id: Option<Uuid>,
    limit: Option<usize>,
    cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PublishPayload {
    post_id: Uuid,
    author_id: Uuid,
    follower_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Serialize)]
struct PublishAccepted {
    post_id: PostId,
    score: Score,
}

#[derive(Debug, Deserialize)]
struct TouchPayload {
    user_id: Uuid,
    status: Option<String>,
}

#[derive(Debug, Serialize)]
struct PresenceView {
    user_id: UserId,
    online: bool,
    status: Option<String>,
    last_seen: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct LocationPayload {
    lon: f64,
    lat: f64,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    lon: f64,
    lat: f64,
    radius_km: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct PointQuery {
    lon: f64,
    lat: f64,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/feed", get(get_feed))
        .route("/feed/publish", post(publish))
        .route("/presence/touch", post(touch_presence))
        .route("/presence/online", get(list_online))
        .route("/presence/{user_id}", get(get_presence))
        .route("/geo/search", get(search_nearby))
        .route("/geo/dynamic-room", get(dynamic_room))
        .route("/geo/{user_id}", put(update_location))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn get_feed(
    State(state): State<AppState>,
    Query(query): Query<FeedQuery>,
) -> Result<Json<Page<PostId>>, ApiError> {
    let key = match (query.scope, query.user_id) {
        (FeedScope::Global, _) => TimelineKey::Global,
        (FeedScope::Following, Some(user_id)) => TimelineKey::for_user(UserId::from(user_id)),
        (FeedScope::Following, None) => {
            return Err(ApiError::bad_request("user_id is required for the following feed"))
        }
    };
    let request = PageRequest {
        limit: query.limit,
        cursor: query.cursor,
    };
    Ok(Json(state.feed.feed(key, &request).await))
}

async fn publish(
    State(state): State<AppState>,
    Json(payload): Json<PublishPayload>,
) -> Result<(StatusCode, Json<PublishAccepted>), ApiError> {
    let post_id = PostId::from(payload.post_id);
    let author_id = UserId::from(payload.author_id);
    let job = match payload.follower_ids {
        Some(ids) => {
            let followers = ids.into_iter().map(UserId::from).collect();
            state.feed.publish(post_id, author_id, followers).await?
        }
        None => state.feed.publish_post(post_id, author_id).await?,
    };

    Ok((
        StatusCode::ACCEPTED,
        Json(PublishAccepted {
            post_id: job.post_id,
            score: job.published_at,
        }),
    ))
}

async fn touch_presence(
    State(state): State<AppState>,
    Json(payload): Json<TouchPayload>,
) -> Result<StatusCode, ApiError> {
    state
        .presence
        .touch(UserId::from(payload.user_id), payload.status.as_deref())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_presence(State(state): State<AppState>, Path(user_id): Path<Uuid>) -> Json<PresenceView> {
    let user_id = UserId::from(user_id);
    let last_seen = state.presence.last_seen(user_id).await;
    let online = state.presence.is_online(user_id).await;
    let status = if online {
        state.presence.status(user_id).await
    } else {
        None
    };
    Json(PresenceView {
        user_id,
        online,
        status,
        last_seen,
    })
}

async fn list_online(State(state): State<AppState>) -> Json<Vec<UserId>> {
    Json(state.presence.list_online().await)
}

async fn update_location(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<LocationPayload>,
) -> Result<StatusCode, ApiError> {
    state
        .geo
        .upsert(UserId::from(user_id), payload.lon, payload.lat)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn search_nearby(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Json<Vec<NearbyUser>> {
    Json(state.geo.search(query.lon, query.lat, query.radius_km).await)
}

async fn dynamic_room(
    State(state): State<AppState>,
    Query(query): Query<PointQuery>,
) -> Json<Option<DynamicRoomSuggestion>> {
    Json(state.geo.suggest_dynamic_room(query.lon, query.lat).await)
}
