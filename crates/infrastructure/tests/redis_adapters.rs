use application::{
    GeoIndex, PresenceStore, ScoreRange, TimelineStore,
};
use domain::{GeoPoint, PostId, TimelineKey, UserId};
use infrastructure::{RedisGeoIndex, RedisPresenceStore, RedisTimelineStore};
use testcontainers::{runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::redis::{Redis, REDIS_PORT};
use uuid::Uuid;

async fn start_redis() -> (ContainerAsync<Redis>, redis::aio::ConnectionManager) {
    // GEOSEARCH 需要 6.2+
    let node = Redis::default()
        .with_tag("7.2")
        .start()
        .await
        .expect("start redis");
    let port = node.get_host_port_ipv4(REDIS_PORT).await.expect("port");
    let conn = infrastructure::redis::connect(&format!("redis://127.0.0.1:{port}"))
        .await
        .expect("connect");
    (node, conn)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[ignore = "requires local docker daemon"]
async fn timeline_round_trip_against_redis() {
    let (_node, conn) = start_redis().await;
    let store = RedisTimelineStore::new(conn);
    let key = TimelineKey::for_user(UserId::from(Uuid::new_v4()));

    let mut posts = Vec::new();
    for score in 0..10 {
        let post = PostId::from(Uuid::new_v4());
        store.add(&key, post, 1_000 + score).await.expect("add");
        posts.push(post);
    }
    // 重复写入只覆盖分数
    store.add(&key, posts[0], 1_000).await.expect("re-add");
    assert_eq!(store.len(&key).await.expect("len"), 10);

    let page = store
        .range_by_score_desc(&key, ScoreRange::older_than(Some(1_005)), 0, 3)
        .await
        .expect("range");
    let scores: Vec<i64> = page.iter().map(|e| e.score).collect();
    assert_eq!(scores, vec![1_004, 1_003, 1_002]);

    let removed = store.trim_to_max_size(&key, 4).await.expect("trim");
    assert_eq!(removed, 6);
    let rest = store
        .range_by_score_desc(&key, ScoreRange::latest(), 0, 100)
        .await
        .expect("range");
    assert_eq!(rest.len(), 4);
    assert!(rest.iter().all(|e| e.score >= 1_006));

    store
        .add_bounded(&key, PostId::from(Uuid::new_v4()), 2_000, 4)
        .await
        .expect("add bounded");
    assert_eq!(store.len(&key).await.expect("len"), 4);
    assert!(store.remove(&key, posts[9]).await.expect("remove"));
    assert_eq!(store.score(&key, posts[9]).await.expect("score"), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[ignore = "requires local docker daemon"]
async fn equal_scores_follow_post_id_order() {
    let (_node, conn) = start_redis().await;
    let store = RedisTimelineStore::new(conn);
    let key = TimelineKey::Global;

    let mut posts: Vec<PostId> = (0..5).map(|_| PostId::from(Uuid::new_v4())).collect();
    for post in &posts {
        store.add(&key, *post, 42).await.expect("add");
    }
    posts.sort_by(|a, b| b.cmp(a));

    let page = store
        .range_by_score_desc(&key, ScoreRange::latest(), 0, 10)
        .await
        .expect("range");
    let ids: Vec<PostId> = page.iter().map(|e| e.post_id).collect();
    assert_eq!(ids, posts);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[ignore = "requires local docker daemon"]
async fn presence_and_geo_against_redis() {
    let (_node, conn) = start_redis().await;
    let presence = RedisPresenceStore::new(conn.clone());
    let geo = RedisGeoIndex::new(conn);

    let user = UserId::from(Uuid::new_v4());
    presence.record_seen(user, 1_000, "busy", 60).await.expect("record");
    assert_eq!(presence.last_seen(user).await.expect("last seen"), Some(1_000));
    assert_eq!(presence.seen_since(940).await.expect("seen since"), vec![user]);
    assert_eq!(
        presence.status(user, 1_000).await.expect("status").as_deref(),
        Some("busy")
    );
    assert_eq!(presence.remove_seen_before(1_000).await.expect("sweep"), 1);
    assert_eq!(presence.last_seen(user).await.expect("last seen"), None);

    let near = UserId::from(Uuid::new_v4());
    let far = UserId::from(Uuid::new_v4());
    let center = GeoPoint::new(-74.0060, 40.7128).expect("center");
    geo.upsert(far, GeoPoint::new(-75.1652, 39.9526).expect("philly"))
        .await
        .expect("geoadd");
    geo.upsert(near, GeoPoint::new(-74.0, 40.72).expect("near"))
        .await
        .expect("geoadd");

    let found = geo.search_within_radius(center, 50.0).await.expect("search");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].user_id, near);

    let wide = geo.search_within_radius(center, 200.0).await.expect("search");
    let ids: Vec<UserId> = wide.iter().map(|u| u.user_id).collect();
    assert_eq!(ids, vec![near, far]);
    assert!((wide[1].distance_km - center.distance_km(&GeoPoint::new(-75.1652, 39.9526).unwrap())).abs() < 1.0);
}
