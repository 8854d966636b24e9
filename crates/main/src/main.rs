//! 主应用程序入口
//!
//! 连接 Redis 与 PostgreSQL，启动扇出工作池、维护任务和 Axum Web API。

use std::sync::Arc;

use application::{
    fanout_channel, FanoutEngine, FanoutSettings, FanoutWorkerPool, FeedService,
    FeedServiceDependencies, FeedSettings, GeoProximity, GeoSettings, Maintenance,
    MaintenanceSchedule, PresenceSettings, PresenceTracker, SystemClock,
};
use config::AppConfig;
use infrastructure::Infrastructure;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = AppConfig::load()?;
    tracing::info!(
        database = config.database.url.split('@').last().unwrap_or("unknown"),
        "配置加载完成"
    );

    let infra = Infrastructure::connect(&config).await?;
    let clock: Arc<dyn application::Clock> = Arc::new(SystemClock);
    let shutdown = CancellationToken::new();

    // 扇出引擎与工作池
    let mut engine = FanoutEngine::new(
        infra.timeline_store(),
        FanoutSettings::from_config(&config.feed, &config.fanout),
    )
    .with_social_graph(infra.social_graph());
    if config.fanout.broadcast_new_posts {
        engine = engine.with_broadcaster(infra.feed_broadcaster());
    }
    let (dispatcher, queue) = fanout_channel(config.fanout.queue_capacity);
    let dispatcher = dispatcher.with_enqueue_timeout(config.fanout.enqueue_timeout());
    let pool = FanoutWorkerPool::spawn(
        Arc::new(engine),
        queue,
        config.fanout.workers,
        shutdown.child_token(),
    );

    // 应用层服务
    let feed = Arc::new(FeedService::new(FeedServiceDependencies {
        timelines: infra.timeline_store(),
        dispatcher: Arc::new(dispatcher),
        clock: clock.clone(),
        posts: Some(infra.post_repository()),
        settings: FeedSettings::from(&config.feed),
    }));
    let presence = Arc::new(PresenceTracker::new(
        infra.presence_store(),
        clock,
        PresenceSettings::from(&config.presence),
    ));
    let geo = Arc::new(GeoProximity::new(
        infra.geo_index(),
        GeoSettings::from(&config.geo),
    ));

    let maintenance = Arc::new(Maintenance::new(feed.clone(), presence.clone())).spawn(
        MaintenanceSchedule::from_config(&config),
        shutdown.child_token(),
    );

    // 启动 Web 服务器
    let app = router(AppState::new(feed, presence, geo));
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("feed 服务启动在 http://{}", addr);

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %err, "无法监听退出信号");
            }
            tracing::info!("收到退出信号，开始关闭");
            signal.cancel();
        })
        .await?;

    // 先排空扇出队列，再停维护任务
    shutdown.cancel();
    pool.shutdown().await;
    if let Err(err) = maintenance.await {
        tracing::error!(error = %err, "maintenance task panicked");
    }

    tracing::info!("服务已停止");
    Ok(())
}
