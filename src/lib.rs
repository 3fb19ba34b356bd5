pub(crate) mod api;
pub(crate) mod core;
pub(crate) mod db;
pub(crate) mod repositories;
pub(crate) mod schemas;
pub(crate) mod services;
pub(crate) mod tasks;

#[cfg(test)]
mod test_support;

use anyhow::Context;

use crate::core::{config::Settings, redis::RedisHandle, state::AppState, telemetry};
use crate::services::queue::QueuePublisher;

fn init_runtime() -> anyhow::Result<Settings> {
    dotenvy::dotenv().ok();

    let settings = Settings::load().context("Failed to load settings")?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    Ok(settings)
}

async fn connect_redis(settings: &Settings) -> RedisHandle {
    let redis = RedisHandle::new(settings.redis().redis_url());
    if let Err(err) = redis.connect().await {
        tracing::error!(error = %err, "Failed to connect to Redis; continuing without it");
    } else {
        tracing::info!("Redis connected successfully");
    }
    redis
}

async fn bootstrap() -> anyhow::Result<AppState> {
    let settings = init_runtime()?;

    let db = db::init_store(&settings).await.context("Failed to open the store")?;
    tracing::info!(
        file_backed = db.is_file_backed(),
        path = ?db.path(),
        "Store ready"
    );

    let redis = connect_redis(&settings).await;

    let publisher = QueuePublisher::from_settings(&settings, redis.clone())
        .context("Failed to build the queue publisher")?;
    if let Some(setting) = publisher.missing_setting() {
        tracing::warn!(
            transport = publisher.transport_name(),
            missing = setting,
            "Queue is not configured; correction triggers will be rejected"
        );
    }

    Ok(AppState::new(settings, db, redis, publisher))
}

pub async fn run() -> anyhow::Result<()> {
    let state = bootstrap().await?;

    let app = api::router::router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.settings().server_addr())
        .await
        .with_context(|| format!("Failed to bind {}", state.settings().server_addr()))?;

    tracing::info!(
        host = %state.settings().server_host(),
        port = state.settings().server_port(),
        environment = %state.settings().runtime().environment.as_str(),
        transport = state.publisher().transport_name(),
        "Tutor grading API listening"
    );

    let result =
        axum::serve(listener, app).with_graceful_shutdown(core::shutdown::shutdown_signal()).await;

    state.redis().disconnect().await;
    tracing::info!("Redis disconnected");

    result?;

    Ok(())
}

/// Runs the Redis delivery worker. It reaches the store only through the API's
/// webhook, so it never loads a snapshot of its own.
pub async fn run_worker() -> anyhow::Result<()> {
    let settings = init_runtime()?;
    let redis = connect_redis(&settings).await;

    let result = tasks::scheduler::run(&settings, redis.clone()).await;

    redis.disconnect().await;
    tracing::info!("Redis disconnected");

    result?;

    Ok(())
}
