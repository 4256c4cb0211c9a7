use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::settings::{AppConfig, QueueBackend};
use crate::infrastructure::db::pool::{connect_to_db, run_migrations};
use crate::infrastructure::queue::{RabbitMqService, RedisQueue, TaskQueue};
use crate::infrastructure::redis::client::RedisService;
use crate::infrastructure::storage::StorageService;
use crate::modules::image::repository::ImageRepository;
use crate::state::AppState;

/// Connects every backend named in `config` and bundles the handles.
pub async fn create_state(config: &AppConfig) -> Result<AppState> {
    let db = connect_to_db(&config.database_url)
        .await
        .context("Failed to connect to PostgreSQL")?;
    run_migrations(&db).await.context("Failed to run migrations")?;

    let queue: Arc<dyn TaskQueue> = match &config.queue.backend {
        QueueBackend::Redis { url } => {
            let redis = RedisService::new(url).await.context("Failed to connect to Redis")?;
            Arc::new(RedisQueue::new(redis, config.queue.name.clone()))
        }
        QueueBackend::RabbitMq { url } => Arc::new(
            RabbitMqService::new(url, &config.queue.name)
                .await
                .context("Failed to connect to RabbitMQ")?,
        ),
    };

    let storage = StorageService::new(&config.storage);

    Ok(AppState::new(
        Arc::new(ImageRepository::new(db)),
        queue,
        Arc::new(storage),
    ))
}
