use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::config::env::{self, EnvKey};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

fn required(key: EnvKey) -> Result<String, ConfigError> {
    let name = key.as_str();
    env::get_opt(key).ok_or(ConfigError::Missing(name))
}

#[derive(Clone, Debug)]
pub enum QueueBackend {
    Redis { url: String },
    RabbitMq { url: String },
}

#[derive(Clone, Debug)]
pub struct QueueConfig {
    pub backend: QueueBackend,
    pub name: String,
}

impl QueueConfig {
    pub fn new(kind: &str, redis_url: String, rabbitmq_url: Option<String>, name: String) -> Result<Self, ConfigError> {
        let backend = match kind.trim().to_ascii_lowercase().as_str() {
            "redis" => QueueBackend::Redis { url: redis_url },
            "rabbitmq" | "amqp" => QueueBackend::RabbitMq {
                url: rabbitmq_url.ok_or(ConfigError::Missing(EnvKey::RabbitMqUrl.as_str()))?,
            },
            other => {
                return Err(ConfigError::Invalid {
                    key: EnvKey::QueueBackend.as_str(),
                    reason: format!("unknown queue backend '{}'", other),
                })
            }
        };

        Ok(Self { backend, name })
    }
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub bucket: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    /// S3-compatible endpoint (MinIO etc.). When set, objects are addressed path-style.
    pub endpoint: Option<Url>,
}

impl StorageConfig {
    pub fn new(
        bucket: String,
        region: String,
        access_key: String,
        secret_key: String,
        endpoint: Option<&str>,
    ) -> Result<Self, ConfigError> {
        if bucket.trim().is_empty() {
            return Err(ConfigError::Missing(EnvKey::BucketName.as_str()));
        }
        if region.trim().is_empty() {
            return Err(ConfigError::Missing(EnvKey::Region.as_str()));
        }

        let endpoint = endpoint
            .map(|raw| {
                Url::parse(raw).map_err(|e| ConfigError::Invalid {
                    key: EnvKey::StorageEndpoint.as_str(),
                    reason: e.to_string(),
                })
            })
            .transpose()?;

        Ok(Self {
            bucket,
            region,
            access_key,
            secret_key,
            endpoint,
        })
    }
}

#[derive(Clone, Debug)]
pub struct WorkerConfig {
    /// Sleep after polling an empty queue.
    pub idle_backoff: Duration,
    /// Sleep after a queue transport error.
    pub error_backoff: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            idle_backoff: Duration::from_secs(2),
            error_backoff: Duration::from_secs(5),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub queue: QueueConfig,
    pub storage: StorageConfig,
    pub worker: WorkerConfig,
}

impl AppConfig {
    pub fn new() -> Result<Self, ConfigError> {
        let queue = QueueConfig::new(
            &env::get_or(EnvKey::QueueBackend, "redis"),
            env::get_or(EnvKey::RedisUrl, "redis://localhost:6379"),
            env::get_opt(EnvKey::RabbitMqUrl),
            env::get_or(EnvKey::QueueName, "image_tasks"),
        )?;

        let storage = StorageConfig::new(
            required(EnvKey::BucketName)?,
            env::get_or(EnvKey::Region, "us-west-2"),
            required(EnvKey::AccessKey)?,
            required(EnvKey::SecretKey)?,
            env::get_opt(EnvKey::StorageEndpoint).as_deref(),
        )?;

        let defaults = WorkerConfig::default();
        let worker = WorkerConfig {
            idle_backoff: Duration::from_millis(env::get_parsed(
                EnvKey::IdleBackoffMs,
                defaults.idle_backoff.as_millis() as u64,
            )),
            error_backoff: Duration::from_millis(env::get_parsed(
                EnvKey::ErrorBackoffMs,
                defaults.error_backoff.as_millis() as u64,
            )),
        };

        Ok(Self {
            database_url: required(EnvKey::DatabaseUrl)?,
            queue,
            storage,
            worker,
        })
    }
}
