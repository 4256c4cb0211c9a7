use std::env;
use std::str::FromStr;

pub enum EnvKey {
    DatabaseUrl,
    QueueBackend,
    RedisUrl,
    RabbitMqUrl,
    QueueName,
    BucketName,
    Region,
    AccessKey,
    SecretKey,
    StorageEndpoint,
    IdleBackoffMs,
    ErrorBackoffMs,
}

impl EnvKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvKey::DatabaseUrl => "DATABASE_URL",
            EnvKey::QueueBackend => "QUEUE_BACKEND",
            EnvKey::RedisUrl => "REDIS_URL",
            EnvKey::RabbitMqUrl => "RABBITMQ_URL",
            EnvKey::QueueName => "QUEUE_NAME",
            EnvKey::BucketName => "AWS_BUCKET_NAME",
            EnvKey::Region => "AWS_REGION",
            EnvKey::AccessKey => "AWS_ACCESS_KEY_ID",
            EnvKey::SecretKey => "AWS_SECRET_ACCESS_KEY",
            EnvKey::StorageEndpoint => "S3_ENDPOINT",
            EnvKey::IdleBackoffMs => "WORKER_IDLE_BACKOFF_MS",
            EnvKey::ErrorBackoffMs => "WORKER_ERROR_BACKOFF_MS",
        }
    }
}

pub fn get(key: EnvKey) -> Result<String, env::VarError> {
    env::var(key.as_str())
}

/// Like [`get`], but treats an empty value as unset.
pub fn get_opt(key: EnvKey) -> Option<String> {
    env::var(key.as_str()).ok().filter(|v| !v.trim().is_empty())
}

pub fn get_or(key: EnvKey, default: &str) -> String {
    get_opt(key).unwrap_or_else(|| default.to_string())
}

pub fn get_parsed<T: FromStr>(key: EnvKey, default: T) -> T {
    match get(key) {
        Ok(val) => val.parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}
