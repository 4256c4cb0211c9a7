use async_trait::async_trait;
use redis::AsyncCommands;

use super::{QueueError, TaskQueue};
use crate::infrastructure::redis::client::RedisService;

/// Redis list used as a queue: `LPUSH` on one end, `RPOP` on the other.
#[derive(Clone)]
pub struct RedisQueue {
    redis: RedisService,
    key: String,
}

impl RedisQueue {
    pub fn new(redis: RedisService, key: impl Into<String>) -> Self {
        Self {
            redis,
            key: key.into(),
        }
    }
}

#[async_trait]
impl TaskQueue for RedisQueue {
    async fn enqueue(&self, payload: &str) -> Result<(), QueueError> {
        let mut conn = self.redis.get_conn().await?;
        conn.lpush::<_, _, ()>(&self.key, payload).await?;
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<String>, QueueError> {
        let mut conn = self.redis.get_conn().await?;
        // nil reply maps to None
        let payload: Option<String> = conn.rpop(&self.key, None).await?;
        Ok(payload)
    }
}
