//! Task queue contract: an at-least-once, best-effort FIFO handoff of
//! opaque string payloads between producers and the worker.

pub mod memory;
pub mod rabbitmq;
pub mod redis_queue;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryQueue;
pub use rabbitmq::RabbitMqService;
pub use redis_queue::RedisQueue;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("rabbitmq error: {0}")]
    Amqp(#[from] lapin::Error),

    #[error("queue unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn enqueue(&self, payload: &str) -> Result<(), QueueError>;

    /// Pops the oldest payload. `Ok(None)` means the queue is empty, which
    /// is not an error.
    async fn dequeue(&self) -> Result<Option<String>, QueueError>;
}
