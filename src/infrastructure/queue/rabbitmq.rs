use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use lapin::{
    options::*, types::FieldTable, BasicProperties, Channel, Connection, ConnectionProperties,
};
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::{QueueError, TaskQueue};

/// Durable RabbitMQ queue. Messages are fetched with `basic.get` so an
/// empty queue is observable, and acked as soon as they are received.
#[derive(Clone)]
pub struct RabbitMqService {
    url: String,
    queue: String,
    conn: Arc<Mutex<Connection>>,
    channel: Arc<Mutex<Channel>>,
}

impl RabbitMqService {
    async fn connect(url: &str, queue: &str) -> Result<(Connection, Channel), QueueError> {
        info!(queue, "Connecting to RabbitMQ");
        let conn = Connection::connect(url, ConnectionProperties::default()).await?;
        let channel = conn.create_channel().await?;

        channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;

        info!(queue, "✅ Connected to RabbitMQ");
        Ok((conn, channel))
    }

    pub async fn new(url: &str, queue: &str) -> Result<Self, QueueError> {
        let (conn, channel) = Self::connect(url, queue).await?;

        Ok(Self {
            url: url.to_string(),
            queue: queue.to_string(),
            conn: Arc::new(Mutex::new(conn)),
            channel: Arc::new(Mutex::new(channel)),
        })
    }

    async fn reconnect(&self) -> Result<(), QueueError> {
        warn!("RabbitMQ connection dropped, reconnecting...");
        let (conn, channel) = Self::connect(&self.url, &self.queue).await?;
        *self.conn.lock().await = conn;
        *self.channel.lock().await = channel;
        Ok(())
    }

    async fn get_internal(&self) -> Result<Option<String>, QueueError> {
        let message = {
            let channel = self.channel.lock().await;
            channel.basic_get(&self.queue, BasicGetOptions::default()).await?
        };

        let Some(message) = message else {
            return Ok(None);
        };

        message.delivery.ack(BasicAckOptions::default()).await?;

        String::from_utf8(message.delivery.data)
            .map(Some)
            .map_err(|e| QueueError::Unavailable(format!("non-UTF-8 payload: {}", e)))
    }

    async fn publish_internal(&self, payload: &[u8]) -> Result<(), QueueError> {
        let channel = self.channel.lock().await;

        channel
            .basic_publish(
                "",
                &self.queue,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default().with_delivery_mode(2), // persistent
            )
            .await?
            .await?;

        Ok(())
    }
}

/// Runs `op`, and on failure reconnects once and runs it again. A failed
/// reconnect is returned as is, leaving the retry to the caller's backoff.
async fn with_reconnect<T, Op, OpFut, Re, ReFut>(action: &str, mut op: Op, reconnect: Re) -> Result<T, QueueError>
where
    Op: FnMut() -> OpFut,
    OpFut: Future<Output = Result<T, QueueError>>,
    Re: FnOnce() -> ReFut,
    ReFut: Future<Output = Result<(), QueueError>>,
{
    match op().await {
        Ok(value) => Ok(value),
        Err(e) => {
            warn!(error = %e, action, "RabbitMQ operation failed, retrying after reconnect");
            reconnect().await?;
            op().await
        }
    }
}

#[async_trait]
impl TaskQueue for RabbitMqService {
    async fn enqueue(&self, payload: &str) -> Result<(), QueueError> {
        with_reconnect("publish", move || self.publish_internal(payload.as_bytes()), move || self.reconnect()).await
    }

    async fn dequeue(&self) -> Result<Option<String>, QueueError> {
        with_reconnect("get", move || self.get_internal(), move || self.reconnect()).await
    }
}
