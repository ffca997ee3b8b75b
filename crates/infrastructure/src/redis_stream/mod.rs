//! Redis Stream 消息队列实现
//!
//! 每个队列对应一个 Stream 与一个消费组；消费顺序为先领取
//! 本消费者的未确认消息，再读取新消息，保证至少一次投递。

mod connection_manager;
mod message_handler;
mod stream_operations;

pub use connection_manager::RedisConnectionManager;

use async_trait::async_trait;
use std::sync::Arc;

use reconflow_config::RedisConfig;
use reconflow_domain::messaging::{Message, MessageQueue};
use reconflow_errors::ReconResult;

use message_handler::RedisMessageHandler;
use stream_operations::RedisStreamOperations;

pub struct RedisStreamMessageQueue {
    connection_manager: Arc<RedisConnectionManager>,
    message_handler: RedisMessageHandler,
    stream_operations: RedisStreamOperations,
}

impl RedisStreamMessageQueue {
    pub async fn new(config: RedisConfig) -> ReconResult<Self> {
        let connection_manager = Arc::new(RedisConnectionManager::new(config).await?);
        let message_handler = RedisMessageHandler::new(connection_manager.clone());
        let stream_operations = RedisStreamOperations::new(connection_manager.clone());

        Ok(Self {
            connection_manager,
            message_handler,
            stream_operations,
        })
    }

    /// 健康检查
    pub async fn health_check(&self) -> ReconResult<()> {
        self.connection_manager.ping().await
    }
}

#[async_trait]
impl MessageQueue for RedisStreamMessageQueue {
    async fn publish_message(&self, queue: &str, message: &Message) -> ReconResult<()> {
        self.message_handler.publish_message(queue, message).await
    }

    async fn consume_messages(&self, queue: &str) -> ReconResult<Vec<Message>> {
        self.message_handler.consume_messages(queue).await
    }

    async fn ack_message(&self, message_id: &str) -> ReconResult<()> {
        self.message_handler.ack_message(message_id).await
    }

    async fn nack_message(&self, message_id: &str, requeue: bool) -> ReconResult<()> {
        self.message_handler.nack_message(message_id, requeue).await
    }

    async fn create_queue(&self, queue: &str, durable: bool) -> ReconResult<()> {
        self.stream_operations.create_queue(queue, durable).await
    }

    async fn get_queue_size(&self, queue: &str) -> ReconResult<u64> {
        self.stream_operations.get_queue_size(queue).await
    }

    async fn purge_queue(&self, queue: &str) -> ReconResult<()> {
        self.stream_operations.purge_queue(queue).await
    }
}
