//! 按配置选择消息队列实现

use std::sync::Arc;
use tracing::info;

use reconflow_config::{MessageQueueConfig, MessageQueueType};
use reconflow_domain::messaging::MessageQueue;
use reconflow_errors::ReconResult;

use crate::in_memory_queue::InMemoryMessageQueue;
use crate::redis_stream::RedisStreamMessageQueue;

pub struct MessageQueueFactory;

impl MessageQueueFactory {
    pub async fn create(config: &MessageQueueConfig) -> ReconResult<Arc<dyn MessageQueue>> {
        match config.r#type {
            MessageQueueType::RedisStream => {
                info!(
                    "使用 Redis Stream 消息队列: {}:{}",
                    config.redis.host, config.redis.port
                );
                let queue = RedisStreamMessageQueue::new(config.redis.clone()).await?;
                Ok(Arc::new(queue))
            }
            MessageQueueType::InMemory => {
                info!("使用内存消息队列");
                Ok(Arc::new(InMemoryMessageQueue::new()))
            }
        }
    }
}
