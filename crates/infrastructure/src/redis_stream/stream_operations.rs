use redis::AsyncCommands;
use std::sync::Arc;
use tracing::{debug, info, warn};

use reconflow_errors::{ReconError, ReconResult};

use super::connection_manager::RedisConnectionManager;

/// Stream 与消费组的管理操作
pub struct RedisStreamOperations {
    connection_manager: Arc<RedisConnectionManager>,
}

impl RedisStreamOperations {
    pub fn new(connection_manager: Arc<RedisConnectionManager>) -> Self {
        Self { connection_manager }
    }

    fn group_name(&self, queue: &str) -> String {
        format!(
            "{}_{}",
            self.connection_manager.config().consumer_group_prefix,
            queue
        )
    }

    /// 创建 Stream 与消费组（幂等）
    pub async fn create_queue(&self, queue: &str, durable: bool) -> ReconResult<()> {
        debug!("Creating queue: {} (durable: {})", queue, durable);
        let group = self.group_name(queue);
        let mut conn = self.connection_manager.get_connection().await?;

        let result: Result<String, redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(queue)
            .arg(&group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => {
                info!("Created queue '{}' with consumer group '{}'", queue, group);
                Ok(())
            }
            // 消费组已存在视为成功
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group '{}' already exists", group);
                Ok(())
            }
            Err(e) => Err(ReconError::MessageQueue(format!(
                "Failed to create queue {queue}: {e}"
            ))),
        }
    }

    pub async fn get_queue_size(&self, queue: &str) -> ReconResult<u64> {
        let mut conn = self.connection_manager.get_connection().await?;
        let size: u64 = conn
            .xlen(queue)
            .await
            .map_err(|e| ReconError::MessageQueue(format!("XLEN on {queue} failed: {e}")))?;
        Ok(size)
    }

    pub async fn purge_queue(&self, queue: &str) -> ReconResult<()> {
        let mut conn = self.connection_manager.get_connection().await?;
        let deleted: i64 = conn
            .del(queue)
            .await
            .map_err(|e| ReconError::MessageQueue(format!("DEL on {queue} failed: {e}")))?;
        if deleted == 0 {
            warn!("Queue {} was not found or already empty", queue);
        }
        // 重建 Stream 与消费组
        self.create_queue(queue, true).await
    }
}
