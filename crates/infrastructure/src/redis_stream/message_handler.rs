use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use reconflow_domain::messaging::Message;
use reconflow_errors::{ReconError, ReconResult};

use super::connection_manager::RedisConnectionManager;

/// 消息体在 Stream 条目中的字段名
const DATA_FIELD: &str = "data";

/// Redis Stream 消息读写
///
/// 消费顺序：先领取本消费者的未确认消息（重投递），再读取新消息。
/// 消息ID到 Stream 条目ID 的映射保存在内存中供 ack/nack 使用。
pub struct RedisMessageHandler {
    connection_manager: Arc<RedisConnectionManager>,
    /// 消息ID -> (队列名, stream条目ID)
    message_id_mapping: Mutex<HashMap<String, (String, String)>>,
    batch_size: usize,
}

impl RedisMessageHandler {
    pub fn new(connection_manager: Arc<RedisConnectionManager>) -> Self {
        Self {
            connection_manager,
            message_id_mapping: Mutex::new(HashMap::new()),
            batch_size: 10,
        }
    }

    fn group_name(&self, queue: &str) -> String {
        format!(
            "{}_{}",
            self.connection_manager.config().consumer_group_prefix,
            queue
        )
    }

    fn consumer_id(&self) -> &str {
        &self.connection_manager.config().consumer_id
    }

    fn validate_queue_name(queue: &str) -> ReconResult<()> {
        if queue.is_empty() {
            return Err(ReconError::MessageQueue(
                "Queue name cannot be empty".to_string(),
            ));
        }
        if queue.contains(' ') || queue.contains('\n') {
            return Err(ReconError::MessageQueue(
                "Queue name contains invalid characters".to_string(),
            ));
        }
        Ok(())
    }

    pub async fn publish_message(&self, queue: &str, message: &Message) -> ReconResult<()> {
        Self::validate_queue_name(queue)?;

        let body = serde_json::to_string(message).map_err(|e| {
            ReconError::Serialization(format!("Failed to serialize message {}: {e}", message.id))
        })?;

        let mut conn = self.connection_manager.get_connection().await?;
        let stream_id: String = conn
            .xadd(queue, "*", &[(DATA_FIELD, body.as_str())])
            .await
            .map_err(|e| {
                ReconError::MessageQueue(format!("XADD to queue {queue} failed: {e}"))
            })?;

        debug!(
            "Published message {} to queue {} as {}",
            message.id, queue, stream_id
        );
        Ok(())
    }

    pub async fn consume_messages(&self, queue: &str) -> ReconResult<Vec<Message>> {
        Self::validate_queue_name(queue)?;

        let mut all_messages = Vec::new();
        // 未确认的重投递消息优先
        let mut pending = self.read_group(queue, "0").await?;
        all_messages.append(&mut pending);
        if all_messages.len() < self.batch_size {
            let mut fresh = self.read_group(queue, ">").await?;
            all_messages.append(&mut fresh);
        }
        Ok(all_messages)
    }

    async fn read_group(&self, queue: &str, cursor: &str) -> ReconResult<Vec<Message>> {
        let group = self.group_name(queue);
        let options = StreamReadOptions::default()
            .group(&group, self.consumer_id())
            .count(self.batch_size);

        let mut conn = self.connection_manager.get_connection().await?;
        let reply: StreamReadReply = conn
            .xread_options(&[queue], &[cursor], &options)
            .await
            .map_err(|e| {
                ReconError::MessageQueue(format!("XREADGROUP on queue {queue} failed: {e}"))
            })?;

        let mut messages = Vec::new();
        for stream_key in reply.keys {
            for entry in stream_key.ids {
                let Some(value) = entry.map.get(DATA_FIELD) else {
                    warn!("Stream entry {} has no data field, skipping", entry.id);
                    continue;
                };
                let body: String = redis::from_redis_value(value).map_err(|e| {
                    ReconError::MessageQueue(format!("Invalid stream entry {}: {e}", entry.id))
                })?;
                match serde_json::from_str::<Message>(&body) {
                    Ok(message) => {
                        if let Ok(mut mapping) = self.message_id_mapping.lock() {
                            mapping.insert(
                                message.id.clone(),
                                (queue.to_string(), entry.id.clone()),
                            );
                        }
                        messages.push(message);
                    }
                    Err(e) => {
                        warn!("Failed to deserialize stream entry {}: {}", entry.id, e);
                    }
                }
            }
        }
        Ok(messages)
    }

    pub async fn ack_message(&self, message_id: &str) -> ReconResult<()> {
        let (queue, stream_id) = self.take_mapping(message_id)?;
        let group = self.group_name(&queue);

        let mut conn = self.connection_manager.get_connection().await?;
        let acked: i64 = conn
            .xack(&queue, &group, &[&stream_id])
            .await
            .map_err(|e| ReconError::MessageQueue(format!("XACK failed: {e}")))?;

        if acked == 0 {
            warn!(
                "Message {} was not acknowledged (possibly already processed)",
                message_id
            );
        }
        Ok(())
    }

    pub async fn nack_message(&self, message_id: &str, requeue: bool) -> ReconResult<()> {
        let (queue, stream_id) = self.take_mapping(message_id)?;
        let group = self.group_name(&queue);
        let mut conn = self.connection_manager.get_connection().await?;

        if requeue {
            // 取回原始消息体，递增重试计数后重新入队
            let raw: Vec<(String, HashMap<String, String>)> = redis::cmd("XRANGE")
                .arg(&queue)
                .arg(&stream_id)
                .arg(&stream_id)
                .query_async(&mut conn)
                .await
                .map_err(|e| ReconError::MessageQueue(format!("XRANGE failed: {e}")))?;
            let entries: Vec<HashMap<String, String>> =
                raw.into_iter().map(|(_, fields)| fields).collect();

            if let Some(fields) = entries.first() {
                if let Some(body) = fields.get(DATA_FIELD) {
                    if let Ok(mut message) = serde_json::from_str::<Message>(body) {
                        message.increment_retry();
                        let body = serde_json::to_string(&message)
                            .map_err(|e| ReconError::Serialization(e.to_string()))?;
                        let _: String = conn
                            .xadd(&queue, "*", &[(DATA_FIELD, body.as_str())])
                            .await
                            .map_err(|e| {
                                ReconError::MessageQueue(format!("Requeue XADD failed: {e}"))
                            })?;
                    }
                }
            }
        }

        let _: i64 = conn
            .xack(&queue, &group, &[&stream_id])
            .await
            .map_err(|e| ReconError::MessageQueue(format!("XACK failed: {e}")))?;

        debug!("Nacked message {} (requeue: {})", message_id, requeue);
        Ok(())
    }

    fn take_mapping(&self, message_id: &str) -> ReconResult<(String, String)> {
        let mut mapping = self.message_id_mapping.lock().map_err(|e| {
            ReconError::MessageQueue(format!("Failed to lock message mapping: {e}"))
        })?;
        mapping.remove(message_id).ok_or_else(|| {
            ReconError::MessageQueue(format!("Message ID {message_id} not found in mapping"))
        })
    }
}
