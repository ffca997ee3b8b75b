//! 内存消息队列实现
//!
//! 使用 Tokio channel 实现的进程内消息队列，用于嵌入式部署与测试。
//! 语义与 Redis Stream 实现一致：消费后未确认的消息保留在
//! 未确认表中，nack(requeue=true) 重新入队。

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::debug;

use reconflow_domain::messaging::{Message, MessageQueue};
use reconflow_errors::{ReconError, ReconResult};

struct QueueChannels {
    sender: mpsc::UnboundedSender<Message>,
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<Message>>>,
    size: Arc<AtomicU64>,
}

/// 内存消息队列
pub struct InMemoryMessageQueue {
    queues: Arc<RwLock<HashMap<String, Arc<QueueChannels>>>>,
    /// 已消费未确认的消息：消息ID -> (队列名, 消息)
    unacked: Arc<Mutex<HashMap<String, (String, Message)>>>,
    /// 单次消费的最大消息数
    batch_size: usize,
}

impl Default for InMemoryMessageQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryMessageQueue {
    pub fn new() -> Self {
        Self {
            queues: Arc::new(RwLock::new(HashMap::new())),
            unacked: Arc::new(Mutex::new(HashMap::new())),
            batch_size: 10,
        }
    }

    async fn get_or_create_queue(&self, queue_name: &str) -> Arc<QueueChannels> {
        {
            let queues = self.queues.read().await;
            if let Some(channels) = queues.get(queue_name) {
                return channels.clone();
            }
        }

        let mut queues = self.queues.write().await;
        queues
            .entry(queue_name.to_string())
            .or_insert_with(|| {
                debug!("Creating in-memory queue: {}", queue_name);
                let (sender, receiver) = mpsc::unbounded_channel();
                Arc::new(QueueChannels {
                    sender,
                    receiver: Arc::new(Mutex::new(receiver)),
                    size: Arc::new(AtomicU64::new(0)),
                })
            })
            .clone()
    }
}

#[async_trait]
impl MessageQueue for InMemoryMessageQueue {
    async fn publish_message(&self, queue: &str, message: &Message) -> ReconResult<()> {
        let channels = self.get_or_create_queue(queue).await;
        channels
            .sender
            .send(message.clone())
            .map_err(|e| ReconError::MessageQueue(format!("发送消息到队列 {queue} 失败: {e}")))?;
        channels.size.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn consume_messages(&self, queue: &str) -> ReconResult<Vec<Message>> {
        let channels = self.get_or_create_queue(queue).await;
        let mut receiver = channels.receiver.lock().await;

        let mut messages = Vec::new();
        while messages.len() < self.batch_size {
            match receiver.try_recv() {
                Ok(message) => {
                    channels.size.fetch_sub(1, Ordering::SeqCst);
                    messages.push(message);
                }
                Err(_) => break,
            }
        }
        drop(receiver);

        if !messages.is_empty() {
            let mut unacked = self.unacked.lock().await;
            for message in &messages {
                unacked.insert(message.id.clone(), (queue.to_string(), message.clone()));
            }
        }

        Ok(messages)
    }

    async fn ack_message(&self, message_id: &str) -> ReconResult<()> {
        self.unacked.lock().await.remove(message_id);
        Ok(())
    }

    async fn nack_message(&self, message_id: &str, requeue: bool) -> ReconResult<()> {
        let entry = self.unacked.lock().await.remove(message_id);
        if requeue {
            if let Some((queue, mut message)) = entry {
                message.increment_retry();
                self.publish_message(&queue, &message).await?;
            }
        }
        Ok(())
    }

    async fn create_queue(&self, queue: &str, _durable: bool) -> ReconResult<()> {
        self.get_or_create_queue(queue).await;
        Ok(())
    }

    async fn get_queue_size(&self, queue: &str) -> ReconResult<u64> {
        let channels = self.get_or_create_queue(queue).await;
        Ok(channels.size.load(Ordering::SeqCst))
    }

    async fn purge_queue(&self, queue: &str) -> ReconResult<()> {
        let channels = self.get_or_create_queue(queue).await;
        let mut receiver = channels.receiver.lock().await;
        while receiver.try_recv().is_ok() {}
        channels.size.store(0, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconflow_domain::messaging::WorkflowPayload;

    fn sample_message(step: &str) -> Message {
        Message::workflow(
            "discovery:subdomain:subfinder",
            &WorkflowPayload {
                project_id: 1,
                parent_task_id: 1,
                scan_profile_id: 1,
                current_step_name: step.to_string(),
                input: "example.com".to_string(),
                domain_id: None,
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_publish_consume_ack() {
        let queue = InMemoryMessageQueue::new();
        queue.publish_message("default", &sample_message("sub")).await.unwrap();
        assert_eq!(queue.get_queue_size("default").await.unwrap(), 1);

        let messages = queue.consume_messages("default").await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(queue.get_queue_size("default").await.unwrap(), 0);

        queue.ack_message(&messages[0].id).await.unwrap();
        assert!(queue.consume_messages("default").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_nack_requeues_with_incremented_retry() {
        let queue = InMemoryMessageQueue::new();
        queue.publish_message("default", &sample_message("sub")).await.unwrap();

        let messages = queue.consume_messages("default").await.unwrap();
        queue.nack_message(&messages[0].id, true).await.unwrap();

        let redelivered = queue.consume_messages("default").await.unwrap();
        assert_eq!(redelivered.len(), 1);
        assert_eq!(redelivered[0].retry_count, 1);
        assert_eq!(redelivered[0].id, messages[0].id);
    }

    #[tokio::test]
    async fn test_nack_without_requeue_drops_message() {
        let queue = InMemoryMessageQueue::new();
        queue.publish_message("default", &sample_message("sub")).await.unwrap();

        let messages = queue.consume_messages("default").await.unwrap();
        queue.nack_message(&messages[0].id, false).await.unwrap();
        assert!(queue.consume_messages("default").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_queues_are_isolated() {
        let queue = InMemoryMessageQueue::new();
        queue.publish_message("critical", &sample_message("a")).await.unwrap();
        queue.publish_message("low", &sample_message("b")).await.unwrap();

        assert_eq!(queue.consume_messages("critical").await.unwrap().len(), 1);
        assert_eq!(queue.consume_messages("low").await.unwrap().len(), 1);
        assert!(queue.consume_messages("default").await.unwrap().is_empty());
    }
}
