//! Worker 服务
//!
//! 按权重轮询各命名队列，在并发上限内派发消息给已注册的处理器。
//! 终态错误确认出队（任务记录已留痕），可重试错误重新入队。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock, Semaphore};
use tracing::{debug, error, info, warn};

use reconflow_domain::messaging::{Message, MessageQueue};
use reconflow_errors::{ReconError, ReconResult};

use crate::processor::TaskHandler;

/// Worker 服务构建器
pub struct WorkerServiceBuilder {
    worker_id: String,
    message_queue: Arc<dyn MessageQueue>,
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
    default_handler: Option<Arc<dyn TaskHandler>>,
    queues: Vec<(String, u32)>,
    max_concurrent_tasks: usize,
    poll_interval_ms: u64,
}

impl WorkerServiceBuilder {
    pub fn new(worker_id: String, message_queue: Arc<dyn MessageQueue>) -> Self {
        Self {
            worker_id,
            message_queue,
            handlers: HashMap::new(),
            default_handler: None,
            queues: vec![
                ("critical".to_string(), 6),
                ("default".to_string(), 3),
                ("low".to_string(), 1),
            ],
            max_concurrent_tasks: 10,
            poll_interval_ms: 1000,
        }
    }

    /// 注册指定任务类型的处理器
    pub fn register_handler(mut self, task_type: &str, handler: Arc<dyn TaskHandler>) -> Self {
        info!("注册任务处理器: {}", task_type);
        self.handlers.insert(task_type.to_string(), handler);
        self
    }

    /// 注册兜底处理器
    ///
    /// 工作流的任务类型由扫描模板定义，无法在启动时穷举，
    /// 未匹配到具体处理器的消息统一交给兜底处理器。
    pub fn register_default_handler(mut self, handler: Arc<dyn TaskHandler>) -> Self {
        self.default_handler = Some(handler);
        self
    }

    /// 设置消费队列及权重（按传入顺序轮询）
    pub fn queues(mut self, queues: Vec<(String, u32)>) -> Self {
        self.queues = queues;
        self
    }

    pub fn max_concurrent_tasks(mut self, max_concurrent_tasks: usize) -> Self {
        self.max_concurrent_tasks = max_concurrent_tasks;
        self
    }

    pub fn poll_interval_ms(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    pub fn build(self) -> WorkerService {
        WorkerService {
            worker_id: self.worker_id,
            message_queue: self.message_queue,
            handlers: Arc::new(self.handlers),
            default_handler: self.default_handler,
            queues: self.queues,
            semaphore: Arc::new(Semaphore::new(self.max_concurrent_tasks)),
            max_concurrent_tasks: self.max_concurrent_tasks,
            poll_interval_ms: self.poll_interval_ms,
            shutdown_tx: Arc::new(RwLock::new(None)),
        }
    }
}

/// Worker 服务
pub struct WorkerService {
    worker_id: String,
    message_queue: Arc<dyn MessageQueue>,
    handlers: Arc<HashMap<String, Arc<dyn TaskHandler>>>,
    default_handler: Option<Arc<dyn TaskHandler>>,
    queues: Vec<(String, u32)>,
    semaphore: Arc<Semaphore>,
    max_concurrent_tasks: usize,
    poll_interval_ms: u64,
    shutdown_tx: Arc<RwLock<Option<broadcast::Sender<()>>>>,
}

impl WorkerService {
    pub fn builder(worker_id: String, message_queue: Arc<dyn MessageQueue>) -> WorkerServiceBuilder {
        WorkerServiceBuilder::new(worker_id, message_queue)
    }

    /// 启动消费循环，直到收到停止信号
    pub async fn run(&self) -> ReconResult<()> {
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        {
            let mut guard = self.shutdown_tx.write().await;
            if guard.is_some() {
                return Err(ReconError::Internal("Worker服务已在运行".to_string()));
            }
            *guard = Some(shutdown_tx);
        }

        // 确保所有消费队列存在
        for (queue_name, _) in &self.queues {
            self.message_queue.create_queue(queue_name, true).await?;
        }

        info!(
            worker_id = %self.worker_id,
            queues = ?self.queues,
            "Worker已启动，正在等待任务..."
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!(worker_id = %self.worker_id, "收到停止信号，退出消费循环");
                    break;
                }
                consumed = self.poll_once() => {
                    match consumed {
                        Ok(0) => {
                            // 空轮询，稍候再试
                            tokio::time::sleep(Duration::from_millis(self.poll_interval_ms)).await;
                        }
                        Ok(n) => {
                            debug!(count = n, "本轮派发任务数");
                        }
                        Err(e) => {
                            error!(error = %e, "队列轮询出错");
                            tokio::time::sleep(Duration::from_millis(self.poll_interval_ms)).await;
                        }
                    }
                }
            }
        }

        // 等待在途任务结束
        let _ = self
            .semaphore
            .acquire_many(self.max_concurrent_tasks as u32)
            .await;
        Ok(())
    }

    /// 停止服务
    pub async fn stop(&self) {
        if let Some(tx) = self.shutdown_tx.write().await.take() {
            let _ = tx.send(());
        }
    }

    /// 按权重轮询一轮所有队列，返回派发的消息数
    async fn poll_once(&self) -> ReconResult<usize> {
        let mut dispatched = 0;
        for (queue_name, weight) in &self.queues {
            // 权重决定单轮从该队列最多取多少条
            let mut taken = 0u32;
            while taken < *weight {
                let messages = self.message_queue.consume_messages(queue_name).await?;
                if messages.is_empty() {
                    break;
                }
                for message in messages {
                    taken += 1;
                    dispatched += 1;
                    self.dispatch(message).await;
                }
            }
        }
        Ok(dispatched)
    }

    /// 将消息派发给匹配的处理器执行
    async fn dispatch(&self, message: Message) {
        let handler = self
            .handlers
            .get(&message.task_type)
            .cloned()
            .or_else(|| self.default_handler.clone());

        let Some(handler) = handler else {
            warn!(task_type = %message.task_type, "没有可用的处理器，丢弃消息");
            let _ = self.message_queue.nack_message(&message.id, false).await;
            return;
        };

        let permit = match self.semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                error!(error = %e, "并发信号量已关闭，消息重新入队");
                let _ = self.message_queue.nack_message(&message.id, true).await;
                return;
            }
        };
        let queue = self.message_queue.clone();

        tokio::spawn(async move {
            let message_id = message.id.clone();
            match handler.handle(&message).await {
                Ok(()) => {
                    if let Err(e) = queue.ack_message(&message_id).await {
                        warn!(message_id = %message_id, error = %e, "确认消息失败");
                    }
                }
                Err(e) => {
                    let requeue = e.is_retryable();
                    warn!(
                        message_id = %message_id,
                        error = %e,
                        requeue,
                        "任务处理失败"
                    );
                    if let Err(nack_err) = queue.nack_message(&message_id, requeue).await {
                        warn!(message_id = %message_id, error = %nack_err, "拒绝消息失败");
                    }
                }
            }
            drop(permit);
        });
    }
}
