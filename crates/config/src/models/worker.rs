use serde::{Deserialize, Serialize};

use crate::validation::{ConfigResult, ConfigValidator, ValidationUtils};

/// 队列消费权重
///
/// worker 按权重轮询各命名队列：一轮之内每个队列至多取
/// `weight` 条消息，高权重队列优先被消费。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueWeight {
    pub name: String,
    pub weight: u32,
}

/// Worker 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub worker_id: String,
    /// 并发处理任务的上限
    pub max_concurrent_tasks: usize,
    /// 各队列的消费权重
    pub queues: Vec<QueueWeight>,
    /// 队列轮询间隔（毫秒）
    pub poll_interval_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: "worker-001".to_string(),
            max_concurrent_tasks: 10,
            queues: vec![
                QueueWeight {
                    name: "critical".to_string(),
                    weight: 6,
                },
                QueueWeight {
                    name: "default".to_string(),
                    weight: 3,
                },
                QueueWeight {
                    name: "low".to_string(),
                    weight: 1,
                },
            ],
            poll_interval_ms: 1000,
        }
    }
}

impl ConfigValidator for WorkerConfig {
    fn validate(&self) -> ConfigResult<()> {
        ValidationUtils::validate_not_empty(&self.worker_id, "worker.worker_id")?;
        ValidationUtils::validate_positive(
            self.max_concurrent_tasks as u64,
            "worker.max_concurrent_tasks",
        )?;
        if self.queues.is_empty() {
            return Err(crate::ConfigError::Validation(
                "worker.queues 至少需要一个队列".to_string(),
            ));
        }
        for queue in &self.queues {
            ValidationUtils::validate_not_empty(&queue.name, "worker.queues[].name")?;
            ValidationUtils::validate_positive(queue.weight as u64, "worker.queues[].weight")?;
        }
        Ok(())
    }
}

/// 命令执行器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// 单条命令的默认超时（秒）
    pub default_timeout_seconds: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_timeout_seconds: 300,
        }
    }
}

impl ConfigValidator for ExecutorConfig {
    fn validate(&self) -> ConfigResult<()> {
        ValidationUtils::validate_positive(
            self.default_timeout_seconds,
            "executor.default_timeout_seconds",
        )
    }
}
