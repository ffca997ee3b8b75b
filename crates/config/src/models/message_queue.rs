use serde::{Deserialize, Serialize};

use crate::validation::{ConfigResult, ConfigValidator, ValidationUtils};

/// 消息队列实现类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageQueueType {
    RedisStream,
    InMemory,
}

/// Redis 连接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub database: i64,
    pub password: Option<String>,
    pub connection_timeout_seconds: u64,
    pub max_retry_attempts: u32,
    pub retry_delay_seconds: u64,
    pub consumer_group_prefix: String,
    pub consumer_id: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            database: 0,
            password: None,
            connection_timeout_seconds: 30,
            max_retry_attempts: 3,
            retry_delay_seconds: 1,
            consumer_group_prefix: "reconflow".to_string(),
            consumer_id: "worker-default".to_string(),
        }
    }
}

impl RedisConfig {
    /// 构建 Redis 连接 URL
    pub fn build_connection_url(&self) -> String {
        if let Some(password) = &self.password {
            format!(
                "redis://:{}@{}:{}/{}",
                password, self.host, self.port, self.database
            )
        } else {
            format!("redis://{}:{}/{}", self.host, self.port, self.database)
        }
    }
}

impl ConfigValidator for RedisConfig {
    fn validate(&self) -> ConfigResult<()> {
        ValidationUtils::validate_not_empty(&self.host, "message_queue.redis.host")?;
        ValidationUtils::validate_port(self.port)?;
        ValidationUtils::validate_positive(
            self.max_retry_attempts as u64,
            "message_queue.redis.max_retry_attempts",
        )?;
        Ok(())
    }
}

/// 消息队列配置
///
/// 工作流任务按优先级路由到多个命名队列，worker 侧按权重消费。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageQueueConfig {
    pub r#type: MessageQueueType,
    pub redis: RedisConfig,
    /// 工作流任务的默认入队队列
    pub default_queue: String,
}

impl Default for MessageQueueConfig {
    fn default() -> Self {
        Self {
            r#type: MessageQueueType::RedisStream,
            redis: RedisConfig::default(),
            default_queue: "default".to_string(),
        }
    }
}

impl MessageQueueConfig {
    /// 内存队列配置，用于嵌入式运行与测试
    pub fn in_memory_default() -> Self {
        Self {
            r#type: MessageQueueType::InMemory,
            redis: RedisConfig::default(),
            default_queue: "default".to_string(),
        }
    }
}

impl ConfigValidator for MessageQueueConfig {
    fn validate(&self) -> ConfigResult<()> {
        ValidationUtils::validate_not_empty(&self.default_queue, "message_queue.default_queue")?;
        if self.r#type == MessageQueueType::RedisStream {
            self.redis.validate()?;
        }
        Ok(())
    }
}
