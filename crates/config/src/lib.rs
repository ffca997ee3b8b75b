//! # 应用配置
//!
//! TOML 配置文件 + `RECONFLOW_` 前缀环境变量的分层加载，
//! 所有配置模型都带默认值并实现 [`ConfigValidator`]。

pub mod models;
pub mod validation;

pub use models::{
    ApiConfig, AppConfig, DatabaseConfig, ExecutorConfig, LoggingConfig, MessageQueueConfig,
    MessageQueueType, QueueWeight, RedisConfig, WorkerConfig,
};
pub use validation::{ConfigError, ConfigResult, ConfigValidator, ValidationUtils};
