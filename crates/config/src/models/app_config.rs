use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    api::ApiConfig, database::DatabaseConfig, logging::LoggingConfig,
    message_queue::MessageQueueConfig, worker::ExecutorConfig, worker::WorkerConfig,
};
use crate::validation::ConfigValidator;

/// 应用总配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub message_queue: MessageQueueConfig,
    pub worker: WorkerConfig,
    pub executor: ExecutorConfig,
    pub api: ApiConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// 加载配置
    ///
    /// 未指定路径时按默认位置查找；文件之上再叠加
    /// `RECONFLOW_` 前缀的环境变量（`__` 分隔层级），
    /// 例如 `RECONFLOW_DATABASE__URL`。
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if !Path::new(path).exists() {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        } else {
            let default_paths = [
                "config/reconflow.toml",
                "reconflow.toml",
                "/etc/reconflow/config.toml",
            ];
            for path in &default_paths {
                if Path::new(path).exists() {
                    builder = builder.add_source(File::new(path, FileFormat::Toml));
                    break;
                }
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("RECONFLOW")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder.build().context("构建配置失败")?;
        let app_config: AppConfig = settings
            .try_deserialize()
            .context("解析配置失败")?;

        app_config
            .validate()
            .map_err(|e| anyhow::anyhow!("{e}"))?;

        Ok(app_config)
    }
}

impl ConfigValidator for AppConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        self.database.validate()?;
        self.message_queue.validate()?;
        self.worker.validate()?;
        self.executor.validate()?;
        self.api.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::message_queue::MessageQueueType;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.worker.max_concurrent_tasks, 10);
        assert_eq!(config.executor.default_timeout_seconds, 300);
    }

    #[test]
    fn test_default_queue_weights() {
        let config = AppConfig::default();
        let weights: Vec<(&str, u32)> = config
            .worker
            .queues
            .iter()
            .map(|q| (q.name.as_str(), q.weight))
            .collect();
        assert_eq!(
            weights,
            vec![("critical", 6), ("default", 3), ("low", 1)]
        );
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.worker.max_concurrent_tasks = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.database.url = "mysql://nope".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_in_memory_queue_needs_no_redis() {
        let mut config = AppConfig::default();
        config.message_queue = MessageQueueConfig::in_memory_default();
        config.message_queue.redis.host.clear();
        assert_eq!(config.message_queue.r#type, MessageQueueType::InMemory);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_redis_url_building() {
        let mut redis = crate::RedisConfig::default();
        assert_eq!(redis.build_connection_url(), "redis://127.0.0.1:6379/0");
        redis.password = Some("s3cret".to_string());
        redis.database = 2;
        assert_eq!(
            redis.build_connection_url(),
            "redis://:s3cret@127.0.0.1:6379/2"
        );
    }
}
