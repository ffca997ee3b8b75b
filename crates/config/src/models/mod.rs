mod api;
mod app_config;
mod database;
mod logging;
mod message_queue;
mod worker;

pub use api::ApiConfig;
pub use app_config::AppConfig;
pub use database::DatabaseConfig;
pub use logging::LoggingConfig;
pub use message_queue::{MessageQueueConfig, MessageQueueType, RedisConfig};
pub use worker::{ExecutorConfig, QueueWeight, WorkerConfig};
