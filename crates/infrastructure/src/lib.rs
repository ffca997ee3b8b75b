//! # 基础设施层
//!
//! 领域抽象的具体实现：Postgres 仓储、Redis Stream 消息队列、
//! 内存消息队列以及按配置选择实现的工厂。

pub mod database;
pub mod in_memory_queue;
pub mod message_queue_factory;
pub mod redis_stream;

pub use database::postgres::{
    PostgresAssetRepository, PostgresDomainRepository, PostgresProjectRepository,
    PostgresProjectTargetRepository, PostgresScanProfileRepository,
    PostgresTaskOutputRepository, PostgresTaskRepository,
};
pub use database::{create_pool, run_migrations};
pub use in_memory_queue::InMemoryMessageQueue;
pub use message_queue_factory::MessageQueueFactory;
pub use redis_stream::RedisStreamMessageQueue;
