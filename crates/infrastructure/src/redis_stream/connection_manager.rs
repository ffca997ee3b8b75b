use redis::aio::MultiplexedConnection;
use redis::Client;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, warn};

use reconflow_config::RedisConfig;
use reconflow_errors::{ReconError, ReconResult};

/// Redis 连接管理器
///
/// 负责建立和缓存到 Redis 的多路复用连接，带重试机制。
pub struct RedisConnectionManager {
    client: Client,
    config: RedisConfig,
    connection: Mutex<Option<MultiplexedConnection>>,
}

impl RedisConnectionManager {
    pub async fn new(config: RedisConfig) -> ReconResult<Self> {
        let redis_url = config.build_connection_url();
        let client = Client::open(redis_url)
            .map_err(|e| ReconError::MessageQueue(format!("Failed to create Redis client: {e}")))?;

        let manager = Self {
            client,
            config,
            connection: Mutex::new(None),
        };

        manager.ping().await?;
        debug!(
            "Successfully connected to Redis at {}:{}",
            manager.config.host, manager.config.port
        );
        Ok(manager)
    }

    /// 获取连接（缓存复用，失效时带重试重建）
    pub async fn get_connection(&self) -> ReconResult<MultiplexedConnection> {
        let mut guard = self.connection.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }

        let mut last_error = None;
        for attempt in 0..self.config.max_retry_attempts {
            match self.client.get_multiplexed_async_connection().await {
                Ok(conn) => {
                    if attempt > 0 {
                        debug!("Reconnected to Redis after {} attempts", attempt + 1);
                    }
                    *guard = Some(conn.clone());
                    return Ok(conn);
                }
                Err(e) => {
                    warn!(
                        "Failed to connect to Redis (attempt {}/{}): {}",
                        attempt + 1,
                        self.config.max_retry_attempts,
                        e
                    );
                    last_error = Some(e);
                    if attempt + 1 < self.config.max_retry_attempts {
                        sleep(Duration::from_secs(self.config.retry_delay_seconds)).await;
                    }
                }
            }
        }

        Err(ReconError::MessageQueue(format!(
            "Failed to connect to Redis after {} attempts: {}",
            self.config.max_retry_attempts,
            last_error.map_or_else(|| "unknown".to_string(), |e| e.to_string())
        )))
    }

    /// 废弃缓存的连接，下次使用时重建
    pub async fn invalidate(&self) {
        *self.connection.lock().await = None;
    }

    /// PING 测试连接
    pub async fn ping(&self) -> ReconResult<()> {
        let mut conn = self.get_connection().await?;
        let response: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| ReconError::MessageQueue(format!("Redis PING failed: {e}")))?;
        if response != "PONG" {
            return Err(ReconError::MessageQueue(format!(
                "Unexpected PING response: {response}"
            )));
        }
        Ok(())
    }

    pub fn config(&self) -> &RedisConfig {
        &self.config
    }
}
