use serde::{Deserialize, Serialize};

use crate::validation::{ConfigResult, ConfigValidator, ValidationUtils};

/// 数据库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout_seconds: u64,
    pub idle_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/reconflow".to_string(),
            max_connections: 10,
            min_connections: 1,
            connection_timeout_seconds: 30,
            idle_timeout_seconds: 600,
        }
    }
}

impl ConfigValidator for DatabaseConfig {
    fn validate(&self) -> ConfigResult<()> {
        ValidationUtils::validate_not_empty(&self.url, "database.url")?;
        if !self.url.starts_with("postgres://") && !self.url.starts_with("postgresql://") {
            return Err(crate::ConfigError::Validation(
                "database.url 必须以 postgres:// 或 postgresql:// 开头".to_string(),
            ));
        }
        ValidationUtils::validate_positive(self.max_connections as u64, "database.max_connections")?;
        Ok(())
    }
}
