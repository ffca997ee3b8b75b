use serde::{Deserialize, Serialize};

use crate::validation::{ConfigResult, ConfigValidator};

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// trace / debug / info / warn / error
    pub level: String,
    /// pretty 或 json
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl ConfigValidator for LoggingConfig {
    fn validate(&self) -> ConfigResult<()> {
        match self.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(crate::ConfigError::Validation(format!(
                    "无效的日志级别: {other}"
                )))
            }
        }
        match self.format.as_str() {
            "pretty" | "json" => Ok(()),
            other => Err(crate::ConfigError::Validation(format!(
                "无效的日志格式: {other}"
            ))),
        }
    }
}
