//! 配置校验基础设施

/// 配置错误
#[derive(Debug)]
pub enum ConfigError {
    Validation(String),
    Load(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Validation(msg) => write!(f, "配置校验失败: {msg}"),
            ConfigError::Load(msg) => write!(f, "配置加载失败: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// 配置模型的统一校验接口
pub trait ConfigValidator {
    fn validate(&self) -> ConfigResult<()>;
}

/// 常用校验工具
pub struct ValidationUtils;

impl ValidationUtils {
    pub fn validate_not_empty(value: &str, field: &str) -> ConfigResult<()> {
        if value.trim().is_empty() {
            return Err(ConfigError::Validation(format!("{field} 不能为空")));
        }
        Ok(())
    }

    pub fn validate_port(port: u16) -> ConfigResult<()> {
        if port == 0 {
            return Err(ConfigError::Validation("端口号不能为 0".to_string()));
        }
        Ok(())
    }

    pub fn validate_positive(value: u64, field: &str) -> ConfigResult<()> {
        if value == 0 {
            return Err(ConfigError::Validation(format!("{field} 必须大于 0")));
        }
        Ok(())
    }
}
