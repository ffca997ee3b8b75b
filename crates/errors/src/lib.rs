use thiserror::Error;

/// 平台统一错误类型
///
/// 错误分为几大类：校验错误（不重试，直接反馈给调用方）、
/// 资源未找到（任务终态，不重试）、执行/解析错误（任务终态）、
/// 存储和消息队列错误（依赖队列重投递）。
#[derive(Debug, Error)]
pub enum ReconError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("数据库操作错误: {0}")]
    DatabaseOperation(String),

    #[error("项目未找到: {id}")]
    ProjectNotFound { id: i64 },

    #[error("扫描模板未找到: {id}")]
    ProfileNotFound { id: i64 },

    #[error("任务未找到: {id}")]
    TaskNotFound { id: i64 },

    #[error("在模板 '{profile}' 中未找到步骤 '{step}'")]
    StepNotFound { profile: String, step: String },

    #[error("找不到上游步骤 '{step}' 的任务记录")]
    UpstreamTaskNotFound { step: String },

    #[error("任务 {task_id} 的输出结果未找到")]
    TaskOutputNotFound { task_id: i64 },

    #[error("未找到名为 '{name}' 的解析器")]
    ParserNotFound { name: String },

    #[error("命令执行失败: {0}")]
    ExecutionFailed(String),

    #[error("命令执行超时 ({timeout_seconds}s)")]
    ExecutionTimeout { timeout_seconds: u64 },

    #[error("解析输出失败: {0}")]
    ParseError(String),

    #[error("渲染命令模板失败: {0}")]
    TemplateRender(String),

    #[error("消息队列错误: {0}")]
    MessageQueue(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("数据验证失败: {0}")]
    Validation(String),

    #[error("无效的目标值: {0}")]
    InvalidTarget(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 统一的Result类型
pub type ReconResult<T> = Result<T, ReconError>;

impl ReconError {
    pub fn database_error<S: Into<String>>(msg: S) -> Self {
        Self::DatabaseOperation(msg.into())
    }

    pub fn serialization_error<S: Into<String>>(msg: S) -> Self {
        Self::Serialization(msg.into())
    }

    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn validation_error<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// 是否应由消息队列重新投递
    ///
    /// 只有存储类和队列类错误值得重试；其余错误在重投递后
    /// 仍会得到同样的结果，由任务记录承载终态。
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ReconError::Database(_)
                | ReconError::DatabaseOperation(_)
                | ReconError::MessageQueue(_)
        )
    }

    /// 是否为进程级致命错误
    pub fn is_fatal(&self) -> bool {
        matches!(self, ReconError::Configuration(_) | ReconError::Internal(_))
    }
}

impl From<serde_json::Error> for ReconError {
    fn from(err: serde_json::Error) -> Self {
        ReconError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ReconError::DatabaseOperation("连接中断".into()).is_retryable());
        assert!(ReconError::MessageQueue("redis不可达".into()).is_retryable());

        assert!(!ReconError::Validation("缺少初始步骤".into()).is_retryable());
        assert!(!ReconError::StepNotFound {
            profile: "默认模板".into(),
            step: "probe".into()
        }
        .is_retryable());
        assert!(!ReconError::ExecutionTimeout {
            timeout_seconds: 300
        }
        .is_retryable());
        assert!(!ReconError::ParseError("非法JSON".into()).is_retryable());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(ReconError::config_error("缺少数据库地址").is_fatal());
        assert!(!ReconError::TaskNotFound { id: 42 }.is_fatal());
    }

    #[test]
    fn test_error_display() {
        let err = ReconError::StepNotFound {
            profile: "full-recon".into(),
            step: "httpx".into(),
        };
        assert_eq!(err.to_string(), "在模板 'full-recon' 中未找到步骤 'httpx'");

        let err = ReconError::ExecutionTimeout {
            timeout_seconds: 300,
        };
        assert!(err.to_string().contains("300s"));
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{不合法").unwrap_err();
        let err: ReconError = json_err.into();
        assert!(matches!(err, ReconError::Serialization(_)));
    }
}
