//! 消息队列抽象与工作流消息定义

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use reconflow_errors::ReconResult;

/// 工作流任务载荷
///
/// 队列消息携带的步骤执行上下文。`input` 为空时由处理器从上游
/// 任务输出中解析；`domain_id` 在扇出子任务中携带触发该子任务的
/// 域名记录 ID，用于资产与域名的关联。
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkflowPayload {
    pub project_id: i64,
    pub parent_task_id: i64,
    pub scan_profile_id: i64,
    pub current_step_name: String,
    #[serde(default)]
    pub input: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_id: Option<i64>,
}

/// 队列消息
///
/// `task_type` 为路由键，由扫描模板的步骤定义；处理器按
/// `task_type` 注册。`retry_count` 由队列实现维护。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub task_type: String,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub retry_count: i32,
    pub correlation_id: Option<String>,
}

impl Message {
    /// 构造一条工作流步骤消息
    pub fn workflow(task_type: &str, payload: &WorkflowPayload) -> ReconResult<Self> {
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            task_type: task_type.to_string(),
            payload: serde_json::to_value(payload)?,
            timestamp: Utc::now(),
            retry_count: 0,
            correlation_id: None,
        })
    }

    /// 解出工作流载荷
    pub fn workflow_payload(&self) -> ReconResult<WorkflowPayload> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }

    pub fn increment_retry(&mut self) {
        self.retry_count += 1;
    }
}

/// 消息队列抽象接口
///
/// 语义要求：至少一次投递；nack(requeue=true) 触发重投递；
/// ack 确认消费完成。
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// 发布消息到指定队列
    async fn publish_message(&self, queue: &str, message: &Message) -> ReconResult<()>;

    /// 从指定队列消费一批消息
    async fn consume_messages(&self, queue: &str) -> ReconResult<Vec<Message>>;

    /// 确认消息处理完成
    async fn ack_message(&self, message_id: &str) -> ReconResult<()>;

    /// 拒绝消息，可选择重新入队
    async fn nack_message(&self, message_id: &str, requeue: bool) -> ReconResult<()>;

    /// 创建队列（幂等）
    async fn create_queue(&self, queue: &str, durable: bool) -> ReconResult<()>;

    /// 获取队列中的消息数量
    async fn get_queue_size(&self, queue: &str) -> ReconResult<u64>;

    /// 清空队列
    async fn purge_queue(&self, queue: &str) -> ReconResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workflow_message_round_trip() {
        let payload = WorkflowPayload {
            project_id: 7,
            parent_task_id: 3,
            scan_profile_id: 1,
            current_step_name: "sub".to_string(),
            input: "example.com".to_string(),
            domain_id: None,
        };
        let message = Message::workflow("discovery:subdomain:subfinder", &payload).unwrap();
        assert_eq!(message.task_type, "discovery:subdomain:subfinder");
        assert_eq!(message.retry_count, 0);
        assert_eq!(message.workflow_payload().unwrap(), payload);
    }

    #[test]
    fn test_payload_optional_fields() {
        // domain_id 缺省、input 缺省都可解出
        let payload: WorkflowPayload = serde_json::from_str(
            r#"{"project_id":1,"parent_task_id":2,"scan_profile_id":3,"current_step_name":"sub"}"#,
        )
        .unwrap();
        assert!(payload.input.is_empty());
        assert_eq!(payload.domain_id, None);

        // domain_id 为 None 时不应出现在序列化结果中
        let json = serde_json::to_string(&payload).unwrap();
        assert!(!json.contains("domain_id"));
    }
}
