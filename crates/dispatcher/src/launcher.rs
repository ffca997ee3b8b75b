//! 扫描启动器
//!
//! 在一个数据库事务内创建顶级工作流任务并派发第一步的队列消息；
//! 任何一条消息发布失败都会回滚事务，不产生半启动的工作流。

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{info, instrument};

use reconflow_domain::entities::{TaskStatus, TASK_TYPE_WORKFLOW};
use reconflow_domain::messaging::{Message, MessageQueue, WorkflowPayload};
use reconflow_domain::repositories::ScanProfileRepository;
use reconflow_errors::{ReconError, ReconResult};

/// 扫描启动请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchScanRequest {
    pub project_id: i64,
    pub scan_profile_id: i64,
    pub initial_inputs: Vec<String>,
}

/// 扫描启动器
pub struct ScanLauncher {
    pool: PgPool,
    profile_repo: Arc<dyn ScanProfileRepository>,
    queue: Arc<dyn MessageQueue>,
    default_queue: String,
}

impl ScanLauncher {
    pub fn new(
        pool: PgPool,
        profile_repo: Arc<dyn ScanProfileRepository>,
        queue: Arc<dyn MessageQueue>,
    ) -> Self {
        Self {
            pool,
            profile_repo,
            queue,
            default_queue: "default".to_string(),
        }
    }

    pub fn with_default_queue(mut self, queue_name: impl Into<String>) -> Self {
        self.default_queue = queue_name.into();
        self
    }

    /// 启动一次扫描工作流，返回顶级任务ID
    ///
    /// 顶级任务的扇出计数初始化为初始输入数量：每条输入链的终点
    /// 各递减一次，最后一条链完成时工作流置为 completed。
    #[instrument(skip(self, request), fields(project_id = request.project_id, profile_id = request.scan_profile_id))]
    pub async fn launch(&self, request: &LaunchScanRequest) -> ReconResult<i64> {
        if request.initial_inputs.is_empty() {
            return Err(ReconError::Validation(
                "初始输入列表不能为空".to_string(),
            ));
        }

        let profile = self
            .profile_repo
            .find_by_id(request.scan_profile_id)
            .await?
            .ok_or(ReconError::ProfileNotFound {
                id: request.scan_profile_id,
            })?;
        if !profile.is_active {
            return Err(ReconError::Validation(format!(
                "扫描模板 '{}' 已停用",
                profile.name
            )));
        }

        let first_step = profile.first_step().ok_or_else(|| {
            ReconError::Validation(
                "无法在工作流中找到起始步骤 (input_from: \"initial\")".to_string(),
            )
        })?;

        let payload_json = serde_json::to_value(request)?;

        let mut tx = self.pool.begin().await?;
        let parent_task_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO tasks (project_id, scan_profile_id, task_type, payload, queue, status,
                               parent_task_id, workflow_step, pending_subtasks)
            VALUES ($1, $2, $3, $4, $5, $6, 0, '', $7)
            RETURNING id
            "#,
        )
        .bind(request.project_id)
        .bind(request.scan_profile_id)
        .bind(TASK_TYPE_WORKFLOW)
        .bind(&payload_json)
        .bind(&self.default_queue)
        .bind(TaskStatus::Pending)
        .bind(request.initial_inputs.len() as i32)
        .fetch_one(&mut *tx)
        .await?;

        // 为每个初始输入派发第一步任务；失败则回滚顶级任务
        for input in &request.initial_inputs {
            let payload = WorkflowPayload {
                project_id: request.project_id,
                parent_task_id,
                scan_profile_id: profile.id,
                current_step_name: first_step.name.clone(),
                input: input.clone(),
                domain_id: None,
            };
            let message = Message::workflow(&first_step.task_type, &payload)?;
            if let Err(e) = self
                .queue
                .publish_message(&self.default_queue, &message)
                .await
            {
                tx.rollback().await?;
                return Err(e);
            }
        }

        tx.commit().await?;

        info!(
            parent_task_id,
            inputs = request.initial_inputs.len(),
            "工作流扫描任务已创建并启动"
        );
        Ok(parent_task_id)
    }
}
