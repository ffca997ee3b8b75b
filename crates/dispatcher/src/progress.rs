//! 读侧进度查询

use serde::Serialize;
use std::sync::Arc;

use reconflow_domain::entities::{Asset, Domain, Page, Task};
use reconflow_domain::repositories::{AssetRepository, DomainRepository, TaskRepository};
use reconflow_errors::{ReconError, ReconResult};

/// 任务详情（含直接子任务）
#[derive(Debug, Clone, Serialize)]
pub struct TaskDetail {
    #[serde(flatten)]
    pub task: Task,
    pub children: Vec<Task>,
}

/// 进度读取器
pub struct ProgressReader {
    task_repo: Arc<dyn TaskRepository>,
    domain_repo: Arc<dyn DomainRepository>,
    asset_repo: Arc<dyn AssetRepository>,
}

impl ProgressReader {
    pub fn new(
        task_repo: Arc<dyn TaskRepository>,
        domain_repo: Arc<dyn DomainRepository>,
        asset_repo: Arc<dyn AssetRepository>,
    ) -> Self {
        Self {
            task_repo,
            domain_repo,
            asset_repo,
        }
    }

    /// 分页查询项目下的顶级任务
    pub async fn project_tasks(
        &self,
        project_id: i64,
        page: i64,
        page_size: i64,
    ) -> ReconResult<Page<Task>> {
        self.task_repo
            .list_top_level(project_id, page, page_size)
            .await
    }

    /// 任务详情与直接子任务
    pub async fn task_detail(&self, task_id: i64) -> ReconResult<TaskDetail> {
        let task = self
            .task_repo
            .find_by_id(task_id)
            .await?
            .ok_or(ReconError::TaskNotFound { id: task_id })?;
        let children = self.task_repo.find_children(task_id).await?;
        Ok(TaskDetail { task, children })
    }

    /// 分页查询项目下发现的域名
    pub async fn project_domains(
        &self,
        project_id: i64,
        page: i64,
        page_size: i64,
    ) -> ReconResult<Page<Domain>> {
        self.domain_repo
            .list_by_project(project_id, page, page_size)
            .await
    }

    /// 分页查询项目下发现的资产
    pub async fn project_assets(
        &self,
        project_id: i64,
        page: i64,
        page_size: i64,
    ) -> ReconResult<Page<Asset>> {
        self.asset_repo
            .list_by_project(project_id, page, page_size)
            .await
    }
}
