//! 领域仓储抽象
//!
//! 定义数据访问的抽象接口，具体实现位于基础设施层。

use async_trait::async_trait;

use crate::entities::{
    Asset, AssetDomainMapping, Domain, Page, Project, ProjectTarget, ScanProfile, Task,
    TaskOutput, TaskStatus,
};
use reconflow_errors::ReconResult;

/// 项目仓储
#[async_trait]
pub trait ProjectRepository: Send + Sync {
    async fn create(&self, project: &Project) -> ReconResult<Project>;
    async fn find_by_id(&self, id: i64) -> ReconResult<Option<Project>>;
    async fn find_by_name(&self, name: &str) -> ReconResult<Option<Project>>;
    async fn list(&self, page: i64, page_size: i64) -> ReconResult<Page<Project>>;
    async fn update(&self, project: &Project) -> ReconResult<Project>;
    /// 软删除
    async fn delete(&self, id: i64) -> ReconResult<bool>;
}

/// 扫描目标仓储
#[async_trait]
pub trait ProjectTargetRepository: Send + Sync {
    async fn create(&self, target: &ProjectTarget) -> ReconResult<ProjectTarget>;
    async fn find_by_project(&self, project_id: i64) -> ReconResult<Vec<ProjectTarget>>;
    async fn delete(&self, id: i64) -> ReconResult<bool>;
}

/// 扫描模板仓储
#[async_trait]
pub trait ScanProfileRepository: Send + Sync {
    async fn create(&self, profile: &ScanProfile) -> ReconResult<ScanProfile>;
    async fn find_by_id(&self, id: i64) -> ReconResult<Option<ScanProfile>>;
    async fn find_by_name(&self, name: &str) -> ReconResult<Option<ScanProfile>>;
    async fn list(&self, page: i64, page_size: i64) -> ReconResult<Page<ScanProfile>>;
    async fn update(&self, profile: &ScanProfile) -> ReconResult<ScanProfile>;
    async fn delete(&self, id: i64) -> ReconResult<bool>;
}

/// 任务仓储
///
/// `decrement_pending_subtasks` 是整个引擎中唯一的显式行锁：
/// 在一个事务内 `SELECT ... FOR UPDATE` 父任务行并在计数大于 0 时
/// 减一，保证并发扇入时恰好一个 worker 观察到计数归零。
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn create(&self, task: &Task) -> ReconResult<Task>;
    async fn find_by_id(&self, id: i64) -> ReconResult<Option<Task>>;
    async fn update(&self, task: &Task) -> ReconResult<Task>;

    /// 更新任务状态与结果，终态时写入 finished_at
    async fn update_status(&self, id: i64, status: TaskStatus, result: &str) -> ReconResult<()>;

    /// 线性输入解析使用的兄弟任务查询
    async fn find_by_parent_and_step(
        &self,
        parent_task_id: i64,
        workflow_step: &str,
    ) -> ReconResult<Option<Task>>;

    /// 扇出前设置父任务的待完成子任务计数
    async fn set_pending_subtasks(&self, id: i64, count: i32) -> ReconResult<()>;

    /// 行锁递减扇出计数
    ///
    /// 返回递减后的新值；计数已为 0（非扇出节点或已完成）时返回
    /// `None`，不做任何修改。
    async fn decrement_pending_subtasks(&self, id: i64) -> ReconResult<Option<i32>>;

    /// 分页查询项目下的顶级任务
    async fn list_top_level(
        &self,
        project_id: i64,
        page: i64,
        page_size: i64,
    ) -> ReconResult<Page<Task>>;

    /// 查询任务的直接子任务
    async fn find_children(&self, parent_task_id: i64) -> ReconResult<Vec<Task>>;
}

/// 任务输出仓储
#[async_trait]
pub trait TaskOutputRepository: Send + Sync {
    async fn create(&self, output: &TaskOutput) -> ReconResult<TaskOutput>;
    async fn find_by_task_id(&self, task_id: i64) -> ReconResult<Option<TaskOutput>>;

    /// 覆盖指定任务的输出数据（域名持久化后回填 ID 列表）
    async fn update_data(&self, task_id: i64, data: &serde_json::Value) -> ReconResult<()>;

    /// 扇入聚合查询
    ///
    /// 返回指定扇出节点下、指定步骤的所有子任务输出，
    /// 供扇入后的下一步重建输入。
    async fn find_child_outputs(
        &self,
        parent_task_id: i64,
        workflow_step: &str,
    ) -> ReconResult<Vec<TaskOutput>>;
}

/// 域名仓储
#[async_trait]
pub trait DomainRepository: Send + Sync {
    /// 批量插入，冲突时忽略（(project_id, fqdn) 唯一）
    async fn upsert_many(&self, domains: &[Domain]) -> ReconResult<()>;

    /// 按 fqdn 集合回查，取回数据库分配的 ID
    async fn find_by_fqdns(&self, project_id: i64, fqdns: &[String]) -> ReconResult<Vec<Domain>>;

    async fn list_by_project(
        &self,
        project_id: i64,
        page: i64,
        page_size: i64,
    ) -> ReconResult<Page<Domain>>;
}

/// 资产仓储
#[async_trait]
pub trait AssetRepository: Send + Sync {
    /// 批量插入，冲突时更新快照列（(project_id, ip, port) 唯一）
    async fn upsert_many(&self, assets: &[Asset]) -> ReconResult<()>;

    async fn find_by_ips(&self, project_id: i64, ips: &[String]) -> ReconResult<Vec<Asset>>;

    /// 幂等插入资产-域名关联
    async fn link_domains(&self, mappings: &[AssetDomainMapping]) -> ReconResult<()>;

    async fn list_by_project(
        &self,
        project_id: i64,
        page: i64,
        page_size: i64,
    ) -> ReconResult<Page<Asset>>;
}
