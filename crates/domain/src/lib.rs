//! # 核心领域层
//!
//! 定义侦察扫描平台的业务实体、工作流载荷、消息队列抽象和仓储接口。
//! 本层不依赖任何具体的存储或队列实现。

pub mod entities;
pub mod messaging;
pub mod repositories;

mod sqlx_impls;

pub use entities::{
    Asset, AssetDomainMapping, Domain, ExecutionMode, Page, Project, ProjectStatus,
    ProjectTarget, ScanProfile, TargetType, Task, TaskOutput, TaskStatus, WorkflowStep,
    INPUT_FROM_INITIAL, TASK_TYPE_WORKFLOW,
};
pub use messaging::{Message, MessageQueue, WorkflowPayload};
pub use repositories::{
    AssetRepository, DomainRepository, ProjectRepository, ProjectTargetRepository,
    ScanProfileRepository, TaskOutputRepository, TaskRepository,
};
