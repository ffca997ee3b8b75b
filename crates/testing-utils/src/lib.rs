//! # 测试工具
//!
//! 仓储接口的内存 Mock 实现与实体构造器，供各 crate 的单元和
//! 集成测试使用，无需真实数据库。

pub mod builders;
pub mod mocks;

pub use builders::{ScanProfileBuilder, TaskBuilder, WorkflowStepBuilder};
pub use mocks::{
    MockAssetRepository, MockDomainRepository, MockScanProfileRepository,
    MockTaskOutputRepository, MockTaskRepository,
};
