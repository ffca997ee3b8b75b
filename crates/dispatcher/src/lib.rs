//! # 调度层
//!
//! 扫描启动器（创建顶级工作流任务并派发首步任务）与
//! 读侧进度查询。

pub mod launcher;
pub mod progress;

pub use launcher::{LaunchScanRequest, ScanLauncher};
pub use progress::{ProgressReader, TaskDetail};
