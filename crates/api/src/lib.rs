//! # REST API 层
//!
//! 项目/目标/扫描模板的 CRUD、扫描启动以及任务、域名、资产的
//! 进度查询。

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;
pub mod validation;

pub use error::{ApiError, ApiResult};
pub use response::ApiResponse;
pub use routes::{create_routes, AppState};
