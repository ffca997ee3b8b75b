use axum::{extract::State, Json};
use serde_json::json;

use reconflow_dispatcher::LaunchScanRequest;

use crate::error::{ApiError, ApiResult};
use crate::response::ApiResponse;
use crate::routes::AppState;

/// 启动扫描工作流
///
/// 返回顶级任务ID，用于追踪整个工作流的进度。
pub async fn create_scan(
    State(state): State<AppState>,
    Json(request): Json<LaunchScanRequest>,
) -> ApiResult<ApiResponse<serde_json::Value>> {
    state
        .project_repo
        .find_by_id(request.project_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    let parent_task_id = state.launcher.launch(&request).await?;
    Ok(ApiResponse::success_with_message(
        json!({ "parent_task_id": parent_task_id }),
        "工作流扫描任务已成功创建并启动".to_string(),
    ))
}
