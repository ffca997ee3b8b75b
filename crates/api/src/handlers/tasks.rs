use axum::extract::{Path, Query, State};

use reconflow_dispatcher::TaskDetail;
use reconflow_domain::entities::{Page, Task};

use crate::error::ApiResult;
use crate::response::{ApiResponse, PaginationQuery};
use crate::routes::AppState;

/// 分页获取项目下的顶级任务
pub async fn list_project_tasks(
    State(state): State<AppState>,
    Path(project_id): Path<i64>,
    Query(query): Query<PaginationQuery>,
) -> ApiResult<ApiResponse<Page<Task>>> {
    let (page, page_size) = query.normalize();
    let tasks = state
        .progress
        .project_tasks(project_id, page, page_size)
        .await?;
    Ok(ApiResponse::success(tasks))
}

/// 获取任务详情（含直接子任务）
pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<ApiResponse<TaskDetail>> {
    let detail = state.progress.task_detail(id).await?;
    Ok(ApiResponse::success(detail))
}
