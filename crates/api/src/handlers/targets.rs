use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use serde::Deserialize;

use reconflow_domain::entities::{ProjectTarget, TargetType};

use crate::error::{ApiError, ApiResult};
use crate::response::ApiResponse;
use crate::routes::AppState;
use crate::validation::validate_target_value;

/// 目标创建请求
#[derive(Debug, Deserialize)]
pub struct CreateTargetRequest {
    pub value: String,
    pub target_type: TargetType,
    #[serde(default)]
    pub description: String,
}

/// 为项目添加扫描目标
pub async fn create_target(
    State(state): State<AppState>,
    Path(project_id): Path<i64>,
    Json(request): Json<CreateTargetRequest>,
) -> ApiResult<ApiResponse<ProjectTarget>> {
    state
        .project_repo
        .find_by_id(project_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    validate_target_value(request.target_type, &request.value)?;

    let target = state
        .target_repo
        .create(&ProjectTarget {
            id: 0,
            project_id,
            value: request.value,
            target_type: request.target_type,
            description: request.description,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        })
        .await?;
    Ok(ApiResponse::success(target))
}

/// 获取项目下的所有目标
pub async fn list_targets(
    State(state): State<AppState>,
    Path(project_id): Path<i64>,
) -> ApiResult<ApiResponse<Vec<ProjectTarget>>> {
    let targets = state.target_repo.find_by_project(project_id).await?;
    Ok(ApiResponse::success(targets))
}

/// 删除目标
pub async fn delete_target(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<ApiResponse<()>> {
    if !state.target_repo.delete(id).await? {
        return Err(ApiError::NotFound);
    }
    Ok(ApiResponse::success_empty())
}
