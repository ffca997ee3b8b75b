use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use serde::Deserialize;

use reconflow_domain::entities::{Page, ScanProfile, WorkflowStep};

use crate::error::{ApiError, ApiResult};
use crate::response::{ApiResponse, PaginationQuery};
use crate::routes::AppState;

/// 扫描模板创建请求
#[derive(Debug, Deserialize)]
pub struct CreateScanProfileRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub workflow_steps: Vec<WorkflowStep>,
}

/// 扫描模板更新请求
#[derive(Debug, Deserialize)]
pub struct UpdateScanProfileRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub workflow_steps: Option<Vec<WorkflowStep>>,
    pub is_active: Option<bool>,
}

/// 创建扫描模板
pub async fn create_scan_profile(
    State(state): State<AppState>,
    Json(request): Json<CreateScanProfileRequest>,
) -> ApiResult<ApiResponse<ScanProfile>> {
    if request.name.trim().is_empty() {
        return Err(ApiError::BadRequest("模板名称不能为空".to_string()));
    }
    if state
        .profile_repo
        .find_by_name(&request.name)
        .await?
        .is_some()
    {
        return Err(ApiError::Conflict(format!(
            "模板名称 '{}' 已存在",
            request.name
        )));
    }

    let profile = ScanProfile {
        id: 0,
        name: request.name,
        description: request.description,
        workflow_steps: request.workflow_steps,
        is_active: true,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    profile
        .validate_steps()
        .map_err(ApiError::BadRequest)?;

    let created = state.profile_repo.create(&profile).await?;
    Ok(ApiResponse::success(created))
}

/// 分页获取模板列表
pub async fn list_scan_profiles(
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> ApiResult<ApiResponse<Page<ScanProfile>>> {
    let (page, page_size) = query.normalize();
    let profiles = state.profile_repo.list(page, page_size).await?;
    Ok(ApiResponse::success(profiles))
}

/// 获取单个模板
pub async fn get_scan_profile(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<ApiResponse<ScanProfile>> {
    let profile = state
        .profile_repo
        .find_by_id(id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(ApiResponse::success(profile))
}

/// 更新模板
///
/// 更新不影响正在运行的工作流：运行中的任务按名称从当前模板行
/// 解析步骤。
pub async fn update_scan_profile(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<UpdateScanProfileRequest>,
) -> ApiResult<ApiResponse<ScanProfile>> {
    let mut profile = state
        .profile_repo
        .find_by_id(id)
        .await?
        .ok_or(ApiError::NotFound)?;

    if let Some(name) = request.name {
        profile.name = name;
    }
    if let Some(description) = request.description {
        profile.description = description;
    }
    if let Some(workflow_steps) = request.workflow_steps {
        profile.workflow_steps = workflow_steps;
    }
    if let Some(is_active) = request.is_active {
        profile.is_active = is_active;
    }
    profile
        .validate_steps()
        .map_err(ApiError::BadRequest)?;

    let updated = state.profile_repo.update(&profile).await?;
    Ok(ApiResponse::success(updated))
}

/// 删除模板
pub async fn delete_scan_profile(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<ApiResponse<()>> {
    if !state.profile_repo.delete(id).await? {
        return Err(ApiError::NotFound);
    }
    Ok(ApiResponse::success_empty())
}
