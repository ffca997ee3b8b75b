use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use serde::Deserialize;

use reconflow_domain::entities::{Page, Project, ProjectStatus};

use crate::error::{ApiError, ApiResult};
use crate::response::{ApiResponse, PaginationQuery};
use crate::routes::AppState;

/// 项目创建请求
#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// 项目更新请求
#[derive(Debug, Deserialize)]
pub struct UpdateProjectRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<ProjectStatus>,
}

/// 创建项目
pub async fn create_project(
    State(state): State<AppState>,
    Json(request): Json<CreateProjectRequest>,
) -> ApiResult<ApiResponse<Project>> {
    if request.name.trim().is_empty() {
        return Err(ApiError::BadRequest("项目名称不能为空".to_string()));
    }
    if state.project_repo.find_by_name(&request.name).await?.is_some() {
        return Err(ApiError::Conflict(format!(
            "项目名称 '{}' 已存在",
            request.name
        )));
    }

    let project = state
        .project_repo
        .create(&Project {
            id: 0,
            name: request.name,
            description: request.description,
            status: ProjectStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        })
        .await?;
    Ok(ApiResponse::success(project))
}

/// 分页获取项目列表
pub async fn list_projects(
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> ApiResult<ApiResponse<Page<Project>>> {
    let (page, page_size) = query.normalize();
    let projects = state.project_repo.list(page, page_size).await?;
    Ok(ApiResponse::success(projects))
}

/// 获取单个项目
pub async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<ApiResponse<Project>> {
    let project = state
        .project_repo
        .find_by_id(id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(ApiResponse::success(project))
}

/// 更新项目
pub async fn update_project(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<UpdateProjectRequest>,
) -> ApiResult<ApiResponse<Project>> {
    let mut project = state
        .project_repo
        .find_by_id(id)
        .await?
        .ok_or(ApiError::NotFound)?;

    if let Some(name) = request.name {
        project.name = name;
    }
    if let Some(description) = request.description {
        project.description = description;
    }
    if let Some(status) = request.status {
        project.status = status;
    }

    let updated = state.project_repo.update(&project).await?;
    Ok(ApiResponse::success(updated))
}

/// 删除项目（软删除）
pub async fn delete_project(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<ApiResponse<()>> {
    if !state.project_repo.delete(id).await? {
        return Err(ApiError::NotFound);
    }
    Ok(ApiResponse::success_empty())
}
