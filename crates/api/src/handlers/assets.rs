use axum::extract::{Path, Query, State};

use reconflow_domain::entities::{Asset, Page};

use crate::error::ApiResult;
use crate::response::{ApiResponse, PaginationQuery};
use crate::routes::AppState;

/// 分页获取项目下发现的资产
pub async fn list_project_assets(
    State(state): State<AppState>,
    Path(project_id): Path<i64>,
    Query(query): Query<PaginationQuery>,
) -> ApiResult<ApiResponse<Page<Asset>>> {
    let (page, page_size) = query.normalize();
    let assets = state
        .progress
        .project_assets(project_id, page, page_size)
        .await?;
    Ok(ApiResponse::success(assets))
}
