use axum::extract::{Path, Query, State};

use reconflow_domain::entities::{Domain, Page};

use crate::error::ApiResult;
use crate::response::{ApiResponse, PaginationQuery};
use crate::routes::AppState;

/// 分页获取项目下发现的域名
pub async fn list_project_domains(
    State(state): State<AppState>,
    Path(project_id): Path<i64>,
    Query(query): Query<PaginationQuery>,
) -> ApiResult<ApiResponse<Page<Domain>>> {
    let (page, page_size) = query.normalize();
    let domains = state
        .progress
        .project_domains(project_id, page, page_size)
        .await?;
    Ok(ApiResponse::success(domains))
}
