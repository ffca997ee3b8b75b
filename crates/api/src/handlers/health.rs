use crate::response::ApiResponse;
use serde_json::json;

/// 健康检查
pub async fn health_check() -> ApiResponse<serde_json::Value> {
    ApiResponse::success(json!({ "status": "ok" }))
}
