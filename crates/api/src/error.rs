use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use reconflow_errors::ReconError;

/// API 错误类型
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Recon(#[from] ReconError),

    #[error("请求参数错误: {0}")]
    BadRequest(String),

    #[error("资源未找到")]
    NotFound,

    #[error("请求冲突: {0}")]
    Conflict(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            ApiError::Recon(
                ReconError::ProjectNotFound { .. }
                | ReconError::ProfileNotFound { .. }
                | ReconError::TaskNotFound { .. },
            ) => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::Recon(
                ReconError::Validation(_) | ReconError::InvalidTarget(_),
            ) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::Recon(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "内部服务器错误".to_string(),
            ),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "资源未找到".to_string()),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, self.to_string()),
        };

        let body = Json(json!({
            "success": false,
            "error": {
                "message": error_message,
            }
        }));
        (status, body).into_response()
    }
}
