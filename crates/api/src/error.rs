use axum::{
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use harvester_core::HarvesterError;
use serde_json::json;
use tracing::error;

/// 存储不可用时建议的重试间隔（秒）
const RETRY_AFTER_SECONDS: u64 = 5;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("协调器错误: {0}")]
    Harvester(#[from] HarvesterError),

    #[error("请求参数错误: {0}")]
    BadRequest(String),

    #[error("管理端认证失败")]
    Unauthorized,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, error_type) = match &self {
            ApiError::BadRequest(msg) | ApiError::Harvester(HarvesterError::Validation(msg)) => {
                (StatusCode::BAD_REQUEST, msg.clone(), "VALIDATION_ERROR")
            }
            ApiError::Unauthorized | ApiError::Harvester(HarvesterError::AuthFailure) => (
                StatusCode::UNAUTHORIZED,
                "认证失败".to_string(),
                "AUTHENTICATION_ERROR",
            ),
            ApiError::Harvester(HarvesterError::WorkerNotFound { id }) => (
                StatusCode::NOT_FOUND,
                format!("Worker {} 不存在", id),
                "WORKER_NOT_FOUND",
            ),
            ApiError::Harvester(e @ HarvesterError::IdSpaceExhausted { .. }) => {
                error!("{}", e);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    e.to_string(),
                    "ID_SPACE_EXHAUSTED",
                )
            }
            ApiError::Harvester(e @ HarvesterError::StorageUnavailable(_)) => {
                error!("存储不可用: {}", e);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "存储暂时不可用，请稍后重试".to_string(),
                    "STORAGE_UNAVAILABLE",
                )
            }
            ApiError::Harvester(e) => {
                error!("内部错误: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "系统内部错误".to_string(),
                    "INTERNAL_ERROR",
                )
            }
        };

        let body = Json(json!({
            "error": {
                "message": message,
                "type": error_type,
                "code": status.as_u16(),
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }
        }));

        let mut response = (status, body).into_response();
        if matches!(
            self,
            ApiError::Harvester(HarvesterError::StorageUnavailable(_))
        ) {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(RETRY_AFTER_SECONDS));
        }
        response
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
