use axum::{
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::warn;

use harvester_core::HarvesterError;

use crate::error::ApiError;
use crate::routes::AppState;

pub const WORKER_ID_HEADER: &str = "X-Worker-ID";
pub const API_KEY_HEADER: &str = "X-API-Key";
pub const ADMIN_KEY_HEADER: &str = "X-Admin-Key";

/// 通过认证的Worker
#[derive(Debug, Clone)]
pub struct AuthenticatedWorker {
    pub worker_id: String,
}

/// Worker认证失败时的响应，Worker收到后重新注册
pub fn restart_response() -> Response {
    (
        StatusCode::OK,
        Json(json!({
            "status": "restart",
            "message": "Worker auth failed",
        })),
    )
        .into_response()
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

impl FromRequestParts<AppState> for AuthenticatedWorker {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let (Some(worker_id), Some(api_key)) = (
            header_value(&parts.headers, WORKER_ID_HEADER),
            header_value(&parts.headers, API_KEY_HEADER),
        ) else {
            return Err(restart_response());
        };

        match state.registry.authenticate(&worker_id, &api_key).await {
            Ok(()) => Ok(Self { worker_id }),
            Err(HarvesterError::AuthFailure) => {
                warn!("Worker认证失败: {}", worker_id);
                Err(restart_response())
            }
            Err(e) => Err(ApiError::from(e).into_response()),
        }
    }
}

/// 管理端接口守卫，未配置任何管理密钥时拒绝全部请求
pub async fn require_admin(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let authorized = header_value(req.headers(), ADMIN_KEY_HEADER)
        .map(|key| state.admin_keys.iter().any(|k| *k == key))
        .unwrap_or(false);

    if !authorized {
        warn!("管理端认证失败: {} {}", req.method(), req.uri());
        return Err(ApiError::Unauthorized);
    }

    Ok(next.run(req).await)
}
