use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};
use tracing::error;

use crate::routes::AppState;

pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let (status, database) = match state.database.health_check().await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(e) => {
            error!("数据库健康检查失败: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
        }
    };

    (
        status,
        Json(json!({
            "status": if status == StatusCode::OK { "ok" } else { "degraded" },
            "database": database,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "service": "harvester",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}
