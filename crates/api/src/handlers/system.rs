use axum::{
    extract::{rejection::JsonRejection, State},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use harvester_domain::entities::ControlFlags;

use crate::error::{ApiError, ApiResult};
use crate::response::{success, ApiResponse};
use crate::routes::AppState;

#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    pub state_type: Option<String>,
    pub value: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct ActionAck {
    pub state_type: String,
    pub value: Value,
    /// 清理、重启类操作影响的Worker数
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affected: Option<u64>,
    pub flags: ControlFlags,
}

fn parse_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_u64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn parse_seconds(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// 执行管理操作
pub async fn execute_action(
    State(state): State<AppState>,
    payload: Result<Json<ActionRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) =
        payload.map_err(|_| ApiError::BadRequest("Invalid JSON payload".to_string()))?;

    let (Some(state_type), Some(value)) = (request.state_type, request.value) else {
        return Err(ApiError::BadRequest(
            "Missing 'state_type' or 'value'".to_string(),
        ));
    };

    let invalid = || ApiError::BadRequest(format!("Invalid value for {}: {}", state_type, value));
    let mut affected = None;

    match state_type.as_str() {
        "worker_hold" => {
            let hold = parse_bool(&value).ok_or_else(invalid)?;
            state.backpressure.set_worker_hold(hold).await?;
        }
        "queue_hold" => {
            let hold = parse_bool(&value).ok_or_else(invalid)?;
            state.backpressure.set_queue_hold(hold).await?;
        }
        "delay_per_batch" => {
            let seconds = parse_seconds(&value).ok_or_else(invalid)?;
            state.backpressure.set_delay(seconds).await?;
        }
        "restart_workers" => {
            affected = Some(state.registry.request_restart_all().await?);
        }
        "wipe_worker_db" => {
            affected = Some(state.registry.wipe().await?.workers);
        }
        "cleanup_db" => {
            affected = Some(state.reaper.reap_once().await?.workers);
        }
        other => {
            return Err(ApiError::BadRequest(format!("Unknown state_type: {}", other)));
        }
    }

    info!("执行管理操作: {} = {}", state_type, value);

    let ack = ActionAck {
        state_type,
        value,
        affected,
        flags: state.backpressure.flags().await,
    };
    Ok(ApiResponse::success_with_message(
        ack,
        "Action executed successfully",
    ))
}

/// 统计视图
pub async fn get_stats(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let snapshot = state.statistics.snapshot().await?;
    Ok(success(snapshot))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_bool_variants() {
        assert_eq!(parse_bool(&json!(true)), Some(true));
        assert_eq!(parse_bool(&json!(0)), Some(false));
        assert_eq!(parse_bool(&json!("TRUE")), Some(true));
        assert_eq!(parse_bool(&json!(2)), None);
        assert_eq!(parse_bool(&json!(null)), None);
    }

    #[test]
    fn test_parse_seconds_variants() {
        assert_eq!(parse_seconds(&json!(15)), Some(15));
        assert_eq!(parse_seconds(&json!("30")), Some(30));
        assert_eq!(parse_seconds(&json!(-1)), None);
        assert_eq!(parse_seconds(&json!(1.5)), None);
    }
}
