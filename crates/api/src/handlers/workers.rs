use axum::{extract::State, response::IntoResponse, response::Response, Json};
use serde::{Deserialize, Serialize};

use harvester_core::HarvesterError;
use harvester_dispatcher::WorkerCredentials;
use harvester_domain::entities::{HeartbeatStatus, WorkerMetrics};

use crate::auth::{restart_response, AuthenticatedWorker};
use crate::error::ApiResult;
use crate::routes::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct DiskUsage {
    #[serde(default)]
    pub name: String,
    #[serde(default, alias = "percent")]
    pub usage_percent: f64,
}

#[derive(Debug, Default, Deserialize)]
pub struct NetworkUsage {
    #[serde(default, rename = "in")]
    pub net_in: f64,
    #[serde(default, rename = "out")]
    pub net_out: f64,
}

/// 心跳请求体，兼容 `cpu`/`ram`/`disk` 的简写
#[derive(Debug, Default, Deserialize)]
pub struct HeartbeatRequest {
    #[serde(default, alias = "cpu")]
    pub cpu_usage: f64,
    #[serde(default, alias = "ram")]
    pub ram_usage: f64,
    #[serde(default, alias = "disk")]
    pub disk_usage: DiskUsage,
    #[serde(default)]
    pub network: NetworkUsage,
    #[serde(default)]
    pub public_ip: String,
}

impl From<HeartbeatRequest> for WorkerMetrics {
    fn from(req: HeartbeatRequest) -> Self {
        WorkerMetrics {
            cpu_usage: req.cpu_usage,
            ram_usage: req.ram_usage,
            disk_name: req.disk_usage.name,
            disk_usage_percent: req.disk_usage.usage_percent,
            net_in: req.network.net_in,
            net_out: req.network.net_out,
            public_ip: req.public_ip,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HeartbeatResponse {
    pub status: HeartbeatStatus,
    pub message: &'static str,
    pub worker_id: String,
}

/// 注册新Worker
pub async fn register_worker(State(state): State<AppState>) -> ApiResult<Json<WorkerCredentials>> {
    let credentials = state.registry.register().await?;
    Ok(Json(credentials))
}

/// Worker心跳
pub async fn heartbeat(
    State(state): State<AppState>,
    worker: AuthenticatedWorker,
    Json(payload): Json<HeartbeatRequest>,
) -> ApiResult<Response> {
    let worker_hold = state.backpressure.flags().await.worker_hold;
    let metrics = WorkerMetrics::from(payload);

    match state
        .registry
        .heartbeat(&worker.worker_id, &metrics, worker_hold)
        .await
    {
        Ok(status) => Ok(Json(HeartbeatResponse {
            status,
            message: "Heartbeat updated",
            worker_id: worker.worker_id,
        })
        .into_response()),
        // 认证之后被清理
        Err(HarvesterError::WorkerNotFound { .. }) => Ok(restart_response()),
        Err(e) => Err(e.into()),
    }
}
