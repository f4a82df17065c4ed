use std::sync::Arc;
use std::time::Duration;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::timeout::TimeoutLayer;

use harvester_dispatcher::{
    BackpressureController, IdleReaperService, ResultIntake, StatisticsService, TaskIssuer,
    WorkerRegistry,
};
use harvester_infrastructure::DatabaseManager;

use crate::auth::require_admin;
use crate::handlers::{
    health::health_check,
    system::{execute_action, get_stats},
    tasks::{claim_tasks, submit_result},
    workers::{heartbeat, register_worker},
};

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<WorkerRegistry>,
    pub issuer: Arc<TaskIssuer>,
    pub intake: ResultIntake,
    pub backpressure: Arc<BackpressureController>,
    pub statistics: Arc<StatisticsService>,
    pub reaper: Arc<dyn IdleReaperService>,
    pub database: Arc<DatabaseManager>,
    pub admin_keys: Arc<Vec<String>>,
    pub request_timeout: Duration,
}

/// 创建API路由
///
/// `/tasks` 不受请求超时限制，全局延迟可能超过超时时间。
pub fn create_routes(state: AppState) -> Router {
    let admin = Router::new()
        .route("/actions", post(execute_action))
        .route("/stats", get(get_stats))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    let bounded = Router::new()
        // 健康检查
        .route("/health", get(health_check))
        // Worker接口
        .route("/register", get(register_worker).post(register_worker))
        .route("/heartbeat", post(heartbeat))
        .route("/result", post(submit_result))
        .merge(admin)
        .layer(TimeoutLayer::new(state.request_timeout));

    Router::new()
        .route("/tasks", get(claim_tasks))
        .merge(bounded)
        .with_state(state)
}
