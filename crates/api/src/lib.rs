//! # Harvester API
//!
//! 短链接爬取集群的HTTP接口，基于Axum构建。
//!
//! ## 接口
//!
//! ### Worker
//! - `GET|POST /register` - 注册，返回 `worker_id` 与 `api_key`
//! - `POST /heartbeat` - 上报负载，返回 `continue` / `hold` / `restart`
//! - `GET /tasks` - 认领一批短链接
//! - `POST /result` - 表单提交单个短链接的结果
//!
//! Worker接口通过 `X-Worker-ID` 与 `X-API-Key` 认证。认证失败时返回
//! HTTP 200 与 `{"status": "restart"}`，Worker据此重新注册。
//!
//! ### 管理端
//! - `POST /actions` - 修改全局开关或执行清理
//! - `GET /stats` - 统计视图
//!
//! 管理端接口需要 `X-Admin-Key` 请求头，失败返回 401。
//!
//! ### 其他
//! - `GET /health` - 数据库连通性检查

pub mod auth;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;

use axum::Router;
use tower::ServiceBuilder;

use middleware::{cors_layer, request_logging, trace_layer};
use routes::create_routes;
pub use routes::AppState;

/// 创建带通用中间件的应用
pub fn create_app(state: AppState) -> Router {
    create_routes(state).layer(
        ServiceBuilder::new()
            .layer(trace_layer())
            .layer(cors_layer())
            .layer(axum::middleware::from_fn(request_logging)),
    )
}
