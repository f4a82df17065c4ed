use std::time::Instant;

use axum::{
    extract::Request,
    http::{header, HeaderMap, HeaderName, Method},
    middleware::Next,
    response::Response,
};
use tower_http::{
    classify::{ServerErrorsAsFailures, SharedClassifier},
    cors::{Any, CorsLayer},
    trace::{MakeSpan, TraceLayer},
};
use tracing::{debug, info, info_span, warn, Span};

use crate::auth::{ADMIN_KEY_HEADER, API_KEY_HEADER, WORKER_ID_HEADER};

/// Worker轮询的高频路径，正常完成时只记 debug
const WORKER_PATHS: [&str; 3] = ["/tasks", "/result", "/heartbeat"];

/// 请求来源标签，不包含任何密钥
fn caller(headers: &HeaderMap) -> String {
    if let Some(worker_id) = headers
        .get(WORKER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        return format!("worker:{worker_id}");
    }
    if headers.contains_key(ADMIN_KEY_HEADER) {
        return "admin".to_string();
    }
    "anonymous".to_string()
}

pub async fn request_logging(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let caller = caller(request.headers());
    let start = Instant::now();

    let response = next.run(request).await;
    let status = response.status();
    let elapsed = start.elapsed();

    if status.is_server_error() || status.is_client_error() {
        warn!("{} {} [{}] -> {} ({:?})", method, path, caller, status, elapsed);
    } else if WORKER_PATHS.contains(&path.as_str()) {
        debug!("{} {} [{}] -> {} ({:?})", method, path, caller, status, elapsed);
    } else {
        info!("{} {} [{}] -> {} ({:?})", method, path, caller, status, elapsed);
    }

    response
}

/// Worker与管理端只会用到 GET/POST 和三个认证头
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            HeaderName::from_static("x-worker-id"),
            HeaderName::from_static("x-api-key"),
            HeaderName::from_static("x-admin-key"),
            header::CONTENT_TYPE,
        ])
}

/// 为每个请求建立带Worker标识的span
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkerSpan;

impl<B> MakeSpan<B> for WorkerSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> Span {
        info_span!(
            "request",
            method = %request.method(),
            path = %request.uri().path(),
            caller = %caller(request.headers()),
            authenticated = request.headers().contains_key(API_KEY_HEADER),
        )
    }
}

pub fn trace_layer() -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>, WorkerSpan> {
    TraceLayer::new_for_http().make_span_with(WorkerSpan)
}
