use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, Response};
use axum::Router;
use serde_json::Value;
use tokio::sync::broadcast;
use tower::ServiceExt;

use harvester_api::{create_app, AppState};
use harvester_core::config::{AppConfig, BatcherConfig};
use harvester_dispatcher::*;
use harvester_domain::repositories::*;
use harvester_infrastructure::*;

pub const ADMIN_KEY: &str = "test-admin-key";

pub struct TestApp {
    pub router: Router,
    pub stats_repo: Arc<dyn StatisticsRepository>,
    pub cache: Arc<ResultCache>,
    _shutdown_tx: broadcast::Sender<()>,
    _database: Arc<DatabaseManager>,
}

impl TestApp {
    pub async fn new() -> Self {
        let config = AppConfig::default();
        let coordinator = config.coordinator.clone();
        let database = Arc::new(DatabaseManager::in_memory().await.unwrap());
        let pool = database.pool().clone();

        let cursor_repo: Arc<dyn CursorRepository> =
            Arc::new(SqliteCursorRepository::new(pool.clone()));
        let backlog_repo: Arc<dyn BacklogRepository> =
            Arc::new(SqliteBacklogRepository::new(pool.clone()));
        let worker_repo: Arc<dyn WorkerRepository> =
            Arc::new(SqliteWorkerRepository::new(pool.clone()));
        let stats_repo: Arc<dyn StatisticsRepository> =
            Arc::new(SqliteStatisticsRepository::new(pool.clone()));
        let control_repo: Arc<dyn ControlRepository> =
            Arc::new(SqliteControlRepository::new(pool.clone()));
        let result_repo: Arc<dyn ResultRepository> = Arc::new(SqliteResultRepository::new(pool));
        let metrics = Arc::new(MetricsCollector::new());

        let generator =
            Arc::new(IdSpaceGenerator::new(cursor_repo.clone(), &coordinator.services).unwrap());
        generator.seed_cursors().await.unwrap();
        let backlog = Arc::new(BacklogStore::new(backlog_repo, coordinator.backlog.clone()));
        let registry = Arc::new(WorkerRegistry::new(
            worker_repo.clone(),
            stats_repo.clone(),
            coordinator.workers.clone(),
        ));
        let backpressure = Arc::new(
            BackpressureController::load(control_repo, coordinator.max_delay_seconds)
                .await
                .unwrap(),
        );
        let cache = Arc::new(ResultCache::new(
            result_repo.clone(),
            stats_repo.clone(),
            metrics.clone(),
            coordinator.result_cache.clone(),
        ));
        let (handle, batcher) = CoalescingBatcher::new(
            &BatcherConfig {
                throttle_millis: 50,
                channel_capacity: 1000,
            },
            worker_repo,
            stats_repo.clone(),
            result_repo.clone(),
            backlog.clone(),
            cache.clone(),
            metrics.clone(),
        );
        let (shutdown_tx, _) = broadcast::channel(1);
        tokio::spawn(batcher.run(shutdown_tx.subscribe()));

        let issuer = Arc::new(TaskIssuer::new(
            generator,
            backlog.clone(),
            registry.clone(),
            backpressure.clone(),
            stats_repo.clone(),
            metrics.clone(),
            coordinator.chunk_size,
        ));
        let statistics = Arc::new(StatisticsService::new(
            stats_repo.clone(),
            cursor_repo,
            result_repo,
            backlog,
            registry.clone(),
            backpressure.clone(),
        ));
        let reaper: Arc<dyn IdleReaperService> = Arc::new(IdleReaper::new(
            registry.clone(),
            metrics,
            coordinator.workers.clone(),
        ));

        let state = AppState {
            registry,
            issuer,
            intake: ResultIntake::new(handle),
            backpressure,
            statistics,
            reaper,
            database: database.clone(),
            admin_keys: Arc::new(vec![ADMIN_KEY.to_string()]),
            request_timeout: Duration::from_secs(config.api.request_timeout_seconds),
        };

        Self {
            router: create_app(state),
            stats_repo,
            cache,
            _shutdown_tx: shutdown_tx,
            _database: database,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn register(&self) -> (String, String) {
        let response = self
            .send(Request::post("/register").body(Body::empty()).unwrap())
            .await;
        let body = json_body(response).await;
        (
            body["worker_id"].as_str().unwrap().to_string(),
            body["api_key"].as_str().unwrap().to_string(),
        )
    }

    pub async fn admin_action(&self, state_type: &str, value: Value) -> Response<Body> {
        let body = serde_json::json!({ "state_type": state_type, "value": value });
        self.send(
            Request::post("/actions")
                .header("X-Admin-Key", ADMIN_KEY)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn stat(&self, name: &str) -> i64 {
        self.stats_repo
            .get_counts()
            .await
            .unwrap()
            .into_iter()
            .find(|(s, _)| s.as_str() == name)
            .map(|(_, c)| c)
            .unwrap_or_default()
    }
}

pub fn worker_request(method: &str, uri: &str, worker_id: &str, api_key: &str) -> axum::http::request::Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("X-Worker-ID", worker_id)
        .header("X-API-Key", api_key)
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
