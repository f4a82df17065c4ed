use std::sync::Arc;

use tokio::sync::broadcast;

use harvester_core::config::AppConfig;
use harvester_domain::entities::{HeartbeatStatus, StatType, WorkerMetrics};
use harvester_domain::repositories::*;
use harvester_dispatcher::*;
use harvester_infrastructure::database::*;
use harvester_infrastructure::MetricsCollector;

struct Coordinator {
    _manager: DatabaseManager,
    stats_repo: Arc<dyn StatisticsRepository>,
    registry: Arc<WorkerRegistry>,
    backpressure: Arc<BackpressureController>,
    backlog: Arc<BacklogStore>,
    issuer: TaskIssuer,
    intake: ResultIntake,
    cache: Arc<ResultCache>,
}

impl Coordinator {
    async fn new() -> (Self, CoalescingBatcher) {
        let config = AppConfig::default().coordinator;
        let manager = DatabaseManager::in_memory().await.unwrap();
        let pool = manager.pool().clone();

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

        let generator = Arc::new(IdSpaceGenerator::new(cursor_repo, &config.services).unwrap());
        generator.seed_cursors().await.unwrap();

        let backlog = Arc::new(BacklogStore::new(backlog_repo, config.backlog.clone()));
        let registry = Arc::new(WorkerRegistry::new(
            worker_repo.clone(),
            stats_repo.clone(),
            config.workers.clone(),
        ));
        let backpressure = Arc::new(
            BackpressureController::load(control_repo, config.max_delay_seconds)
                .await
                .unwrap(),
        );
        let cache = Arc::new(ResultCache::new(
            result_repo.clone(),
            stats_repo.clone(),
            metrics.clone(),
            config.result_cache.clone(),
        ));
        let (handle, batcher) = CoalescingBatcher::new(
            &config.batcher,
            worker_repo,
            stats_repo.clone(),
            result_repo,
            backlog.clone(),
            cache.clone(),
            metrics.clone(),
        );
        let issuer = TaskIssuer::new(
            generator,
            backlog.clone(),
            registry.clone(),
            backpressure.clone(),
            stats_repo.clone(),
            metrics,
            config.chunk_size,
        );

        let coordinator = Self {
            _manager: manager,
            stats_repo,
            registry,
            backpressure,
            backlog,
            issuer,
            intake: ResultIntake::new(handle),
            cache,
        };
        (coordinator, batcher)
    }

    async fn stat(&self, stat: StatType) -> i64 {
        self.stats_repo
            .get_counts()
            .await
            .unwrap()
            .into_iter()
            .find(|(s, _)| *s == stat)
            .map(|(_, c)| c)
            .unwrap_or_default()
    }
}

fn success(url: &str) -> ResultReport {
    ResultReport {
        status: "success".to_string(),
        unresolved_url: url.to_string(),
        resolved_url: Some(format!("https://example.com/{}", url.len())),
        title: Some("Example".to_string()),
        short_description: Some("An example page".to_string()),
        full_text: Some("Example body".to_string()),
        scraped_at: None,
    }
}

async fn drain(batcher: CoalescingBatcher, cache: &ResultCache) {
    let (tx, rx) = broadcast::channel(1);
    tx.send(()).unwrap();
    batcher.run(rx).await;
    cache.flush().await;
}

#[tokio::test]
async fn test_full_worker_cycle() {
    let (coordinator, batcher) = Coordinator::new().await;
    let creds = coordinator.registry.register().await.unwrap();
    coordinator
        .registry
        .authenticate(&creds.worker_id, &creds.api_key)
        .await
        .unwrap();

    let status = coordinator
        .registry
        .heartbeat(&creds.worker_id, &WorkerMetrics::default(), false)
        .await
        .unwrap();
    assert_eq!(status, HeartbeatStatus::Continue);

    let urls = coordinator.issuer.claim(&creds.worker_id).await.unwrap();
    assert_eq!(urls.len(), 45);
    assert_eq!(coordinator.stat(StatType::QueueSize).await, 45);

    for url in &urls[..40] {
        coordinator
            .intake
            .submit(&creds.worker_id, success(url))
            .await
            .unwrap();
    }
    for url in &urls[40..] {
        let report = ResultReport {
            status: "notfound".to_string(),
            unresolved_url: url.clone(),
            ..Default::default()
        };
        coordinator.intake.submit(&creds.worker_id, report).await.unwrap();
    }

    drain(batcher, &coordinator.cache).await;

    assert_eq!(coordinator.stat(StatType::ScrapedPages).await, 40);
    assert_eq!(coordinator.stat(StatType::UrlNotFound).await, 5);
    assert_eq!(coordinator.stat(StatType::QueueSize).await, 0);
    assert_eq!(coordinator.backlog.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_noredirect_goes_back_to_backlog() {
    let (coordinator, batcher) = Coordinator::new().await;
    let creds = coordinator.registry.register().await.unwrap();
    let urls = coordinator.issuer.claim(&creds.worker_id).await.unwrap();

    let report = ResultReport {
        status: "noredirect".to_string(),
        unresolved_url: urls[0].clone(),
        ..Default::default()
    };
    coordinator.intake.submit(&creds.worker_id, report).await.unwrap();
    drain(batcher, &coordinator.cache).await;

    assert_eq!(coordinator.stat(StatType::RedirectFailed).await, 1);
    assert_eq!(coordinator.stat(StatType::QueueSize).await, 44);
    assert_eq!(coordinator.backlog.count().await.unwrap(), 45);

    // 冷任务没有下发时间, 下一次认领时优先返回
    let next = coordinator.issuer.claim(&creds.worker_id).await.unwrap();
    assert_eq!(next, vec![urls[0].clone()]);
}

#[tokio::test]
async fn test_queue_hold_and_restart_controls() {
    let (coordinator, _batcher) = Coordinator::new().await;
    let creds = coordinator.registry.register().await.unwrap();

    coordinator.backpressure.set_queue_hold(true).await.unwrap();
    assert!(coordinator
        .issuer
        .claim(&creds.worker_id)
        .await
        .unwrap()
        .is_empty());

    coordinator.backpressure.set_worker_hold(true).await.unwrap();
    coordinator.registry.request_restart_all().await.unwrap();
    let metrics = WorkerMetrics::default();
    let first = coordinator
        .registry
        .heartbeat(&creds.worker_id, &metrics, true)
        .await
        .unwrap();
    let second = coordinator
        .registry
        .heartbeat(&creds.worker_id, &metrics, true)
        .await
        .unwrap();
    assert_eq!(first, HeartbeatStatus::Restart);
    assert_eq!(second, HeartbeatStatus::Hold);

    assert!(coordinator.backpressure.set_delay(10_000).await.is_err());
}
