use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use harvester_core::config::AppConfig;
use harvester_core::{HarvesterError, HarvesterResult};
use harvester_domain::entities::{
    EvictionSummary, NoRedirectRecord, ScrapedPage, ServiceCursor, StatType, WorkerInfo,
    WorkerMetrics,
};
use harvester_domain::repositories::*;
use harvester_infrastructure::database::*;
use harvester_infrastructure::MetricsCollector;

/// 基于内存数据库的完整依赖
pub struct Harness {
    pub manager: DatabaseManager,
    pub config: AppConfig,
    pub cursor_repo: Arc<dyn CursorRepository>,
    pub backlog_repo: Arc<dyn BacklogRepository>,
    pub worker_repo: Arc<dyn WorkerRepository>,
    pub stats_repo: Arc<dyn StatisticsRepository>,
    pub control_repo: Arc<dyn ControlRepository>,
    pub result_repo: Arc<dyn ResultRepository>,
    pub metrics: Arc<MetricsCollector>,
}

impl Harness {
    pub async fn new() -> Self {
        let manager = DatabaseManager::in_memory().await.unwrap();
        let pool = manager.pool().clone();
        Self {
            config: AppConfig::default(),
            cursor_repo: Arc::new(SqliteCursorRepository::new(pool.clone())),
            backlog_repo: Arc::new(SqliteBacklogRepository::new(pool.clone())),
            worker_repo: Arc::new(SqliteWorkerRepository::new(pool.clone())),
            stats_repo: Arc::new(SqliteStatisticsRepository::new(pool.clone())),
            control_repo: Arc::new(SqliteControlRepository::new(pool.clone())),
            result_repo: Arc::new(SqliteResultRepository::new(pool)),
            metrics: Arc::new(MetricsCollector::new()),
            manager,
        }
    }

    pub async fn stat(&self, stat: StatType) -> i64 {
        self.stats_repo
            .get_counts()
            .await
            .unwrap()
            .into_iter()
            .find(|(s, _)| *s == stat)
            .map(|(_, c)| c)
            .unwrap_or_default()
    }

    pub async fn register_worker(&self, worker_id: &str) {
        let worker = WorkerInfo::new(worker_id.to_string(), format!("{worker_id}-key"), Utc::now());
        self.worker_repo.create(&worker).await.unwrap();
    }
}

/// 记录扣减调用的Worker仓储，可切换为心跳写入失败
pub struct CountingWorkerRepository {
    inner: Arc<dyn WorkerRepository>,
    pub subtract_calls: Mutex<Vec<(String, i64)>>,
    pub failing_heartbeat: AtomicBool,
}

impl CountingWorkerRepository {
    pub fn new(inner: Arc<dyn WorkerRepository>) -> Self {
        Self {
            inner,
            subtract_calls: Mutex::new(Vec::new()),
            failing_heartbeat: AtomicBool::new(false),
        }
    }

    pub fn set_failing_heartbeat(&self, failing: bool) {
        self.failing_heartbeat.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<(String, i64)> {
        self.subtract_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl WorkerRepository for CountingWorkerRepository {
    async fn create(&self, worker: &WorkerInfo) -> HarvesterResult<()> {
        self.inner.create(worker).await
    }

    async fn get_by_id(&self, worker_id: &str) -> HarvesterResult<Option<WorkerInfo>> {
        self.inner.get_by_id(worker_id).await
    }

    async fn authenticate(&self, worker_id: &str, api_key: &str) -> HarvesterResult<bool> {
        self.inner.authenticate(worker_id, api_key).await
    }

    async fn list(&self) -> HarvesterResult<Vec<WorkerInfo>> {
        self.inner.list().await
    }

    async fn record_heartbeat(
        &self,
        worker_id: &str,
        metrics: &WorkerMetrics,
        at: DateTime<Utc>,
    ) -> HarvesterResult<bool> {
        if self.failing_heartbeat.load(Ordering::SeqCst) {
            return Err(HarvesterError::StorageUnavailable("模拟心跳写入失败".to_string()));
        }
        self.inner.record_heartbeat(worker_id, metrics, at).await
    }

    async fn take_restart_flag(&self, worker_id: &str) -> HarvesterResult<bool> {
        self.inner.take_restart_flag(worker_id).await
    }

    async fn request_restart(&self, worker_id: &str) -> HarvesterResult<bool> {
        self.inner.request_restart(worker_id).await
    }

    async fn request_restart_all(&self) -> HarvesterResult<u64> {
        self.inner.request_restart_all().await
    }

    async fn add_to_queue(&self, worker_id: &str, amount: i64) -> HarvesterResult<bool> {
        self.inner.add_to_queue(worker_id, amount).await
    }

    async fn subtract_from_queue(&self, worker_id: &str, amount: i64) -> HarvesterResult<bool> {
        self.subtract_calls
            .lock()
            .unwrap()
            .push((worker_id.to_string(), amount));
        self.inner.subtract_from_queue(worker_id, amount).await
    }

    async fn evict_idle(&self, cutoff: DateTime<Utc>) -> HarvesterResult<EvictionSummary> {
        self.inner.evict_idle(cutoff).await
    }

    async fn delete_all(&self) -> HarvesterResult<EvictionSummary> {
        self.inner.delete_all().await
    }
}

/// 可以切换为写入失败的结果仓储
pub struct FlakyResultRepository {
    inner: Arc<dyn ResultRepository>,
    pub failing: AtomicBool,
    pub failing_noredirect: AtomicBool,
    pub insert_calls: AtomicUsize,
}

impl FlakyResultRepository {
    pub fn new(inner: Arc<dyn ResultRepository>) -> Self {
        Self {
            inner,
            failing: AtomicBool::new(false),
            failing_noredirect: AtomicBool::new(false),
            insert_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// 只让无跳转记录写入失败
    pub fn set_failing_noredirect(&self, failing: bool) {
        self.failing_noredirect.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl ResultRepository for FlakyResultRepository {
    async fn insert_scraped_pages(
        &self,
        pages: &[ScrapedPage],
        stored_at: DateTime<Utc>,
    ) -> HarvesterResult<u64> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(HarvesterError::StorageUnavailable("模拟写入失败".to_string()));
        }
        self.inner.insert_scraped_pages(pages, stored_at).await
    }

    async fn insert_noredirect(&self, records: &[NoRedirectRecord]) -> HarvesterResult<u64> {
        if self.failing.load(Ordering::SeqCst) || self.failing_noredirect.load(Ordering::SeqCst) {
            return Err(HarvesterError::StorageUnavailable("模拟写入失败".to_string()));
        }
        self.inner.insert_noredirect(records).await
    }

    async fn count_scraped_since(&self, since: DateTime<Utc>) -> HarvesterResult<i64> {
        self.inner.count_scraped_since(since).await
    }
}

/// 可以让接下来若干次写入失败的积压仓储
pub struct FlakyBacklogRepository {
    inner: Arc<dyn BacklogRepository>,
    failing_enqueues: AtomicUsize,
}

impl FlakyBacklogRepository {
    pub fn new(inner: Arc<dyn BacklogRepository>) -> Self {
        Self {
            inner,
            failing_enqueues: AtomicUsize::new(0),
        }
    }

    pub fn fail_next_enqueues(&self, n: usize) {
        self.failing_enqueues.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl BacklogRepository for FlakyBacklogRepository {
    async fn enqueue(
        &self,
        identifiers: &[String],
        owner: Option<&str>,
        issued_at: Option<DateTime<Utc>>,
    ) -> HarvesterResult<u64> {
        let failing = self
            .failing_enqueues
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(HarvesterError::StorageUnavailable("模拟积压写入失败".to_string()));
        }
        self.inner.enqueue(identifiers, owner, issued_at).await
    }

    async fn sample_pending(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> HarvesterResult<Option<Vec<String>>> {
        self.inner.sample_pending(cutoff, limit).await
    }

    async fn delete(&self, identifiers: &[String]) -> HarvesterResult<u64> {
        self.inner.delete(identifiers).await
    }

    async fn count(&self) -> HarvesterResult<i64> {
        self.inner.count().await
    }
}

/// 指定服务的游标读取失败
pub struct BrokenCursorRepository {
    inner: Arc<dyn CursorRepository>,
    broken: Mutex<Option<String>>,
}

impl BrokenCursorRepository {
    pub fn new(inner: Arc<dyn CursorRepository>) -> Self {
        Self {
            inner,
            broken: Mutex::new(None),
        }
    }

    pub fn break_service(&self, service: Option<&str>) {
        *self.broken.lock().unwrap() = service.map(str::to_string);
    }
}

#[async_trait]
impl CursorRepository for BrokenCursorRepository {
    async fn seed(&self, services: &[String]) -> HarvesterResult<()> {
        self.inner.seed(services).await
    }

    async fn get(&self, service: &str) -> HarvesterResult<Option<i64>> {
        if self.broken.lock().unwrap().as_deref() == Some(service) {
            return Err(HarvesterError::StorageUnavailable("模拟游标读取失败".to_string()));
        }
        self.inner.get(service).await
    }

    async fn advance(&self, service: &str, last_index: i64) -> HarvesterResult<bool> {
        self.inner.advance(service, last_index).await
    }

    async fn list(&self) -> HarvesterResult<Vec<ServiceCursor>> {
        self.inner.list().await
    }
}

pub fn sample_page(worker_id: &str, n: usize) -> ScrapedPage {
    ScrapedPage {
        worker_id: worker_id.to_string(),
        unresolved_url: format!("https://bit.ly/p{n}"),
        resolved_url: format!("https://example.com/{n}"),
        title: format!("Title {n}"),
        short_description: "short".to_string(),
        full_text: "full text".to_string(),
        scraped_at: Utc::now(),
    }
}
