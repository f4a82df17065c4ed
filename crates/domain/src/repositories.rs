//! 领域仓储抽象
//!
//! 定义数据访问的抽象接口，遵循依赖倒置原则

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use harvester_core::HarvesterResult;

use crate::entities::{
    ControlFlags, EvictionSummary, NoRedirectRecord, ScrapedPage, ServiceCursor, StatType,
    WorkerInfo, WorkerMetrics,
};

/// 服务游标仓储抽象
#[async_trait]
pub trait CursorRepository: Send + Sync {
    /// 不存在的服务游标以0初始化
    async fn seed(&self, services: &[String]) -> HarvesterResult<()>;
    async fn get(&self, service: &str) -> HarvesterResult<Option<i64>>;
    /// 只允许前进，返回是否实际更新
    async fn advance(&self, service: &str, last_index: i64) -> HarvesterResult<bool>;
    async fn list(&self) -> HarvesterResult<Vec<ServiceCursor>>;
}

/// 任务积压仓储抽象
#[async_trait]
pub trait BacklogRepository: Send + Sync {
    /// 批量写入，已存在的标识符会被重新标记归属和下发时间
    async fn enqueue(
        &self,
        identifiers: &[String],
        owner: Option<&str>,
        issued_at: Option<DateTime<Utc>>,
    ) -> HarvesterResult<u64>;
    /// 抽取下发时间早于 `cutoff` 或从未下发的任务，没有符合条件的任务时返回 None
    async fn sample_pending(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> HarvesterResult<Option<Vec<String>>>;
    async fn delete(&self, identifiers: &[String]) -> HarvesterResult<u64>;
    async fn count(&self) -> HarvesterResult<i64>;
}

/// Worker仓储抽象
#[async_trait]
pub trait WorkerRepository: Send + Sync {
    async fn create(&self, worker: &WorkerInfo) -> HarvesterResult<()>;
    async fn get_by_id(&self, worker_id: &str) -> HarvesterResult<Option<WorkerInfo>>;
    async fn authenticate(&self, worker_id: &str, api_key: &str) -> HarvesterResult<bool>;
    async fn list(&self) -> HarvesterResult<Vec<WorkerInfo>>;
    async fn record_heartbeat(
        &self,
        worker_id: &str,
        metrics: &WorkerMetrics,
        at: DateTime<Utc>,
    ) -> HarvesterResult<bool>;
    /// 读取并清除重启标记，同一次重启请求最多被读到一次
    async fn take_restart_flag(&self, worker_id: &str) -> HarvesterResult<bool>;
    async fn request_restart(&self, worker_id: &str) -> HarvesterResult<bool>;
    async fn request_restart_all(&self) -> HarvesterResult<u64>;
    async fn add_to_queue(&self, worker_id: &str, amount: i64) -> HarvesterResult<bool>;
    /// 仅当结果不为负时扣减，返回是否扣减成功
    async fn subtract_from_queue(&self, worker_id: &str, amount: i64) -> HarvesterResult<bool>;
    async fn evict_idle(&self, cutoff: DateTime<Utc>) -> HarvesterResult<EvictionSummary>;
    async fn delete_all(&self) -> HarvesterResult<EvictionSummary>;
}

/// 统计计数器仓储抽象
#[async_trait]
pub trait StatisticsRepository: Send + Sync {
    /// 只做增量累加，不覆盖
    async fn apply_deltas(&self, deltas: &[(StatType, i64)]) -> HarvesterResult<()>;
    async fn get_counts(&self) -> HarvesterResult<Vec<(StatType, i64)>>;
}

/// 全局开关仓储抽象
#[async_trait]
pub trait ControlRepository: Send + Sync {
    async fn load(&self) -> HarvesterResult<ControlFlags>;
    async fn store(&self, flags: &ControlFlags) -> HarvesterResult<()>;
}

/// 抓取结果仓储抽象
#[async_trait]
pub trait ResultRepository: Send + Sync {
    async fn insert_scraped_pages(
        &self,
        pages: &[ScrapedPage],
        stored_at: DateTime<Utc>,
    ) -> HarvesterResult<u64>;
    async fn insert_noredirect(&self, records: &[NoRedirectRecord]) -> HarvesterResult<u64>;
    async fn count_scraped_since(&self, since: DateTime<Utc>) -> HarvesterResult<i64>;
}
