use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use harvester_core::HarvesterResult;
use harvester_domain::entities::{ControlFlags, ServiceCursor, StatType, WorkerStatus};
use harvester_domain::repositories::{CursorRepository, ResultRepository, StatisticsRepository};

use crate::backlog::BacklogStore;
use crate::backpressure::BackpressureController;
use crate::registry::{WorkerRegistry, WorkerView};

/// 单个计数项。百分比与变化量在读取时计算
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CounterView {
    pub name: StatType,
    pub count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    pub generated_at: DateTime<Utc>,
    pub counters: Vec<CounterView>,
    pub cursors: Vec<ServiceCursor>,
    pub cursor_total: i64,
    pub backlog_size: i64,
    pub workers_total: usize,
    pub workers_active: usize,
    pub workers: Vec<WorkerView>,
    pub flags: ControlFlags,
}

/// 管理端统计视图
pub struct StatisticsService {
    stats_repo: Arc<dyn StatisticsRepository>,
    cursor_repo: Arc<dyn CursorRepository>,
    result_repo: Arc<dyn ResultRepository>,
    backlog: Arc<BacklogStore>,
    registry: Arc<WorkerRegistry>,
    backpressure: Arc<BackpressureController>,
}

impl StatisticsService {
    pub fn new(
        stats_repo: Arc<dyn StatisticsRepository>,
        cursor_repo: Arc<dyn CursorRepository>,
        result_repo: Arc<dyn ResultRepository>,
        backlog: Arc<BacklogStore>,
        registry: Arc<WorkerRegistry>,
        backpressure: Arc<BackpressureController>,
    ) -> Self {
        Self {
            stats_repo,
            cursor_repo,
            result_repo,
            backlog,
            registry,
            backpressure,
        }
    }

    pub async fn snapshot(&self) -> HarvesterResult<DashboardSnapshot> {
        let now = Utc::now();

        let counts = self.stats_repo.get_counts().await?;
        let recent_pages = self
            .result_repo
            .count_scraped_since(now - Duration::minutes(1))
            .await?;
        let counters = derive_counters(&counts, recent_pages);

        let cursors = self.cursor_repo.list().await?;
        let cursor_total = cursors.iter().map(|c| c.last_index).sum();

        let workers = self.registry.views(now).await?;
        let workers_active = workers
            .iter()
            .filter(|w| w.status == WorkerStatus::Active)
            .count();

        Ok(DashboardSnapshot {
            generated_at: now,
            counters,
            cursors,
            cursor_total,
            backlog_size: self.backlog.count().await?,
            workers_total: workers.len(),
            workers_active,
            workers,
            flags: self.backpressure.flags().await,
        })
    }
}

fn derive_counters(counts: &[(StatType, i64)], recent_pages: i64) -> Vec<CounterView> {
    let count_of = |stat: StatType| {
        counts
            .iter()
            .find(|(s, _)| *s == stat)
            .map(|(_, c)| *c)
            .unwrap_or_default()
    };
    let total_url = count_of(StatType::TotalUrl);

    StatType::ALL
        .iter()
        .map(|&stat| {
            let count = count_of(stat);
            let percentage = match stat {
                StatType::UrlNotFound | StatType::RedirectFailed => {
                    Some(percentage_of(count, total_url))
                }
                _ => None,
            };
            let change = (stat == StatType::ScrapedPages).then_some(recent_pages);

            CounterView {
                name: stat,
                count,
                percentage,
                change,
            }
        })
        .collect()
}

fn percentage_of(part: i64, whole: i64) -> f64 {
    if whole <= 0 {
        return 0.0;
    }
    (part as f64 / whole as f64 * 10000.0).round() / 100.0
}
