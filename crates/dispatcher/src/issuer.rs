use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use harvester_core::{HarvesterError, HarvesterResult};
use harvester_domain::entities::StatType;
use harvester_domain::repositories::StatisticsRepository;
use harvester_infrastructure::MetricsCollector;

use crate::backlog::BacklogStore;
use crate::backpressure::BackpressureController;
use crate::generator::IdSpaceGenerator;
use crate::registry::WorkerRegistry;

/// 任务下发
///
/// 先取积压中超时未确认的任务，没有时再为每个服务生成一块新标识符。
/// 调用方断开连接时 future 被丢弃，延迟等待随之取消。
pub struct TaskIssuer {
    generator: Arc<IdSpaceGenerator>,
    backlog: Arc<BacklogStore>,
    registry: Arc<WorkerRegistry>,
    backpressure: Arc<BackpressureController>,
    stats_repo: Arc<dyn StatisticsRepository>,
    metrics: Arc<MetricsCollector>,
    chunk_size: usize,
}

impl TaskIssuer {
    pub fn new(
        generator: Arc<IdSpaceGenerator>,
        backlog: Arc<BacklogStore>,
        registry: Arc<WorkerRegistry>,
        backpressure: Arc<BackpressureController>,
        stats_repo: Arc<dyn StatisticsRepository>,
        metrics: Arc<MetricsCollector>,
        chunk_size: usize,
    ) -> Self {
        Self {
            generator,
            backlog,
            registry,
            backpressure,
            stats_repo,
            metrics,
            chunk_size,
        }
    }

    pub async fn claim(&self, worker_id: &str) -> HarvesterResult<Vec<String>> {
        let flags = self.backpressure.flags().await;
        if flags.queue_hold {
            debug!("队列暂停, Worker {} 本次不下发任务", worker_id);
            return Ok(Vec::new());
        }

        if flags.delay_seconds > 0 {
            tokio::time::sleep(Duration::from_secs(flags.delay_seconds)).await;
        }

        let (urls, fresh) = match self.backlog.sample_pending().await? {
            Some(pending) => (pending, 0),
            None => {
                let generated = self.generate_fresh().await?;
                let fresh = generated.len();
                (generated, fresh)
            }
        };

        if urls.is_empty() {
            return Ok(urls);
        }

        let issued = urls.len() as i64;
        if let Err(e) = self.backlog.enqueue(&urls, Some(worker_id)).await {
            // 游标已前进，新生成的标识符只能靠积压表找回
            if fresh > 0 {
                self.preserve(&urls).await;
            }
            return Err(e);
        }
        self.registry.add_to_queue(worker_id, issued).await?;

        let mut deltas = vec![(StatType::QueueSize, issued)];
        if fresh > 0 {
            deltas.push((StatType::TotalUrl, fresh as i64));
            self.metrics.record_identifiers_generated(fresh as u64);
        }
        self.stats_repo.apply_deltas(&deltas).await?;
        self.metrics.record_tasks_issued(issued as u64);

        info!(
            "向Worker {} 下发 {} 个任务 (新生成 {})",
            worker_id, issued, fresh
        );
        Ok(urls)
    }

    /// 按配置顺序为每个服务生成一块，耗尽的服务跳过
    async fn generate_fresh(&self) -> HarvesterResult<Vec<String>> {
        let mut urls = Vec::new();
        let mut exhausted = None;

        for service in self.generator.service_names() {
            match self.generator.next_chunk(service, self.chunk_size).await {
                Ok(chunk) => urls.extend(chunk.urls),
                Err(HarvesterError::IdSpaceExhausted { service }) => {
                    error!("服务 {} 的标识符空间已耗尽, 跳过", service);
                    exhausted = Some(service);
                }
                Err(e) => {
                    self.preserve(&urls).await;
                    return Err(e);
                }
            }
        }

        match exhausted {
            Some(service) if urls.is_empty() => Err(HarvesterError::IdSpaceExhausted { service }),
            _ => Ok(urls),
        }
    }

    /// 未能下发的新标识符以无归属状态写入积压，下次认领时直接取出
    async fn preserve(&self, urls: &[String]) {
        if urls.is_empty() {
            return;
        }

        if let Err(e) = self.backlog.enqueue(urls, None).await {
            error!("保存未下发的标识符失败, 丢失 {} 个: {}", urls.len(), e);
            return;
        }

        let generated = urls.len() as i64;
        self.metrics.record_identifiers_generated(generated as u64);
        if let Err(e) = self
            .stats_repo
            .apply_deltas(&[(StatType::TotalUrl, generated)])
            .await
        {
            warn!("更新生成总数失败: {}", e);
        }
        warn!("下发失败, {} 个新标识符已转入积压", generated);
    }
}
