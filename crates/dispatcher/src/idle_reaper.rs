use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use harvester_core::config::WorkerHealthConfig;
use harvester_core::HarvesterResult;
use harvester_domain::entities::{EvictionSummary, WorkerStatus};
use harvester_infrastructure::MetricsCollector;

use crate::registry::WorkerRegistry;

/// 空闲Worker清理服务接口
#[async_trait]
pub trait IdleReaperService: Send + Sync {
    /// 执行一轮清理
    async fn reap_once(&self) -> HarvesterResult<EvictionSummary>;

    /// 运行清理循环直到收到停止信号
    async fn run(&self, shutdown_rx: broadcast::Receiver<()>);
}

/// 定期清除长时间没有心跳的Worker
pub struct IdleReaper {
    registry: Arc<WorkerRegistry>,
    metrics: Arc<MetricsCollector>,
    config: WorkerHealthConfig,
}

impl IdleReaper {
    pub fn new(
        registry: Arc<WorkerRegistry>,
        metrics: Arc<MetricsCollector>,
        config: WorkerHealthConfig,
    ) -> Self {
        Self {
            registry,
            metrics,
            config,
        }
    }

    async fn refresh_active_gauge(&self) -> HarvesterResult<usize> {
        let active = self
            .registry
            .views(Utc::now())
            .await?
            .iter()
            .filter(|view| view.status == WorkerStatus::Active)
            .count();
        self.metrics.update_active_workers(active as f64);
        Ok(active)
    }
}

#[async_trait]
impl IdleReaperService for IdleReaper {
    async fn reap_once(&self) -> HarvesterResult<EvictionSummary> {
        let summary = self.registry.evict_idle().await?;
        if summary.workers > 0 {
            self.metrics.record_workers_evicted(summary.workers);
        }

        let active = self.refresh_active_gauge().await?;
        debug!("空闲清理完成, 当前活跃Worker {}", active);
        Ok(summary)
    }

    async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            "启动空闲Worker清理, 间隔 {} 秒, 超时 {} 秒",
            self.config.reap_interval_seconds, self.config.idle_timeout_seconds
        );

        let mut ticker =
            tokio::time::interval(Duration::from_secs(self.config.reap_interval_seconds));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.reap_once().await {
                        error!("清理空闲Worker时出错: {}", e);
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("收到停止信号, 退出空闲Worker清理");
                    break;
                }
            }
        }
    }
}
