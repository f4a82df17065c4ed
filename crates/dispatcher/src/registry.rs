use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::distr::Alphanumeric;
use rand::Rng;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use harvester_core::config::WorkerHealthConfig;
use harvester_core::{HarvesterError, HarvesterResult};
use harvester_domain::entities::{
    EvictionSummary, HeartbeatStatus, StatType, WorkerInfo, WorkerMetrics, WorkerStatus,
};
use harvester_domain::repositories::{StatisticsRepository, WorkerRepository};

const API_KEY_LENGTH: usize = 44;

/// 注册后返回给Worker的凭证
#[derive(Debug, Clone, Serialize)]
pub struct WorkerCredentials {
    pub worker_id: String,
    pub api_key: String,
}

/// 管理端展示用的Worker视图
#[derive(Debug, Clone, Serialize)]
pub struct WorkerView {
    pub worker_id: String,
    pub status: WorkerStatus,
    pub last_seen: String,
    pub last_updated: DateTime<Utc>,
    pub queue: i64,
    pub restart_pending: bool,
    pub metrics: Option<WorkerMetrics>,
}

/// Worker注册表
///
/// 状态 未注册 -> 活跃 -> 空闲 -> 清除。空闲只是按最近心跳时间推导出的标签，
/// 重启标记独立于状态，投递一次后即清除。
pub struct WorkerRegistry {
    worker_repo: Arc<dyn WorkerRepository>,
    stats_repo: Arc<dyn StatisticsRepository>,
    config: WorkerHealthConfig,
}

impl WorkerRegistry {
    pub fn new(
        worker_repo: Arc<dyn WorkerRepository>,
        stats_repo: Arc<dyn StatisticsRepository>,
        config: WorkerHealthConfig,
    ) -> Self {
        Self {
            worker_repo,
            stats_repo,
            config,
        }
    }

    pub async fn register(&self) -> HarvesterResult<WorkerCredentials> {
        let worker_id = Uuid::new_v4().to_string();
        let api_key: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(API_KEY_LENGTH)
            .map(char::from)
            .collect();

        let worker = WorkerInfo::new(worker_id.clone(), api_key.clone(), Utc::now());
        self.worker_repo.create(&worker).await?;

        info!("新Worker注册: {}", worker_id);
        Ok(WorkerCredentials { worker_id, api_key })
    }

    /// 凭证不匹配时返回 `AuthFailure`，调用方需要重新注册
    pub async fn authenticate(&self, worker_id: &str, api_key: &str) -> HarvesterResult<()> {
        if worker_id.is_empty() || api_key.is_empty() {
            return Err(HarvesterError::AuthFailure);
        }

        if self.worker_repo.authenticate(worker_id, api_key).await? {
            Ok(())
        } else {
            debug!("Worker认证失败: {}", worker_id);
            Err(HarvesterError::AuthFailure)
        }
    }

    /// 记录心跳并给出指令，restart 优先于 hold
    ///
    /// 心跳写入成功后才取走重启标记，写入失败时标记保留到下一次心跳。
    pub async fn heartbeat(
        &self,
        worker_id: &str,
        metrics: &WorkerMetrics,
        worker_hold: bool,
    ) -> HarvesterResult<HeartbeatStatus> {
        if !self
            .worker_repo
            .record_heartbeat(worker_id, metrics, Utc::now())
            .await?
        {
            return Err(HarvesterError::WorkerNotFound {
                id: worker_id.to_string(),
            });
        }

        let restart = self.worker_repo.take_restart_flag(worker_id).await?;

        let status = HeartbeatStatus::resolve(restart, worker_hold);
        if status == HeartbeatStatus::Restart {
            info!("向Worker {} 下发重启指令", worker_id);
        }
        Ok(status)
    }

    pub async fn request_restart(&self, worker_id: &str) -> HarvesterResult<()> {
        if self.worker_repo.request_restart(worker_id).await? {
            Ok(())
        } else {
            Err(HarvesterError::WorkerNotFound {
                id: worker_id.to_string(),
            })
        }
    }

    pub async fn request_restart_all(&self) -> HarvesterResult<u64> {
        let flagged = self.worker_repo.request_restart_all().await?;
        info!("已标记 {} 个Worker重启", flagged);
        Ok(flagged)
    }

    pub async fn add_to_queue(&self, worker_id: &str, amount: i64) -> HarvesterResult<()> {
        if !self.worker_repo.add_to_queue(worker_id, amount).await? {
            warn!("增加任务数时Worker已不存在: {}", worker_id);
        }
        Ok(())
    }

    /// 清除超过空闲超时的Worker，其未回报任务数从全局队列计数中扣除
    pub async fn evict_idle(&self) -> HarvesterResult<EvictionSummary> {
        let cutoff = Utc::now() - Duration::seconds(self.config.idle_timeout_seconds as i64);
        let summary = self.worker_repo.evict_idle(cutoff).await?;
        self.settle_queue(&summary).await?;

        if summary.workers > 0 {
            info!(
                "清除 {} 个空闲Worker, 释放任务 {}",
                summary.workers, summary.outstanding_queue
            );
        }
        Ok(summary)
    }

    /// 删除全部Worker
    pub async fn wipe(&self) -> HarvesterResult<EvictionSummary> {
        let summary = self.worker_repo.delete_all().await?;
        self.settle_queue(&summary).await?;

        warn!("已删除全部Worker: {}", summary.workers);
        Ok(summary)
    }

    async fn settle_queue(&self, summary: &EvictionSummary) -> HarvesterResult<()> {
        if summary.outstanding_queue != 0 {
            self.stats_repo
                .apply_deltas(&[(StatType::QueueSize, -summary.outstanding_queue)])
                .await?;
        }
        Ok(())
    }

    pub async fn views(&self, now: DateTime<Utc>) -> HarvesterResult<Vec<WorkerView>> {
        let window = Duration::seconds(self.config.active_window_seconds as i64);
        let workers = self.worker_repo.list().await?;

        Ok(workers
            .into_iter()
            .map(|worker| WorkerView {
                status: worker.status_at(now, window),
                last_seen: format_last_seen(now - worker.last_updated),
                worker_id: worker.worker_id,
                last_updated: worker.last_updated,
                queue: worker.queue,
                restart_pending: worker.restart_pending,
                metrics: worker.metrics,
            })
            .collect())
    }
}

fn format_last_seen(elapsed: Duration) -> String {
    let seconds = elapsed.num_seconds().max(0);
    if seconds < 60 {
        format!("{seconds}s ago")
    } else if seconds < 3600 {
        format!("{}m ago", seconds / 60)
    } else {
        format!("{}h ago", seconds / 3600)
    }
}
