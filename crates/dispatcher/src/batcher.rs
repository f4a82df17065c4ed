//! 合并写入器
//!
//! 请求处理路径通过 [`BatchHandle`] 投递事件，唯一的后台消费者 [`CoalescingBatcher`]
//! 独占累积状态：等到第一个事件后把通道中已有的事件全部取出合并，等待一个节流窗口，
//! 再把合并结果以少量批量语句落库。写入次数只与不同的键数量有关，与事件数量无关。
//!
//! 通道有界。生产者发现通道已满时唤醒消费者立即落库，然后等待空位。
//! 某个批量操作失败时记录日志并丢弃该操作对应的数据，不做重试。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::{broadcast, Notify};
use tracing::{debug, error, info};

use harvester_core::config::BatcherConfig;
use harvester_core::{HarvesterError, HarvesterResult};
use harvester_domain::entities::{NoRedirectRecord, ScrapedPage, StatType};
use harvester_domain::events::BatchEvent;
use harvester_domain::repositories::{ResultRepository, StatisticsRepository, WorkerRepository};
use harvester_infrastructure::MetricsCollector;

use crate::backlog::BacklogStore;
use crate::result_cache::ResultCache;

/// 事件投递端，可任意克隆
#[derive(Clone)]
pub struct BatchHandle {
    tx: mpsc::Sender<BatchEvent>,
    flush_now: Arc<Notify>,
}

impl BatchHandle {
    pub async fn submit(&self, event: BatchEvent) -> HarvesterResult<()> {
        match self.tx.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(event)) => {
                debug!("合并写入通道已满, 请求立即落库");
                self.flush_now.notify_one();
                self.tx
                    .send(event)
                    .await
                    .map_err(|_| HarvesterError::internal("合并写入器已停止"))
            }
            Err(TrySendError::Closed(_)) => Err(HarvesterError::internal("合并写入器已停止")),
        }
    }

    pub async fn subtract(&self, worker_id: &str, amount: i64) -> HarvesterResult<()> {
        self.submit(BatchEvent::Subtract {
            worker_id: worker_id.to_string(),
            amount,
        })
        .await
    }

    pub async fn delete(&self, identifier: &str) -> HarvesterResult<()> {
        self.submit(BatchEvent::Delete {
            identifier: identifier.to_string(),
        })
        .await
    }

    pub async fn success(&self, page: ScrapedPage) -> HarvesterResult<()> {
        self.submit(BatchEvent::Success(page)).await
    }

    pub async fn noredirect(&self, record: NoRedirectRecord) -> HarvesterResult<()> {
        self.submit(BatchEvent::NoRedirect(record)).await
    }

    pub async fn notfound(&self) -> HarvesterResult<()> {
        self.submit(BatchEvent::NotFound).await
    }
}

/// 一个周期内合并后的事件
#[derive(Debug, Default)]
pub struct PendingBatch {
    pub subtract: HashMap<String, i64>,
    pub deletes: HashSet<String>,
    pub successes: Vec<ScrapedPage>,
    pub noredirects: Vec<NoRedirectRecord>,
    pub not_found: i64,
    pub events: u64,
}

impl PendingBatch {
    pub fn absorb(&mut self, event: BatchEvent) {
        self.events += 1;
        match event {
            BatchEvent::Subtract { worker_id, amount } => {
                *self.subtract.entry(worker_id).or_insert(0) += amount;
            }
            BatchEvent::Delete { identifier } => {
                self.deletes.insert(identifier);
            }
            BatchEvent::Success(page) => self.successes.push(page),
            BatchEvent::NoRedirect(record) => self.noredirects.push(record),
            BatchEvent::NotFound => self.not_found += 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.events == 0
    }
}

/// 合并写入消费者
pub struct CoalescingBatcher {
    rx: mpsc::Receiver<BatchEvent>,
    flush_now: Arc<Notify>,
    worker_repo: Arc<dyn WorkerRepository>,
    stats_repo: Arc<dyn StatisticsRepository>,
    result_repo: Arc<dyn ResultRepository>,
    backlog: Arc<BacklogStore>,
    result_cache: Arc<ResultCache>,
    metrics: Arc<MetricsCollector>,
    throttle: Duration,
}

impl CoalescingBatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &BatcherConfig,
        worker_repo: Arc<dyn WorkerRepository>,
        stats_repo: Arc<dyn StatisticsRepository>,
        result_repo: Arc<dyn ResultRepository>,
        backlog: Arc<BacklogStore>,
        result_cache: Arc<ResultCache>,
        metrics: Arc<MetricsCollector>,
    ) -> (BatchHandle, Self) {
        let (tx, rx) = mpsc::channel(config.channel_capacity);
        let flush_now = Arc::new(Notify::new());

        let handle = BatchHandle {
            tx,
            flush_now: flush_now.clone(),
        };
        let batcher = Self {
            rx,
            flush_now,
            worker_repo,
            stats_repo,
            result_repo,
            backlog,
            result_cache,
            metrics,
            throttle: Duration::from_millis(config.throttle_millis),
        };

        (handle, batcher)
    }

    /// 消费循环。收到停止信号后关闭通道，取完剩余事件做最后一次落库再退出
    pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("启动合并写入器, 节流窗口 {:?}", self.throttle);
        let mut closing = false;

        loop {
            let first = if closing {
                self.rx.recv().await
            } else {
                tokio::select! {
                    event = self.rx.recv() => event,
                    _ = shutdown_rx.recv() => {
                        closing = true;
                        self.rx.close();
                        self.rx.recv().await
                    }
                }
            };

            let Some(first) = first else {
                break;
            };

            let mut batch = PendingBatch::default();
            batch.absorb(first);
            self.drain_into(&mut batch);

            if !closing {
                tokio::select! {
                    _ = tokio::time::sleep(self.throttle) => {}
                    _ = self.flush_now.notified() => {
                        debug!("提前结束节流窗口");
                    }
                    _ = shutdown_rx.recv() => {
                        closing = true;
                        self.rx.close();
                    }
                }
                self.drain_into(&mut batch);
            }

            self.flush(batch).await;
        }

        info!("合并写入器已停止");
    }

    /// 非阻塞地取出通道中已有的全部事件
    fn drain_into(&mut self, batch: &mut PendingBatch) {
        while let Ok(event) = self.rx.try_recv() {
            batch.absorb(event);
        }
    }

    /// 把一个周期的合并结果落库
    pub async fn flush(&self, batch: PendingBatch) {
        if batch.is_empty() {
            return;
        }

        let started = Instant::now();
        self.metrics.record_events_absorbed(batch.events);
        debug!(
            "落库合并批次: 事件 {}, 扣减 {} 个Worker, 删除 {}, 成功 {}, 无跳转 {}, 未找到 {}",
            batch.events,
            batch.subtract.len(),
            batch.deletes.len(),
            batch.successes.len(),
            batch.noredirects.len(),
            batch.not_found
        );

        let PendingBatch {
            subtract,
            mut deletes,
            successes,
            noredirects,
            not_found,
            ..
        } = batch;

        let mut deltas = Vec::new();

        // 每个Worker一条扣减语句
        let mut applied = 0;
        for (worker_id, amount) in subtract {
            match self.worker_repo.subtract_from_queue(&worker_id, amount).await {
                Ok(true) => applied += amount,
                Ok(false) => debug!("跳过Worker {} 的任务数扣减: {}", worker_id, amount),
                Err(e) => {
                    error!("扣减Worker {} 任务数失败: {}", worker_id, e);
                    self.metrics.record_flush_failure("subtract", 1);
                }
            }
        }
        if applied != 0 {
            deltas.push((StatType::QueueSize, -applied));
        }

        // 无跳转的标识符会重新作为冷任务写入，不参与删除
        let retry: Vec<String> = noredirects
            .iter()
            .map(|r| r.unresolved_url.clone())
            .collect();
        for identifier in &retry {
            deletes.remove(identifier);
        }

        if !deletes.is_empty() {
            let deletes: Vec<String> = deletes.into_iter().collect();
            if let Err(e) = self.backlog.delete(&deletes).await {
                error!("批量删除待确认任务失败, 丢弃 {} 条: {}", deletes.len(), e);
                self.metrics
                    .record_flush_failure("delete", deletes.len() as u64);
            }
        }

        if !successes.is_empty() {
            self.result_cache.push_many(successes).await;
        }

        if !noredirects.is_empty() {
            match self.result_repo.insert_noredirect(&noredirects).await {
                Ok(inserted) => deltas.push((StatType::RedirectFailed, inserted as i64)),
                Err(e) => {
                    error!("写入无跳转记录失败, 丢弃 {} 条: {}", noredirects.len(), e);
                    self.metrics
                        .record_flush_failure("noredirect", noredirects.len() as u64);
                }
            }

            if let Err(e) = self.backlog.enqueue(&retry, None).await {
                error!("重新写入无跳转任务失败, 丢弃 {} 条: {}", retry.len(), e);
                self.metrics
                    .record_flush_failure("requeue", retry.len() as u64);
            }
        }

        if not_found > 0 {
            deltas.push((StatType::UrlNotFound, not_found));
        }

        if !deltas.is_empty() {
            if let Err(e) = self.stats_repo.apply_deltas(&deltas).await {
                error!("累加统计计数失败, 丢弃 {:?}: {}", deltas, e);
                self.metrics.record_flush_failure("statistics", deltas.len() as u64);
            }
        }

        let elapsed = started.elapsed();
        self.metrics.record_flush_cycle(elapsed.as_secs_f64());
        debug!("合并批次落库完成, 耗时 {:?}", elapsed);
    }
}
