use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};

use harvester_core::config::ResultCacheConfig;
use harvester_domain::entities::{ScrapedPage, StatType};
use harvester_domain::repositories::{ResultRepository, StatisticsRepository};
use harvester_infrastructure::MetricsCollector;

/// 抓取结果缓存
///
/// 提交方只追加到内存缓冲区。缓冲区满时把现有内容整体取走并在后台写入，
/// 另有定时任务按固定间隔刷新，任何一行停留的时间不超过该间隔。
/// 每次刷新取走的行互不重叠，写库过程由 `flush_lock` 串行化。
pub struct ResultCache {
    buffer: Mutex<Vec<ScrapedPage>>,
    flush_lock: Mutex<()>,
    result_repo: Arc<dyn ResultRepository>,
    stats_repo: Arc<dyn StatisticsRepository>,
    metrics: Arc<MetricsCollector>,
    config: ResultCacheConfig,
}

impl ResultCache {
    pub fn new(
        result_repo: Arc<dyn ResultRepository>,
        stats_repo: Arc<dyn StatisticsRepository>,
        metrics: Arc<MetricsCollector>,
        config: ResultCacheConfig,
    ) -> Self {
        Self {
            buffer: Mutex::new(Vec::with_capacity(config.capacity)),
            flush_lock: Mutex::new(()),
            result_repo,
            stats_repo,
            metrics,
            config,
        }
    }

    /// 追加一行，缓冲区已满时先触发后台刷新，不等待刷新完成
    pub async fn push(self: &Arc<Self>, row: ScrapedPage) {
        let full = {
            let mut buffer = self.buffer.lock().await;
            let taken = if buffer.len() >= self.config.capacity {
                Some(std::mem::take(&mut *buffer))
            } else {
                None
            };
            buffer.push(row);
            taken
        };

        if let Some(rows) = full {
            debug!("结果缓存已满, 后台刷新 {} 行", rows.len());
            let cache = Arc::clone(self);
            tokio::spawn(async move {
                cache.write_rows(rows).await;
            });
        }
    }

    pub async fn push_many(self: &Arc<Self>, rows: Vec<ScrapedPage>) {
        for row in rows {
            self.push(row).await;
        }
    }

    /// 写入当前缓冲区中的全部行
    pub async fn flush(&self) {
        let rows = std::mem::take(&mut *self.buffer.lock().await);
        if !rows.is_empty() {
            self.write_rows(rows).await;
        }
    }

    pub async fn len(&self) -> usize {
        self.buffer.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.buffer.lock().await.is_empty()
    }

    async fn write_rows(&self, rows: Vec<ScrapedPage>) {
        let _guard = self.flush_lock.lock().await;

        match self.result_repo.insert_scraped_pages(&rows, Utc::now()).await {
            Ok(inserted) => {
                self.metrics.record_result_rows_flushed(inserted);
                if let Err(e) = self
                    .stats_repo
                    .apply_deltas(&[(StatType::ScrapedPages, inserted as i64)])
                    .await
                {
                    error!("更新抓取计数失败: {}", e);
                }
                debug!("结果缓存写入 {} 行", inserted);
            }
            Err(e) => {
                error!("结果缓存写入失败, 保留 {} 行待下次重试: {}", rows.len(), e);
                self.retain(rows).await;
            }
        }
    }

    /// 写入失败的行放回缓冲区头部，超过上限时丢弃最旧的行
    async fn retain(&self, mut rows: Vec<ScrapedPage>) {
        let mut buffer = self.buffer.lock().await;
        rows.append(&mut buffer);

        let overflow = rows.len().saturating_sub(self.config.max_retained_rows);
        if overflow > 0 {
            rows.drain(..overflow);
            self.metrics.record_result_rows_discarded(overflow as u64);
            warn!("结果缓存超出保留上限, 丢弃最旧的 {} 行", overflow);
        }

        *buffer = rows;
    }

    /// 定时刷新，收到停止信号后做最后一次刷新
    pub async fn run_ticker(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            "启动结果缓存定时刷新, 间隔 {} 秒",
            self.config.flush_interval_seconds
        );

        let mut ticker =
            tokio::time::interval(Duration::from_secs(self.config.flush_interval_seconds));
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.flush().await;
                }
                _ = shutdown_rx.recv() => {
                    info!("收到停止信号, 刷新结果缓存");
                    break;
                }
            }
        }

        self.flush().await;
        // 等待仍在进行的后台刷新
        let _guard = self.flush_lock.lock().await;
        info!("结果缓存已停止");
    }
}
