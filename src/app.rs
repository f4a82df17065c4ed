use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use harvester_api::{create_app, AppState};
use harvester_core::config::AppConfig;
use harvester_dispatcher::{
    BacklogStore, BackpressureController, CoalescingBatcher, IdSpaceGenerator, IdleReaper,
    IdleReaperService, ResultCache, ResultIntake, StatisticsService, TaskIssuer, WorkerRegistry,
};
use harvester_domain::repositories::{
    BacklogRepository, ControlRepository, CursorRepository, ResultRepository,
    StatisticsRepository, WorkerRepository,
};
use harvester_infrastructure::{
    DatabaseManager, MetricsCollector, SqliteBacklogRepository, SqliteControlRepository,
    SqliteCursorRepository, SqliteResultRepository, SqliteStatisticsRepository,
    SqliteWorkerRepository,
};
use tokio::{net::TcpListener, sync::broadcast, task::JoinHandle};
use tracing::{error, info, warn};

/// 协调器应用
///
/// 持有组装好的服务，后台任务在 [`Application::spawn_background`] 中启动。
pub struct Application {
    config: AppConfig,
    database: Arc<DatabaseManager>,
    state: AppState,
    batcher: CoalescingBatcher,
    cache: Arc<ResultCache>,
    reaper: Arc<IdleReaper>,
}

impl Application {
    /// 连接数据库并组装所有服务
    pub async fn new(config: AppConfig) -> Result<Self> {
        info!("初始化协调器");

        let database = Arc::new(
            DatabaseManager::new(&config.database)
                .await
                .context("初始化数据库失败")?,
        );
        Self::with_database(config, database).await
    }

    /// 使用已有的数据库连接池组装服务
    pub async fn with_database(config: AppConfig, database: Arc<DatabaseManager>) -> Result<Self> {
        let coordinator = &config.coordinator;
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

        let generator = Arc::new(
            IdSpaceGenerator::new(cursor_repo.clone(), &coordinator.services)
                .context("创建标识符生成器失败")?,
        );
        generator.seed_cursors().await.context("初始化服务游标失败")?;

        let backlog = Arc::new(BacklogStore::new(backlog_repo, coordinator.backlog.clone()));
        let registry = Arc::new(WorkerRegistry::new(
            worker_repo.clone(),
            stats_repo.clone(),
            coordinator.workers.clone(),
        ));
        let backpressure = Arc::new(
            BackpressureController::load(control_repo, coordinator.max_delay_seconds)
                .await
                .context("加载全局控制标志失败")?,
        );
        let cache = Arc::new(ResultCache::new(
            result_repo.clone(),
            stats_repo.clone(),
            metrics.clone(),
            coordinator.result_cache.clone(),
        ));
        let (batch_handle, batcher) = CoalescingBatcher::new(
            &coordinator.batcher,
            worker_repo,
            stats_repo.clone(),
            result_repo.clone(),
            backlog.clone(),
            cache.clone(),
            metrics.clone(),
        );

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
            stats_repo,
            cursor_repo,
            result_repo,
            backlog,
            registry.clone(),
            backpressure.clone(),
        ));
        let reaper = Arc::new(IdleReaper::new(
            registry.clone(),
            metrics,
            coordinator.workers.clone(),
        ));

        let state = AppState {
            registry,
            issuer,
            intake: ResultIntake::new(batch_handle),
            backpressure,
            statistics,
            reaper: reaper.clone() as Arc<dyn IdleReaperService>,
            database: database.clone(),
            admin_keys: Arc::new(config.api.admin_keys.clone()),
            request_timeout: Duration::from_secs(config.api.request_timeout_seconds),
        };

        if config.api.admin_keys.is_empty() {
            warn!("未配置管理端密钥，/actions 与 /stats 将拒绝所有请求");
        }

        Ok(Self {
            config,
            database,
            state,
            batcher,
            cache,
            reaper,
        })
    }

    /// HTTP路由
    pub fn router(&self) -> Router {
        create_app(self.state.clone())
    }

    /// 启动合并写入、结果缓存刷新和空闲清理三个后台任务
    pub fn spawn_background(self, shutdown_rx: &broadcast::Receiver<()>) -> BackgroundTasks {
        let batcher = tokio::spawn(self.batcher.run(shutdown_rx.resubscribe()));
        let ticker = tokio::spawn(self.cache.clone().run_ticker(shutdown_rx.resubscribe()));

        let reaper = self.reaper.clone();
        let reaper_rx = shutdown_rx.resubscribe();
        let reaper = tokio::spawn(async move { reaper.run(reaper_rx).await });

        BackgroundTasks {
            batcher,
            ticker,
            reaper,
            cache: self.cache,
            database: self.database,
        }
    }

    /// 运行协调器直到收到关闭信号
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let bind_address = self.config.api.bind_address.clone();
        let listener = TcpListener::bind(&bind_address)
            .await
            .with_context(|| format!("绑定地址失败: {}", bind_address))?;

        let router = self.router();
        let background = self.spawn_background(&shutdown_rx);

        info!("API服务器启动在 http://{}", bind_address);

        let served = axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("API服务器收到关闭信号");
            })
            .await;
        if let Err(e) = served {
            error!("API服务器运行失败: {}", e);
        }

        background.join().await;
        info!("协调器已停止");
        Ok(())
    }
}

/// 已启动的后台任务
pub struct BackgroundTasks {
    batcher: JoinHandle<()>,
    ticker: JoinHandle<()>,
    reaper: JoinHandle<()>,
    cache: Arc<ResultCache>,
    database: Arc<DatabaseManager>,
}

impl BackgroundTasks {
    /// 等待后台任务退出并落盘剩余数据
    ///
    /// 合并写入任务先退出，其最后一批成功结果才会进入结果缓存，
    /// 之后再刷新缓存、关闭连接池。调用前需已发送关闭信号。
    pub async fn join(self) {
        if let Err(e) = self.batcher.await {
            error!("合并写入任务异常退出: {}", e);
        }

        self.cache.flush().await;

        for (name, handle) in [("结果缓存刷新", self.ticker), ("空闲清理", self.reaper)] {
            if let Err(e) = handle.await {
                error!("{}任务异常退出: {}", name, e);
            }
        }

        self.database.close().await;
        info!("后台任务已全部停止");
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }
}
