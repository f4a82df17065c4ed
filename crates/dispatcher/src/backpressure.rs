use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use harvester_core::{HarvesterError, HarvesterResult};
use harvester_domain::{entities::ControlFlags, repositories::ControlRepository};

/// 全局限流开关
///
/// 启动时从数据库加载，修改时先落库再更新内存副本。只由管理操作修改，没有自动调节。
pub struct BackpressureController {
    repo: Arc<dyn ControlRepository>,
    flags: RwLock<ControlFlags>,
    max_delay_seconds: u64,
}

impl BackpressureController {
    pub async fn load(
        repo: Arc<dyn ControlRepository>,
        max_delay_seconds: u64,
    ) -> HarvesterResult<Self> {
        let flags = repo.load().await?;
        info!("加载全局开关: {:?}", flags);

        Ok(Self {
            repo,
            flags: RwLock::new(flags),
            max_delay_seconds,
        })
    }

    pub async fn flags(&self) -> ControlFlags {
        *self.flags.read().await
    }

    pub async fn set_worker_hold(&self, hold: bool) -> HarvesterResult<ControlFlags> {
        self.update(|flags| flags.worker_hold = hold).await
    }

    pub async fn set_queue_hold(&self, hold: bool) -> HarvesterResult<ControlFlags> {
        self.update(|flags| flags.queue_hold = hold).await
    }

    pub async fn set_delay(&self, seconds: u64) -> HarvesterResult<ControlFlags> {
        if seconds > self.max_delay_seconds {
            return Err(HarvesterError::validation(format!(
                "延迟不能超过 {} 秒",
                self.max_delay_seconds
            )));
        }
        self.update(|flags| flags.delay_seconds = seconds).await
    }

    async fn update(&self, apply: impl FnOnce(&mut ControlFlags)) -> HarvesterResult<ControlFlags> {
        let mut guard = self.flags.write().await;
        let mut next = *guard;
        apply(&mut next);

        self.repo.store(&next).await?;
        *guard = next;

        info!("更新全局开关: {:?}", next);
        Ok(next)
    }
}
