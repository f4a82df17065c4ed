use std::sync::Arc;

use chrono::{Duration, Utc};

use harvester_core::config::BacklogConfig;
use harvester_core::HarvesterResult;
use harvester_domain::repositories::BacklogRepository;

/// 待确认任务积压
///
/// Worker可能中途崩溃，超过重试时长仍未确认的任务会在生成新标识符之前重新下发。
pub struct BacklogStore {
    repo: Arc<dyn BacklogRepository>,
    config: BacklogConfig,
}

impl BacklogStore {
    pub fn new(repo: Arc<dyn BacklogRepository>, config: BacklogConfig) -> Self {
        Self { repo, config }
    }

    /// 指定归属时记录下发时间，否则作为冷任务写入
    pub async fn enqueue(&self, identifiers: &[String], owner: Option<&str>) -> HarvesterResult<u64> {
        let issued_at = owner.map(|_| Utc::now());
        self.repo.enqueue(identifiers, owner, issued_at).await
    }

    /// 没有可重发的任务时返回 None，调用方据此转为生成新标识符
    pub async fn sample_pending(&self) -> HarvesterResult<Option<Vec<String>>> {
        let cutoff = Utc::now() - Duration::seconds(self.config.retry_after_seconds as i64);
        self.repo.sample_pending(cutoff, self.config.sample_size).await
    }

    pub async fn delete(&self, identifiers: &[String]) -> HarvesterResult<u64> {
        if identifiers.is_empty() {
            return Ok(0);
        }
        self.repo.delete(identifiers).await
    }

    pub async fn count(&self) -> HarvesterResult<i64> {
        self.repo.count().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::Harness;

    #[tokio::test]
    async fn test_issued_entries_wait_for_retry_window() {
        let harness = Harness::new().await;
        let store = BacklogStore::new(harness.backlog_repo.clone(), BacklogConfig::default());

        let issued = vec!["https://bit.ly/a".to_string()];
        store.enqueue(&issued, Some("w1")).await.unwrap();
        assert_eq!(store.sample_pending().await.unwrap(), None);

        let cold = vec!["https://s.id/b".to_string()];
        store.enqueue(&cold, None).await.unwrap();
        assert_eq!(store.sample_pending().await.unwrap(), Some(cold));
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_zero_retry_window_resurfaces_immediately() {
        let harness = Harness::new().await;
        let config = BacklogConfig {
            retry_after_seconds: 0,
            sample_size: 5,
        };
        let store = BacklogStore::new(harness.backlog_repo.clone(), config);

        let issued: Vec<String> = (0..8).map(|i| format!("https://bit.ly/{i}")).collect();
        store.enqueue(&issued, Some("w1")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let sampled = store.sample_pending().await.unwrap().unwrap();
        assert_eq!(sampled.len(), 5);

        assert_eq!(store.delete(&issued).await.unwrap(), 8);
        assert_eq!(store.delete(&issued).await.unwrap(), 0);
        assert_eq!(store.sample_pending().await.unwrap(), None);
    }
}
