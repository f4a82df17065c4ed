use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use harvester_core::config::ServiceConfig;
use harvester_core::{HarvesterError, HarvesterResult};
use harvester_domain::{id_space::IdSpace, repositories::CursorRepository};

/// 一次生成的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedChunk {
    pub service: String,
    pub urls: Vec<String>,
    /// 剩余空间不足一整块，本次返回的数量少于请求数量
    pub exhausted: bool,
}

struct ServiceSpace {
    name: String,
    url_prefix: String,
    space: IdSpace,
    /// 串行化同一服务的 读游标-生成-写游标
    lock: Mutex<()>,
}

/// 标识符生成器
///
/// 游标是某服务已生成标识符的唯一依据，只会前进。生成后先持久化游标再返回，
/// 持久化之前崩溃会导致这一段在重启后再次下发。
pub struct IdSpaceGenerator {
    cursor_repo: Arc<dyn CursorRepository>,
    services: Vec<ServiceSpace>,
}

impl IdSpaceGenerator {
    pub fn new(
        cursor_repo: Arc<dyn CursorRepository>,
        services: &[ServiceConfig],
    ) -> HarvesterResult<Self> {
        let services = services
            .iter()
            .map(|service| {
                Ok(ServiceSpace {
                    name: service.name.clone(),
                    url_prefix: service.url_prefix.clone(),
                    space: IdSpace::from_service(service)?,
                    lock: Mutex::new(()),
                })
            })
            .collect::<HarvesterResult<Vec<_>>>()?;

        Ok(Self {
            cursor_repo,
            services,
        })
    }

    /// 为配置中的服务初始化游标
    pub async fn seed_cursors(&self) -> HarvesterResult<()> {
        let names: Vec<String> = self.services.iter().map(|s| s.name.clone()).collect();
        self.cursor_repo.seed(&names).await
    }

    /// 按配置顺序返回服务名
    pub fn service_names(&self) -> impl Iterator<Item = &str> {
        self.services.iter().map(|s| s.name.as_str())
    }

    pub async fn next_chunk(
        &self,
        service: &str,
        chunk_size: usize,
    ) -> HarvesterResult<GeneratedChunk> {
        let entry = self
            .services
            .iter()
            .find(|s| s.name == service)
            .ok_or_else(|| HarvesterError::UnknownService(service.to_string()))?;

        let _guard = entry.lock.lock().await;

        let cursor = match self.cursor_repo.get(service).await? {
            Some(cursor) => cursor,
            None => {
                self.cursor_repo.seed(&[service.to_string()]).await?;
                0
            }
        };

        let identifiers = entry.space.slice(cursor.max(0) as u128, chunk_size);
        let next_cursor = i64::try_from(identifiers.len())
            .ok()
            .and_then(|n| cursor.checked_add(n));

        let next_cursor = match next_cursor {
            Some(next) if !identifiers.is_empty() => next,
            _ => {
                return Err(HarvesterError::IdSpaceExhausted {
                    service: service.to_string(),
                })
            }
        };

        self.cursor_repo.advance(service, next_cursor).await?;

        let exhausted = identifiers.len() < chunk_size;
        if exhausted {
            warn!(
                "服务 {} 的标识符空间即将耗尽: 请求 {} 个, 仅剩 {} 个",
                service,
                chunk_size,
                identifiers.len()
            );
        }

        debug!("服务 {} 生成 {} 个标识符, 游标 {} -> {}", service, identifiers.len(), cursor, next_cursor);

        Ok(GeneratedChunk {
            service: service.to_string(),
            urls: identifiers
                .into_iter()
                .map(|id| format!("{}{}", entry.url_prefix, id))
                .collect(),
            exhausted,
        })
    }
}
