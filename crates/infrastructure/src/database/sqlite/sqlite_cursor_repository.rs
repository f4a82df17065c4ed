use async_trait::async_trait;
use harvester_core::HarvesterResult;
use harvester_domain::{entities::ServiceCursor, repositories::CursorRepository};
use sqlx::{Row, SqlitePool};
use tracing::debug;

pub struct SqliteCursorRepository {
    pool: SqlitePool,
}

impl SqliteCursorRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CursorRepository for SqliteCursorRepository {
    async fn seed(&self, services: &[String]) -> HarvesterResult<()> {
        for service in services {
            sqlx::query(
                "INSERT OR IGNORE INTO service_cursors (service_name, last_index) VALUES (?, 0)",
            )
            .bind(service)
            .execute(&self.pool)
            .await?;
        }

        debug!("初始化服务游标: {:?}", services);
        Ok(())
    }

    async fn get(&self, service: &str) -> HarvesterResult<Option<i64>> {
        let row = sqlx::query("SELECT last_index FROM service_cursors WHERE service_name = ?")
            .bind(service)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.get::<i64, _>("last_index")))
    }

    async fn advance(&self, service: &str, last_index: i64) -> HarvesterResult<bool> {
        let result = sqlx::query(
            "UPDATE service_cursors SET last_index = ? WHERE service_name = ? AND last_index < ?",
        )
        .bind(last_index)
        .bind(service)
        .bind(last_index)
        .execute(&self.pool)
        .await?;

        let advanced = result.rows_affected() == 1;
        debug!("推进服务游标: {} -> {} ({})", service, last_index, advanced);
        Ok(advanced)
    }

    async fn list(&self) -> HarvesterResult<Vec<ServiceCursor>> {
        let rows = sqlx::query(
            "SELECT service_name, last_index FROM service_cursors ORDER BY service_name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| ServiceCursor {
                service_name: row.get("service_name"),
                last_index: row.get("last_index"),
            })
            .collect())
    }
}
