use async_trait::async_trait;
use chrono::{DateTime, Utc};
use harvester_core::HarvesterResult;
use harvester_domain::{
    entities::{EvictionSummary, WorkerInfo, WorkerMetrics},
    repositories::WorkerRepository,
};
use sqlx::{Row, SqlitePool};
use tracing::debug;

const WORKER_COLUMNS: &str = "worker_id, api_key, cpu_usage, ram_usage, disk_name, \
    disk_usage_percent, net_in, net_out, public_ip, last_updated, queue, restart_pending, created_at";

pub struct SqliteWorkerRepository {
    pool: SqlitePool,
}

impl SqliteWorkerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_worker_info(row: &sqlx::sqlite::SqliteRow) -> HarvesterResult<WorkerInfo> {
        // 注册后尚未心跳的Worker没有资源数据
        let metrics = match row.try_get::<Option<f64>, _>("cpu_usage")? {
            Some(cpu_usage) => Some(WorkerMetrics {
                cpu_usage,
                ram_usage: row.try_get::<Option<f64>, _>("ram_usage")?.unwrap_or_default(),
                disk_name: row.try_get::<Option<String>, _>("disk_name")?.unwrap_or_default(),
                disk_usage_percent: row
                    .try_get::<Option<f64>, _>("disk_usage_percent")?
                    .unwrap_or_default(),
                net_in: row.try_get::<Option<f64>, _>("net_in")?.unwrap_or_default(),
                net_out: row.try_get::<Option<f64>, _>("net_out")?.unwrap_or_default(),
                public_ip: row.try_get::<Option<String>, _>("public_ip")?.unwrap_or_default(),
            }),
            None => None,
        };

        Ok(WorkerInfo {
            worker_id: row.try_get("worker_id")?,
            api_key: row.try_get("api_key")?,
            metrics,
            last_updated: row.try_get("last_updated")?,
            queue: row.try_get("queue")?,
            restart_pending: row.try_get("restart_pending")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn summarize(rows: &[sqlx::sqlite::SqliteRow]) -> HarvesterResult<EvictionSummary> {
        let mut summary = EvictionSummary::default();
        for row in rows {
            summary.workers += 1;
            summary.outstanding_queue += row.try_get::<i64, _>("queue")?;
        }
        Ok(summary)
    }
}

#[async_trait]
impl WorkerRepository for SqliteWorkerRepository {
    async fn create(&self, worker: &WorkerInfo) -> HarvesterResult<()> {
        sqlx::query(
            r#"
            INSERT INTO workers (worker_id, api_key, last_updated, queue, restart_pending, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&worker.worker_id)
        .bind(&worker.api_key)
        .bind(worker.last_updated)
        .bind(worker.queue)
        .bind(worker.restart_pending)
        .bind(worker.created_at)
        .execute(&self.pool)
        .await?;

        debug!("注册Worker成功: {}", worker.worker_id);
        Ok(())
    }

    async fn get_by_id(&self, worker_id: &str) -> HarvesterResult<Option<WorkerInfo>> {
        let sql = format!("SELECT {WORKER_COLUMNS} FROM workers WHERE worker_id = ?");
        let row = sqlx::query(&sql)
            .bind(worker_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_worker_info).transpose()
    }

    async fn authenticate(&self, worker_id: &str, api_key: &str) -> HarvesterResult<bool> {
        let row = sqlx::query("SELECT 1 FROM workers WHERE worker_id = ? AND api_key = ?")
            .bind(worker_id)
            .bind(api_key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.is_some())
    }

    async fn list(&self) -> HarvesterResult<Vec<WorkerInfo>> {
        let sql = format!("SELECT {WORKER_COLUMNS} FROM workers ORDER BY created_at");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        rows.iter().map(Self::row_to_worker_info).collect()
    }

    async fn record_heartbeat(
        &self,
        worker_id: &str,
        metrics: &WorkerMetrics,
        at: DateTime<Utc>,
    ) -> HarvesterResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE workers
            SET cpu_usage = ?, ram_usage = ?, disk_name = ?, disk_usage_percent = ?,
                net_in = ?, net_out = ?, public_ip = ?, last_updated = ?
            WHERE worker_id = ?
            "#,
        )
        .bind(metrics.cpu_usage)
        .bind(metrics.ram_usage)
        .bind(&metrics.disk_name)
        .bind(metrics.disk_usage_percent)
        .bind(metrics.net_in)
        .bind(metrics.net_out)
        .bind(&metrics.public_ip)
        .bind(at)
        .bind(worker_id)
        .execute(&self.pool)
        .await?;

        debug!("更新Worker心跳: {}", worker_id);
        Ok(result.rows_affected() == 1)
    }

    async fn take_restart_flag(&self, worker_id: &str) -> HarvesterResult<bool> {
        let result = sqlx::query(
            "UPDATE workers SET restart_pending = 0 WHERE worker_id = ? AND restart_pending = 1",
        )
        .bind(worker_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn request_restart(&self, worker_id: &str) -> HarvesterResult<bool> {
        let result = sqlx::query("UPDATE workers SET restart_pending = 1 WHERE worker_id = ?")
            .bind(worker_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn request_restart_all(&self) -> HarvesterResult<u64> {
        let result = sqlx::query("UPDATE workers SET restart_pending = 1")
            .execute(&self.pool)
            .await?;

        debug!("标记全部Worker重启: {}", result.rows_affected());
        Ok(result.rows_affected())
    }

    async fn add_to_queue(&self, worker_id: &str, amount: i64) -> HarvesterResult<bool> {
        let result = sqlx::query("UPDATE workers SET queue = queue + ? WHERE worker_id = ?")
            .bind(amount)
            .bind(worker_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn subtract_from_queue(&self, worker_id: &str, amount: i64) -> HarvesterResult<bool> {
        let result = sqlx::query(
            "UPDATE workers SET queue = queue - ? WHERE worker_id = ? AND queue >= ?",
        )
        .bind(amount)
        .bind(worker_id)
        .bind(amount)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn evict_idle(&self, cutoff: DateTime<Utc>) -> HarvesterResult<EvictionSummary> {
        let rows = sqlx::query("DELETE FROM workers WHERE last_updated < ? RETURNING queue")
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await?;

        Self::summarize(&rows)
    }

    async fn delete_all(&self) -> HarvesterResult<EvictionSummary> {
        let rows = sqlx::query("DELETE FROM workers RETURNING queue")
            .fetch_all(&self.pool)
            .await?;

        Self::summarize(&rows)
    }
}
