use async_trait::async_trait;
use chrono::{DateTime, Utc};
use harvester_core::HarvesterResult;
use harvester_domain::repositories::BacklogRepository;
use rand::seq::SliceRandom;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::debug;

use super::BULK_CHUNK_ROWS;

/// 每次抽样最多读取的候选倍数
const SAMPLE_WINDOW_FACTOR: usize = 4;

const COLD_CANDIDATES_SQL: &str =
    "SELECT identifier FROM backlog WHERE issued_at IS NULL LIMIT ?";
const STALE_CANDIDATES_SQL: &str =
    "SELECT identifier FROM backlog WHERE issued_at < ? ORDER BY issued_at LIMIT ?";

pub struct SqliteBacklogRepository {
    pool: SqlitePool,
}

impl SqliteBacklogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BacklogRepository for SqliteBacklogRepository {
    async fn enqueue(
        &self,
        identifiers: &[String],
        owner: Option<&str>,
        issued_at: Option<DateTime<Utc>>,
    ) -> HarvesterResult<u64> {
        let mut written = 0;
        for chunk in identifiers.chunks(BULK_CHUNK_ROWS) {
            let mut builder: QueryBuilder<Sqlite> =
                QueryBuilder::new("INSERT INTO backlog (identifier, owner_worker_id, issued_at) ");
            builder.push_values(chunk, |mut b, identifier| {
                b.push_bind(identifier).push_bind(owner).push_bind(issued_at);
            });
            builder.push(
                " ON CONFLICT(identifier) DO UPDATE SET \
                 owner_worker_id = excluded.owner_worker_id, issued_at = excluded.issued_at",
            );

            written += builder.build().execute(&self.pool).await?.rows_affected();
        }

        debug!("写入待确认任务 {} 条, 归属: {:?}", written, owner);
        Ok(written)
    }

    async fn sample_pending(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> HarvesterResult<Option<Vec<String>>> {
        // 两条查询都走 issued_at 索引，读取量受窗口限制而与表大小无关
        let window = (limit * SAMPLE_WINDOW_FACTOR) as i64;

        let cold = sqlx::query(COLD_CANDIDATES_SQL)
            .bind(window)
            .fetch_all(&self.pool)
            .await?;
        let stale = sqlx::query(STALE_CANDIDATES_SQL)
            .bind(cutoff)
            .bind(window)
            .fetch_all(&self.pool)
            .await?;

        let mut picked: Vec<String> = cold
            .iter()
            .chain(stale.iter())
            .map(|r| r.get("identifier"))
            .collect();
        picked.shuffle(&mut rand::rng());
        picked.truncate(limit);

        if picked.is_empty() {
            return Ok(None);
        }

        debug!("抽取待重发任务 {} 条", picked.len());
        Ok(Some(picked))
    }

    async fn delete(&self, identifiers: &[String]) -> HarvesterResult<u64> {
        let mut removed = 0;
        for chunk in identifiers.chunks(BULK_CHUNK_ROWS) {
            let mut builder: QueryBuilder<Sqlite> =
                QueryBuilder::new("DELETE FROM backlog WHERE identifier IN (");
            let mut separated = builder.separated(", ");
            for identifier in chunk {
                separated.push_bind(identifier);
            }
            separated.push_unseparated(")");

            removed += builder.build().execute(&self.pool).await?.rows_affected();
        }

        debug!("删除待确认任务 {} 条", removed);
        Ok(removed)
    }

    async fn count(&self) -> HarvesterResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM backlog")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }
}
