use async_trait::async_trait;
use chrono::{DateTime, Utc};
use harvester_core::HarvesterResult;
use harvester_domain::{
    entities::{NoRedirectRecord, ScrapedPage},
    repositories::ResultRepository,
};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::debug;

use super::BULK_CHUNK_ROWS;

pub struct SqliteResultRepository {
    pool: SqlitePool,
}

impl SqliteResultRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResultRepository for SqliteResultRepository {
    async fn insert_scraped_pages(
        &self,
        pages: &[ScrapedPage],
        stored_at: DateTime<Utc>,
    ) -> HarvesterResult<u64> {
        if pages.is_empty() {
            return Ok(0);
        }

        // 所有分块在同一事务中写入，失败时整体回滚
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for chunk in pages.chunks(BULK_CHUNK_ROWS) {
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO scraped_pages (worker_id, unresolved_url, resolved_url, title, \
                 short_description, full_text, scraped_at, stored_at) ",
            );
            builder.push_values(chunk, |mut b, page| {
                b.push_bind(&page.worker_id)
                    .push_bind(&page.unresolved_url)
                    .push_bind(&page.resolved_url)
                    .push_bind(&page.title)
                    .push_bind(&page.short_description)
                    .push_bind(&page.full_text)
                    .push_bind(page.scraped_at)
                    .push_bind(stored_at);
            });
            inserted += builder.build().execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;

        debug!("写入抓取结果 {} 条", inserted);
        Ok(inserted)
    }

    async fn insert_noredirect(&self, records: &[NoRedirectRecord]) -> HarvesterResult<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for chunk in records.chunks(BULK_CHUNK_ROWS) {
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO noredirect (worker_id, unresolved_url, reported_at) ",
            );
            builder.push_values(chunk, |mut b, record| {
                b.push_bind(&record.worker_id)
                    .push_bind(&record.unresolved_url)
                    .push_bind(record.reported_at);
            });
            inserted += builder.build().execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;

        debug!("写入无跳转记录 {} 条", inserted);
        Ok(inserted)
    }

    async fn count_scraped_since(&self, since: DateTime<Utc>) -> HarvesterResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM scraped_pages WHERE stored_at >= ?")
            .bind(since)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("n")?)
    }
}
