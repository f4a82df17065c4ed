use async_trait::async_trait;
use harvester_core::HarvesterResult;
use harvester_domain::{entities::StatType, repositories::StatisticsRepository};
use sqlx::{Row, SqlitePool};
use tracing::{debug, warn};

pub struct SqliteStatisticsRepository {
    pool: SqlitePool,
}

impl SqliteStatisticsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StatisticsRepository for SqliteStatisticsRepository {
    async fn apply_deltas(&self, deltas: &[(StatType, i64)]) -> HarvesterResult<()> {
        if deltas.iter().all(|(_, delta)| *delta == 0) {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for (stat, delta) in deltas.iter().filter(|(_, delta)| *delta != 0) {
            sqlx::query("UPDATE statistics SET count = count + ? WHERE stat_type = ?")
                .bind(delta)
                .bind(stat.as_str())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        debug!("累加统计计数: {:?}", deltas);
        Ok(())
    }

    async fn get_counts(&self) -> HarvesterResult<Vec<(StatType, i64)>> {
        let rows = sqlx::query("SELECT stat_type, count FROM statistics")
            .fetch_all(&self.pool)
            .await?;

        let mut counts = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get("stat_type")?;
            match StatType::parse(&name) {
                Some(stat) => counts.push((stat, row.try_get("count")?)),
                None => warn!("忽略未知的统计项: {}", name),
            }
        }
        Ok(counts)
    }
}
