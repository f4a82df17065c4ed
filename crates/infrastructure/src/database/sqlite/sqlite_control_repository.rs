use async_trait::async_trait;
use harvester_core::HarvesterResult;
use harvester_domain::{entities::ControlFlags, repositories::ControlRepository};
use sqlx::{Row, SqlitePool};
use tracing::debug;

pub struct SqliteControlRepository {
    pool: SqlitePool,
}

impl SqliteControlRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ControlRepository for SqliteControlRepository {
    async fn load(&self) -> HarvesterResult<ControlFlags> {
        let rows = sqlx::query("SELECT name, value FROM control_flags")
            .fetch_all(&self.pool)
            .await?;

        let mut flags = ControlFlags::default();
        for row in rows {
            let name: String = row.try_get("name")?;
            let value: i64 = row.try_get("value")?;
            match name.as_str() {
                "worker_hold" => flags.worker_hold = value != 0,
                "queue_hold" => flags.queue_hold = value != 0,
                "delay" => flags.delay_seconds = value.max(0) as u64,
                _ => {}
            }
        }
        Ok(flags)
    }

    async fn store(&self, flags: &ControlFlags) -> HarvesterResult<()> {
        let values = [
            ("worker_hold", i64::from(flags.worker_hold)),
            ("queue_hold", i64::from(flags.queue_hold)),
            ("delay", flags.delay_seconds as i64),
        ];

        let mut tx = self.pool.begin().await?;
        for (name, value) in values {
            sqlx::query(
                "INSERT INTO control_flags (name, value) VALUES (?, ?) \
                 ON CONFLICT(name) DO UPDATE SET value = excluded.value",
            )
            .bind(name)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        debug!("保存全局开关: {:?}", flags);
        Ok(())
    }
}
