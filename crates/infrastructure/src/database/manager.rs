use anyhow::{Context, Result};
use harvester_core::config::DatabaseConfig;
use harvester_domain::entities::StatType;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// SQLite连接池管理
///
/// 连接池有固定上限，超出时调用方排队等待，等待超过
/// `connection_timeout_seconds` 后立即失败。
pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    /// 创建数据库连接池并运行迁移
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!("创建SQLite数据库连接池: {}", config.url);

        let connect_options = SqliteConnectOptions::from_str(&config.url)
            .context("解析数据库URL失败")?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(config.connection_timeout_seconds));

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .max_lifetime(Duration::from_secs(1800)) // 30分钟默认生命周期
            .connect_with(connect_options)
            .await
            .context("创建数据库连接池失败")?;

        let manager = Self { pool };
        manager.migrate().await.context("运行数据库迁移失败")?;

        info!("数据库连接池创建完成");
        Ok(manager)
    }

    /// 单连接的内存数据库，连接不会被回收
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .context("创建内存数据库失败")?;

        let manager = Self { pool };
        manager.migrate().await?;
        Ok(manager)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// 运行数据库迁移
    pub async fn migrate(&self) -> Result<()> {
        let pool = &self.pool;

        // 服务游标表
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS service_cursors (
                service_name TEXT PRIMARY KEY,
                last_index INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(pool)
        .await
        .context("创建服务游标表失败")?;

        // 待确认任务表
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS backlog (
                identifier TEXT PRIMARY KEY,
                owner_worker_id TEXT,
                issued_at DATETIME
            )
            "#,
        )
        .execute(pool)
        .await
        .context("创建待确认任务表失败")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_backlog_issued_at ON backlog(issued_at)")
            .execute(pool)
            .await
            .context("创建待确认任务索引失败")?;

        // Worker表
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS workers (
                worker_id TEXT PRIMARY KEY,
                api_key TEXT NOT NULL,
                cpu_usage REAL,
                ram_usage REAL,
                disk_name TEXT,
                disk_usage_percent REAL,
                net_in REAL,
                net_out REAL,
                public_ip TEXT,
                last_updated DATETIME NOT NULL,
                queue INTEGER NOT NULL DEFAULT 0,
                restart_pending INTEGER NOT NULL DEFAULT 0,
                created_at DATETIME NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await
        .context("创建Worker表失败")?;

        // 统计计数器表
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS statistics (
                stat_type TEXT PRIMARY KEY,
                count INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(pool)
        .await
        .context("创建统计表失败")?;

        // 全局开关表
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS control_flags (
                name TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await
        .context("创建全局开关表失败")?;

        // 抓取结果表
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS scraped_pages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                worker_id TEXT NOT NULL,
                unresolved_url TEXT NOT NULL,
                resolved_url TEXT NOT NULL,
                title TEXT NOT NULL,
                short_description TEXT NOT NULL,
                full_text TEXT NOT NULL,
                scraped_at DATETIME NOT NULL,
                stored_at DATETIME NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await
        .context("创建抓取结果表失败")?;

        // 无跳转记录表
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS noredirect (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                worker_id TEXT NOT NULL,
                unresolved_url TEXT NOT NULL,
                reported_at DATETIME NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await
        .context("创建无跳转记录表失败")?;

        // 创建索引
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_workers_last_updated ON workers(last_updated)")
            .execute(pool)
            .await
            .context("创建Worker更新时间索引失败")?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_scraped_pages_stored_at ON scraped_pages(stored_at)",
        )
        .execute(pool)
        .await
        .context("创建抓取结果时间索引失败")?;

        // 初始化计数器和开关
        for stat in StatType::ALL {
            sqlx::query("INSERT OR IGNORE INTO statistics (stat_type, count) VALUES (?, 0)")
                .bind(stat.as_str())
                .execute(pool)
                .await
                .context("初始化统计计数器失败")?;
        }

        for name in ["worker_hold", "queue_hold", "delay"] {
            sqlx::query("INSERT OR IGNORE INTO control_flags (name, value) VALUES (?, 0)")
                .bind(name)
                .execute(pool)
                .await
                .context("初始化全局开关失败")?;
        }

        info!("数据库迁移完成");
        Ok(())
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Row;

    #[tokio::test]
    async fn test_in_memory_manager_seeds_tables() {
        let manager = DatabaseManager::in_memory().await.unwrap();
        assert!(manager.health_check().await.is_ok());

        let stats: i64 = sqlx::query("SELECT COUNT(*) AS n FROM statistics")
            .fetch_one(manager.pool())
            .await
            .unwrap()
            .get("n");
        assert_eq!(stats, StatType::ALL.len() as i64);

        let flags: i64 = sqlx::query("SELECT COUNT(*) AS n FROM control_flags")
            .fetch_one(manager.pool())
            .await
            .unwrap()
            .get("n");
        assert_eq!(flags, 3);

        // 重复迁移不会报错
        assert!(manager.migrate().await.is_ok());
        manager.close().await;
    }

    #[tokio::test]
    async fn test_file_database_created_on_demand() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harvester.db");
        let config = DatabaseConfig {
            url: format!("sqlite:{}", path.display()),
            max_connections: 2,
            min_connections: 1,
            connection_timeout_seconds: 5,
            idle_timeout_seconds: 60,
        };

        let manager = DatabaseManager::new(&config).await.unwrap();
        assert!(path.exists());
        manager.close().await;
    }
}
