pub mod sqlite_backlog_repository;
pub mod sqlite_control_repository;
pub mod sqlite_cursor_repository;
pub mod sqlite_result_repository;
pub mod sqlite_statistics_repository;
pub mod sqlite_worker_repository;

pub use sqlite_backlog_repository::SqliteBacklogRepository;
pub use sqlite_control_repository::SqliteControlRepository;
pub use sqlite_cursor_repository::SqliteCursorRepository;
pub use sqlite_result_repository::SqliteResultRepository;
pub use sqlite_statistics_repository::SqliteStatisticsRepository;
pub use sqlite_worker_repository::SqliteWorkerRepository;

/// 单条批量语句携带的最大行数
pub(crate) const BULK_CHUNK_ROWS: usize = 500;
