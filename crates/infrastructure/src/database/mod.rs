pub mod manager;
pub mod sqlite;

pub use manager::DatabaseManager;
pub use sqlite::{
    SqliteBacklogRepository, SqliteControlRepository, SqliteCursorRepository,
    SqliteResultRepository, SqliteStatisticsRepository, SqliteWorkerRepository,
};
