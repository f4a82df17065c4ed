//! 调度核心
//!
//! 标识符生成、积压任务管理、合并写入、结果缓存、Worker生命周期以及全局限流，
//! 由根crate负责组装和启动后台任务。

pub mod backlog;
pub mod backpressure;
pub mod batcher;
pub mod generator;
pub mod idle_reaper;
pub mod issuer;
pub mod registry;
pub mod result_cache;
pub mod results;
pub mod statistics;

#[cfg(test)]
pub mod test_utils;

pub use backlog::BacklogStore;
pub use backpressure::BackpressureController;
pub use batcher::{BatchHandle, CoalescingBatcher, PendingBatch};
pub use generator::{GeneratedChunk, IdSpaceGenerator};
pub use idle_reaper::{IdleReaper, IdleReaperService};
pub use issuer::TaskIssuer;
pub use registry::{WorkerCredentials, WorkerRegistry, WorkerView};
pub use result_cache::ResultCache;
pub use results::{ResultIntake, ResultReport};
pub use statistics::{CounterView, DashboardSnapshot, StatisticsService};
