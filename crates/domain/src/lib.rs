//! 领域层
//!
//! 实体、合并写入事件、仓储抽象以及标识符空间的纯计算逻辑

pub mod entities;
pub mod events;
pub mod id_space;
pub mod repositories;

pub use entities::*;
pub use events::*;
pub use id_space::IdSpace;
pub use repositories::*;
