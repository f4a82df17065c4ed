//! 短链接爬取集群协调器
//!
//! 二进制入口见 `main.rs`，这里导出组装逻辑供集成测试使用。

pub mod app;
pub mod shutdown;
