//! 配置管理模块
//!
//! 配置按以下顺序分层加载，后者覆盖前者：
//!
//! 1. 内置默认值
//! 2. TOML配置文件（`--config` 指定，或 `config/harvester.toml`、`harvester.toml`）
//! 3. 环境变量（前缀 `HARVESTER`，层级分隔符 `__`，如 `HARVESTER__DATABASE__URL`）
//!
//! 每个配置段都提供 `validate()`，加载完成后整体校验一次。

pub mod models;

pub use models::*;
