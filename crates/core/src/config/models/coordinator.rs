use serde::{Deserialize, Serialize};
use std::collections::HashSet;

const BASE62: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// 协调器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// 每个服务单次生成的标识符数量
    pub chunk_size: usize,
    /// `delay_per_batch` 允许设置的最大值（秒）
    pub max_delay_seconds: u64,
    #[serde(default)]
    pub batcher: BatcherConfig,
    #[serde(default)]
    pub result_cache: ResultCacheConfig,
    #[serde(default)]
    pub backlog: BacklogConfig,
    #[serde(default)]
    pub workers: WorkerHealthConfig,
    #[serde(default = "default_services")]
    pub services: Vec<ServiceConfig>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            chunk_size: 15,
            max_delay_seconds: 300,
            batcher: BatcherConfig::default(),
            result_cache: ResultCacheConfig::default(),
            backlog: BacklogConfig::default(),
            workers: WorkerHealthConfig::default(),
            services: default_services(),
        }
    }
}

impl CoordinatorConfig {
    /// Validate coordinator configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.chunk_size == 0 {
            return Err(anyhow::anyhow!("单次生成数量必须大于0"));
        }

        self.batcher.validate()?;
        self.result_cache.validate()?;
        self.backlog.validate()?;
        self.workers.validate()?;

        if self.services.is_empty() {
            return Err(anyhow::anyhow!("至少需要配置一个短链接服务"));
        }

        let mut names = HashSet::new();
        for service in &self.services {
            service.validate()?;
            if !names.insert(service.name.as_str()) {
                return Err(anyhow::anyhow!("服务名称重复: {}", service.name));
            }
        }

        Ok(())
    }

    /// 按名称查找服务
    pub fn service(&self, name: &str) -> Option<&ServiceConfig> {
        self.services.iter().find(|s| s.name == name)
    }
}

/// 合并写入器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatcherConfig {
    /// 排空事件后等待多久再落库，用于扩大合并窗口
    pub throttle_millis: u64,
    pub channel_capacity: usize,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            throttle_millis: 2000,
            channel_capacity: 10_000,
        }
    }
}

impl BatcherConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.channel_capacity == 0 {
            return Err(anyhow::anyhow!("事件通道容量必须大于0"));
        }
        Ok(())
    }
}

/// 抓取结果缓存配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultCacheConfig {
    pub capacity: usize,
    pub flush_interval_seconds: u64,
    /// 写入失败后最多保留的行数，超出部分丢弃最旧的
    pub max_retained_rows: usize,
}

impl Default for ResultCacheConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            flush_interval_seconds: 5,
            max_retained_rows: 1000,
        }
    }
}

impl ResultCacheConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.capacity == 0 {
            return Err(anyhow::anyhow!("结果缓存容量必须大于0"));
        }
        if self.flush_interval_seconds == 0 {
            return Err(anyhow::anyhow!("结果缓存刷新间隔必须大于0"));
        }
        if self.max_retained_rows < self.capacity {
            return Err(anyhow::anyhow!("失败保留行数不能小于缓存容量"));
        }
        Ok(())
    }
}

/// 待确认任务积压配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacklogConfig {
    /// 已下发任务超过该时长未确认则重新下发
    pub retry_after_seconds: u64,
    pub sample_size: usize,
}

impl Default for BacklogConfig {
    fn default() -> Self {
        Self {
            retry_after_seconds: 3600,
            sample_size: 33,
        }
    }
}

impl BacklogConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.sample_size == 0 {
            return Err(anyhow::anyhow!("积压抽样数量必须大于0"));
        }
        Ok(())
    }
}

/// Worker健康检查配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerHealthConfig {
    /// 最近一次心跳在该窗口内视为活跃
    pub active_window_seconds: u64,
    /// 超过该时长无心跳的Worker会被清除
    pub idle_timeout_seconds: u64,
    pub reap_interval_seconds: u64,
}

impl Default for WorkerHealthConfig {
    fn default() -> Self {
        Self {
            active_window_seconds: 60,
            idle_timeout_seconds: 180,
            reap_interval_seconds: 30,
        }
    }
}

impl WorkerHealthConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.active_window_seconds == 0 {
            return Err(anyhow::anyhow!("活跃窗口必须大于0"));
        }
        if self.idle_timeout_seconds < self.active_window_seconds {
            return Err(anyhow::anyhow!("空闲超时不能小于活跃窗口"));
        }
        if self.reap_interval_seconds == 0 {
            return Err(anyhow::anyhow!("清理间隔必须大于0"));
        }
        Ok(())
    }
}

/// 短链接服务定义
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceConfig {
    pub name: String,
    pub url_prefix: String,
    /// 字符表顺序即枚举顺序
    pub alphabet: String,
    pub min_length: u32,
    pub max_length: u32,
}

impl ServiceConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.name.is_empty() {
            return Err(anyhow::anyhow!("服务名称不能为空"));
        }

        if self.url_prefix.is_empty() {
            return Err(anyhow::anyhow!("服务 {} 的URL前缀不能为空", self.name));
        }

        if self.alphabet.is_empty() {
            return Err(anyhow::anyhow!("服务 {} 的字符表不能为空", self.name));
        }

        let mut seen = HashSet::new();
        if !self.alphabet.chars().all(|c| seen.insert(c)) {
            return Err(anyhow::anyhow!("服务 {} 的字符表包含重复字符", self.name));
        }

        if self.min_length == 0 || self.min_length > self.max_length {
            return Err(anyhow::anyhow!(
                "服务 {} 的长度范围无效: {}..={}",
                self.name,
                self.min_length,
                self.max_length
            ));
        }

        Ok(())
    }
}

fn default_services() -> Vec<ServiceConfig> {
    let url_safe = format!("{BASE62}-_");
    vec![
        ServiceConfig {
            name: "bitly".to_string(),
            url_prefix: "https://bit.ly/".to_string(),
            alphabet: url_safe.clone(),
            min_length: 1,
            max_length: 24,
        },
        ServiceConfig {
            name: "sid".to_string(),
            url_prefix: "https://s.id/".to_string(),
            alphabet: url_safe,
            min_length: 1,
            max_length: 47,
        },
        ServiceConfig {
            name: "shorturl".to_string(),
            url_prefix: "https://shorturl.at/".to_string(),
            alphabet: BASE62.to_string(),
            min_length: 5,
            max_length: 21,
        },
    ]
}
