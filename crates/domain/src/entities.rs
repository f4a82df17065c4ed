use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Worker上报的资源使用情况
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerMetrics {
    pub cpu_usage: f64,
    pub ram_usage: f64,
    pub disk_name: String,
    pub disk_usage_percent: f64,
    pub net_in: f64,
    pub net_out: f64,
    pub public_ip: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerInfo {
    pub worker_id: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    /// 注册后尚未心跳时为空
    pub metrics: Option<WorkerMetrics>,
    pub last_updated: DateTime<Utc>,
    /// 已下发但尚未回报结果的任务数
    pub queue: i64,
    pub restart_pending: bool,
    pub created_at: DateTime<Utc>,
}

impl WorkerInfo {
    pub fn new(worker_id: String, api_key: String, now: DateTime<Utc>) -> Self {
        Self {
            worker_id,
            api_key,
            metrics: None,
            last_updated: now,
            queue: 0,
            restart_pending: false,
            created_at: now,
        }
    }

    /// 根据最近一次更新时间推导状态，状态本身不落库
    pub fn status_at(&self, now: DateTime<Utc>, active_window: Duration) -> WorkerStatus {
        if now - self.last_updated <= active_window {
            WorkerStatus::Active
        } else {
            WorkerStatus::Idle
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Active,
    Idle,
}

/// 心跳响应中给Worker的指令
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HeartbeatStatus {
    Continue,
    Hold,
    Restart,
}

impl HeartbeatStatus {
    /// restart 优先于 hold，hold 优先于 continue
    pub fn resolve(restart_pending: bool, worker_hold: bool) -> Self {
        if restart_pending {
            HeartbeatStatus::Restart
        } else if worker_hold {
            HeartbeatStatus::Hold
        } else {
            HeartbeatStatus::Continue
        }
    }
}

/// 已生成但尚未确认的任务
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BacklogTask {
    pub identifier: String,
    pub owner_worker_id: Option<String>,
    pub issued_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceCursor {
    pub service_name: String,
    pub last_index: i64,
}

/// 成功抓取的页面
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedPage {
    pub worker_id: String,
    pub unresolved_url: String,
    pub resolved_url: String,
    pub title: String,
    pub short_description: String,
    pub full_text: String,
    pub scraped_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoRedirectRecord {
    pub worker_id: String,
    pub unresolved_url: String,
    pub reported_at: DateTime<Utc>,
}

/// 统计计数器名称
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatType {
    TotalUrl,
    QueueSize,
    ScrapedPages,
    UrlNotFound,
    RedirectFailed,
}

impl StatType {
    pub const ALL: [StatType; 5] = [
        StatType::TotalUrl,
        StatType::QueueSize,
        StatType::ScrapedPages,
        StatType::UrlNotFound,
        StatType::RedirectFailed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StatType::TotalUrl => "total_url",
            StatType::QueueSize => "queue_size",
            StatType::ScrapedPages => "scraped_pages",
            StatType::UrlNotFound => "url_not_found",
            StatType::RedirectFailed => "redirect_failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

impl fmt::Display for StatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 全局限流开关
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlFlags {
    pub worker_hold: bool,
    pub queue_hold: bool,
    /// 每次领取任务前的等待秒数，0表示不等待
    pub delay_seconds: u64,
}

/// 批量清除Worker的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvictionSummary {
    pub workers: u64,
    /// 被清除Worker名下尚未回报的任务总数
    pub outstanding_queue: i64,
}
