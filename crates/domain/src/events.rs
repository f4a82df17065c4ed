//! 合并写入事件
//!
//! 请求处理路径只负责投递事件，由唯一的后台消费者合并后批量落库

use crate::entities::{NoRedirectRecord, ScrapedPage};

#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    /// 扣减Worker的未完成任务数
    Subtract { worker_id: String, amount: i64 },
    /// 任务已有终态，从积压中移除
    Delete { identifier: String },
    Success(ScrapedPage),
    NoRedirect(NoRedirectRecord),
    NotFound,
}

impl BatchEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            BatchEvent::Subtract { .. } => "subtract",
            BatchEvent::Delete { .. } => "delete",
            BatchEvent::Success(_) => "success",
            BatchEvent::NoRedirect(_) => "noredirect",
            BatchEvent::NotFound => "notfound",
        }
    }
}
