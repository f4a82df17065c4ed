use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use harvester_core::{HarvesterError, HarvesterResult};
use harvester_domain::entities::{NoRedirectRecord, ScrapedPage};

use crate::batcher::BatchHandle;

/// Worker回报的结果，字段名与表单一致
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResultReport {
    pub status: String,
    pub unresolved_url: String,
    #[serde(default)]
    pub resolved_url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub short_description: Option<String>,
    #[serde(default, alias = "full_text_blob")]
    pub full_text: Option<String>,
    #[serde(default)]
    pub scraped_at: Option<String>,
}

/// 校验通过后的结果
#[derive(Debug, Clone, PartialEq)]
enum Outcome {
    Success(ScrapedPage),
    NoRedirect(NoRedirectRecord),
    NotFound,
}

fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|value| !value.trim().is_empty())
}

/// 接受 RFC3339 或 `%Y-%m-%d %H:%M:%S`(UTC)，无法解析时取当前时间
fn parse_scraped_at(raw: Option<&str>) -> DateTime<Utc> {
    let Some(raw) = raw.map(str::trim) else {
        return Utc::now();
    };

    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|at| at.and_utc())
        })
        .unwrap_or_else(|_| Utc::now())
}

impl ResultReport {
    fn into_outcome(self, worker_id: &str) -> HarvesterResult<Outcome> {
        if self.unresolved_url.trim().is_empty() {
            return Err(HarvesterError::validation("Missing unresolved_url"));
        }

        match self.status.as_str() {
            "success" => {
                let missing: Vec<&str> = [
                    ("resolved_url", &self.resolved_url),
                    ("title", &self.title),
                    ("short_description", &self.short_description),
                    ("full_text_blob", &self.full_text),
                ]
                .into_iter()
                .filter(|(_, value)| present(value).is_none())
                .map(|(name, _)| name)
                .collect();

                if !missing.is_empty() {
                    return Err(HarvesterError::validation(format!(
                        "Missing required fields for success status: {}",
                        missing.join(", ")
                    )));
                }

                Ok(Outcome::Success(ScrapedPage {
                    worker_id: worker_id.to_string(),
                    unresolved_url: self.unresolved_url,
                    resolved_url: self.resolved_url.unwrap_or_default(),
                    title: self.title.unwrap_or_default(),
                    short_description: self.short_description.unwrap_or_default(),
                    full_text: self.full_text.unwrap_or_default(),
                    scraped_at: parse_scraped_at(present(&self.scraped_at)),
                }))
            }
            "noredirect" => Ok(Outcome::NoRedirect(NoRedirectRecord {
                worker_id: worker_id.to_string(),
                unresolved_url: self.unresolved_url,
                reported_at: Utc::now(),
            })),
            "notfound" => Ok(Outcome::NotFound),
            _ => Err(HarvesterError::validation(
                "Invalid status. Must be 'success', 'noredirect', or 'notfound'",
            )),
        }
    }
}

/// 结果接收
///
/// 校验在入队之前完成，被拒绝的回报不会产生任何写入。
/// 每个终态结果入队三类事件: 扣减Worker任务数、删除积压、结果本身。
#[derive(Clone)]
pub struct ResultIntake {
    batch: BatchHandle,
}

impl ResultIntake {
    pub fn new(batch: BatchHandle) -> Self {
        Self { batch }
    }

    pub async fn submit(&self, worker_id: &str, report: ResultReport) -> HarvesterResult<()> {
        let identifier = report.unresolved_url.clone();
        let outcome = report.into_outcome(worker_id)?;

        self.batch.subtract(worker_id, 1).await?;
        self.batch.delete(&identifier).await?;

        match outcome {
            Outcome::Success(page) => self.batch.success(page).await?,
            Outcome::NoRedirect(record) => self.batch.noredirect(record).await?,
            Outcome::NotFound => self.batch.notfound().await?,
        }

        debug!("Worker {} 的结果已入队", worker_id);
        Ok(())
    }
}
