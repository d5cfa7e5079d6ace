use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AttemptFailure;
use crate::models::Platform;

/// 职位引用（来自职位发现模块）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRef {
    /// 职位在发现模块中的唯一标识
    pub job_id: String,
    /// 投递表单地址
    pub apply_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
}

impl JobRef {
    pub fn new(job_id: impl Into<String>, apply_url: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            apply_url: apply_url.into(),
            title: None,
            company: None,
        }
    }
}

/// 投递状态
///
/// ```text
/// pending ──> in_progress ──> applied_verified | applied_soft | failed | skipped
///    ^             │
///    └─────────────┘  (有限次重试)
/// pending ──> skipped  (人工排除)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    InProgress,
    AppliedVerified,
    AppliedSoft,
    Failed,
    Skipped,
}

impl QueueStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, QueueStatus::Pending | QueueStatus::InProgress)
    }

    /// 状态机允许的边
    pub fn can_transition_to(self, next: QueueStatus) -> bool {
        use QueueStatus::*;
        match self {
            Pending => matches!(next, InProgress | Skipped),
            InProgress => matches!(
                next,
                Pending | AppliedVerified | AppliedSoft | Failed | Skipped
            ),
            AppliedVerified | AppliedSoft | Failed | Skipped => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::InProgress => "in_progress",
            QueueStatus::AppliedVerified => "applied_verified",
            QueueStatus::AppliedSoft => "applied_soft",
            QueueStatus::Failed => "failed",
            QueueStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一个待投递（或已尝试）的职位申请
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: Uuid,
    pub job: JobRef,
    pub platform: Platform,
    pub status: QueueStatus,
    /// 已完成的尝试次数，只增不减
    pub attempt_count: u32,
    /// 因字段无答案而重试的次数（只允许一次）
    #[serde(default)]
    pub unresolved_retries: u32,
    #[serde(default)]
    pub last_error: Option<AttemptFailure>,
    /// 人工排除原因
    #[serde(default)]
    pub excluded_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    /// 入队序号，创建时间相同时保证先入先出
    pub sequence: u64,
    #[serde(default)]
    pub last_attempted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub verified_at: Option<DateTime<Utc>>,
}

impl QueueItem {
    pub fn new(job: JobRef, platform: Platform, sequence: u64, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            job,
            platform,
            status: QueueStatus::Pending,
            attempt_count: 0,
            unresolved_retries: 0,
            last_error: None,
            excluded_reason: None,
            created_at: now,
            sequence,
            last_attempted_at: None,
            verified_at: None,
        }
    }

    /// 日志前缀中使用的短 ID
    pub fn short_id(&self) -> String {
        self.id.simple().to_string()[..8].to_string()
    }

    /// 是否与给定职位/平台指向同一申请
    pub fn same_application(&self, job_id: &str, platform: Platform) -> bool {
        self.job.job_id == job_id && self.platform == platform
    }
}
