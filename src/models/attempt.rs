use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AttemptFailure;

/// 运行器自己观察到的证据（仅供参考，验证引擎会独立复核）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunEvidence {
    /// 提交后的页面地址
    pub final_url: Option<String>,
    /// 运行器读到的结果信号文本
    pub result_signal: Option<String>,
    /// 提交前就检测到"已投递"标记，本次没有再次提交
    pub already_applied: bool,
}

/// 单次尝试的结果：`attempt(queueItem) -> RunOutcome`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub succeeded: bool,
    pub failure: Option<AttemptFailure>,
    pub evidence: RunEvidence,
}

impl RunOutcome {
    pub fn success(evidence: RunEvidence) -> Self {
        Self {
            succeeded: true,
            failure: None,
            evidence,
        }
    }

    pub fn failure(failure: AttemptFailure) -> Self {
        Self {
            succeeded: false,
            failure: Some(failure),
            evidence: RunEvidence::default(),
        }
    }

    pub fn with_evidence(mut self, evidence: RunEvidence) -> Self {
        self.evidence = evidence;
        self
    }
}

/// 验证置信度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// 有独立可观察证据（确认页 URL 或确认 DOM 标记）
    Hard,
    /// 运行器报告成功，但找不到独立证据
    Soft,
    /// 运行器报告失败，或验证本身无法执行
    None,
}

/// 使用的验证方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMethod {
    UrlPattern,
    DomMarker,
    AlreadyAppliedMarker,
    RunnerReportOnly,
    NotRun,
}

/// 验证时的证据快照
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceSnapshot {
    pub observed_url: Option<String>,
    pub matched_url_pattern: Option<String>,
    pub matched_marker: Option<String>,
    pub note: Option<String>,
}

/// 验证引擎产出的尝试记录，挂在 QueueItem 上
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub item_id: Uuid,
    /// 第几次尝试（从 1 开始）
    pub attempt_number: u32,
    pub method: VerificationMethod,
    pub confidence: Confidence,
    pub evidence: EvidenceSnapshot,
    /// 运行器报告的失败（如有）
    pub runner_failure: Option<AttemptFailure>,
    /// 验证本身的失败（如有）
    pub verification_failure: Option<AttemptFailure>,
    pub recorded_at: DateTime<Utc>,
}

impl AttemptRecord {
    pub fn is_hard(&self) -> bool {
        self.confidence == Confidence::Hard
    }
}
