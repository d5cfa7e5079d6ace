//! 验证服务 - 业务能力层
//!
//! 独立判断一次"运行器自称成功"的提交是否真的被平台接受。
//! 运行器的自我报告不被信任：只有确认页 URL 或确认 DOM 标记才算 hard 验证。

use std::time::Duration;

use chrono::Utc;
use phf::phf_map;
use regex::Regex;
use tracing::{debug, warn};

use crate::browser::BrowserSession;
use crate::error::AttemptFailure;
use crate::models::{
    AttemptRecord, Confidence, EvidenceSnapshot, Platform, QueueItem, RunOutcome,
    VerificationMethod,
};

/// 平台的确认规则
#[derive(Debug)]
pub struct ConfirmationRules {
    /// 提交后确认页 URL 的正则
    pub url_patterns: &'static [&'static str],
    /// 确认页 DOM 标记选择器
    pub confirmation_markers: &'static [&'static str],
    /// "已投递过"标记选择器
    pub already_applied_markers: &'static [&'static str],
}

static CONFIRMATION_RULES: phf::Map<&'static str, ConfirmationRules> = phf_map! {
    "greenhouse" => ConfirmationRules {
        url_patterns: &[r"/confirmation(\?|$|/)", r"[?&]submitted=true"],
        confirmation_markers: &["#application_confirmation", ".application-confirmation"],
        already_applied_markers: &["#already_applied_notice", ".already-applied"],
    },
    "workday" => ConfirmationRules {
        url_patterns: &[r"/applicationSubmitted", r"/userHome\?.*submitted"],
        confirmation_markers: &[
            "[data-automation-id='applicationSubmittedMessage']",
            "[data-automation-id='congratulationsPopup']",
        ],
        already_applied_markers: &["[data-automation-id='alreadyApplied']"],
    },
};

/// 获取平台的确认规则
pub fn confirmation_rules(platform: Platform) -> &'static ConfirmationRules {
    static EMPTY: ConfirmationRules = ConfirmationRules {
        url_patterns: &[],
        confirmation_markers: &[],
        already_applied_markers: &[],
    };
    CONFIRMATION_RULES.get(platform.code()).unwrap_or(&EMPTY)
}

/// 单次验证读取页面的时间上限
const VERIFY_TIMEOUT: Duration = Duration::from_secs(30);

/// 验证引擎
pub struct Verifier {
    url_patterns: Vec<(Platform, Regex)>,
}

impl Verifier {
    pub fn new() -> Self {
        let mut url_patterns = Vec::new();
        for platform in Platform::ALL {
            for pattern in confirmation_rules(platform).url_patterns {
                match Regex::new(pattern) {
                    Ok(re) => url_patterns.push((platform, re)),
                    Err(e) => warn!("{} 的确认 URL 规则无效 '{}': {}", platform, pattern, e),
                }
            }
        }
        Self { url_patterns }
    }

    /// 判断 URL 是否命中确认页规则，返回命中的规则
    pub fn match_confirmation_url(&self, platform: Platform, url: &str) -> Option<String> {
        self.url_patterns
            .iter()
            .filter(|(p, _)| *p == platform)
            .find(|(_, re)| re.is_match(url))
            .map(|(_, re)| re.as_str().to_string())
    }

    /// `verify(queueItem, runOutcome) -> AttemptRecord`
    ///
    /// 运行器失败时不读取页面，直接给出 none。
    pub async fn verify(
        &self,
        item: &QueueItem,
        outcome: &RunOutcome,
        session: &mut dyn BrowserSession,
    ) -> AttemptRecord {
        if !outcome.succeeded {
            return self.not_run(item, outcome);
        }

        match tokio::time::timeout(VERIFY_TIMEOUT, self.inspect(item, outcome, session)).await {
            Ok(record) => record,
            Err(_) => self.inconclusive(item, outcome, EvidenceSnapshot::default(), "读取页面超时"),
        }
    }

    /// 运行器失败（或根本没跑起来）时的记录
    pub fn not_run(&self, item: &QueueItem, outcome: &RunOutcome) -> AttemptRecord {
        AttemptRecord {
            item_id: item.id,
            attempt_number: item.attempt_count + 1,
            method: VerificationMethod::NotRun,
            confidence: Confidence::None,
            evidence: EvidenceSnapshot::default(),
            runner_failure: outcome.failure.clone(),
            verification_failure: None,
            recorded_at: Utc::now(),
        }
    }

    async fn inspect(
        &self,
        item: &QueueItem,
        outcome: &RunOutcome,
        session: &mut dyn BrowserSession,
    ) -> AttemptRecord {
        let rules = confirmation_rules(item.platform);
        let mut evidence = EvidenceSnapshot::default();
        let mut read_errors = Vec::new();

        match session.current_url().await {
            Ok(url) => {
                evidence.matched_url_pattern = self.match_confirmation_url(item.platform, &url);
                evidence.observed_url = Some(url);
                if evidence.matched_url_pattern.is_some() {
                    return self.record(item, outcome, VerificationMethod::UrlPattern, Confidence::Hard, evidence);
                }
            }
            Err(e) => read_errors.push(e.to_string()),
        }

        let (markers, method) = if outcome.evidence.already_applied {
            (rules.already_applied_markers, VerificationMethod::AlreadyAppliedMarker)
        } else {
            (rules.confirmation_markers, VerificationMethod::DomMarker)
        };
        let mut marker_reads = 0;
        for selector in markers {
            match session.read_marker(selector).await {
                Ok(Some(_)) => {
                    evidence.matched_marker = Some(selector.to_string());
                    return self.record(item, outcome, method, Confidence::Hard, evidence);
                }
                Ok(None) => marker_reads += 1,
                Err(e) => read_errors.push(e.to_string()),
            }
        }

        // URL 和所有标记都没读到，验证本身没能执行
        if evidence.observed_url.is_none() && marker_reads == 0 {
            let detail = read_errors.join("; ");
            return self.inconclusive(item, outcome, evidence, &detail);
        }

        debug!(
            "[投递 {}] 运行器报告成功，但没有独立的确认证据",
            item.short_id()
        );
        evidence.note = Some("运行器报告成功，未找到确认页 URL 或确认标记".to_string());
        self.record(item, outcome, VerificationMethod::RunnerReportOnly, Confidence::Soft, evidence)
    }

    fn record(
        &self,
        item: &QueueItem,
        outcome: &RunOutcome,
        method: VerificationMethod,
        confidence: Confidence,
        evidence: EvidenceSnapshot,
    ) -> AttemptRecord {
        AttemptRecord {
            item_id: item.id,
            attempt_number: item.attempt_count + 1,
            method,
            confidence,
            evidence,
            runner_failure: outcome.failure.clone(),
            verification_failure: None,
            recorded_at: Utc::now(),
        }
    }

    fn inconclusive(
        &self,
        item: &QueueItem,
        outcome: &RunOutcome,
        mut evidence: EvidenceSnapshot,
        detail: &str,
    ) -> AttemptRecord {
        warn!("[投递 {}] ⚠️ 验证无法执行: {}", item.short_id(), detail);
        evidence.note = Some(detail.to_string());
        AttemptRecord {
            verification_failure: Some(AttemptFailure::VerificationInconclusive {
                detail: detail.to_string(),
            }),
            ..self.record(item, outcome, VerificationMethod::NotRun, Confidence::None, evidence)
        }
    }
}

impl Default for Verifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::{FakeStep, ScriptedSession};
    use crate::models::{JobRef, RunEvidence};

    fn item(platform: Platform) -> QueueItem {
        QueueItem::new(JobRef::new("job-1", "https://example.com/apply"), platform, 0, Utc::now())
    }

    fn success() -> RunOutcome {
        RunOutcome::success(RunEvidence::default())
    }

    #[test]
    fn url_rules_are_per_platform() {
        let verifier = Verifier::new();
        let url = "https://boards.greenhouse.io/acme/jobs/1/confirmation";
        assert!(verifier.match_confirmation_url(Platform::Greenhouse, url).is_some());
        assert!(verifier.match_confirmation_url(Platform::Workday, url).is_none());
        assert!(verifier
            .match_confirmation_url(Platform::Greenhouse, "https://boards.greenhouse.io/acme/jobs/1")
            .is_none());
    }

    #[tokio::test]
    async fn confirmation_url_is_hard() {
        let mut session = ScriptedSession::new(vec![FakeStep::default()])
            .with_url("https://boards.greenhouse.io/acme/jobs/1/confirmation");
        let record = Verifier::new()
            .verify(&item(Platform::Greenhouse), &success(), &mut session)
            .await;
        assert_eq!(record.confidence, Confidence::Hard);
        assert_eq!(record.method, VerificationMethod::UrlPattern);
        assert_eq!(record.attempt_number, 1);
    }

    #[tokio::test]
    async fn confirmation_marker_is_hard() {
        let mut session = ScriptedSession::new(vec![FakeStep::default()
            .with_marker("[data-automation-id='applicationSubmittedMessage']", "Thanks!")])
            .with_url("https://acme.wd5.myworkdayjobs.com/en-US/careers/job/1");
        let record = Verifier::new()
            .verify(&item(Platform::Workday), &success(), &mut session)
            .await;
        assert_eq!(record.confidence, Confidence::Hard);
        assert_eq!(
            record.evidence.matched_marker.as_deref(),
            Some("[data-automation-id='applicationSubmittedMessage']")
        );
    }

    #[tokio::test]
    async fn success_without_evidence_is_soft() {
        let mut session = ScriptedSession::new(vec![FakeStep::default()])
            .with_url("https://boards.greenhouse.io/acme");
        let record = Verifier::new()
            .verify(&item(Platform::Greenhouse), &success(), &mut session)
            .await;
        assert_eq!(record.confidence, Confidence::Soft);
        assert_eq!(record.method, VerificationMethod::RunnerReportOnly);
    }

    #[tokio::test]
    async fn runner_failure_is_none_without_touching_page() {
        let mut session = ScriptedSession::new(vec![FakeStep::default()]).failing_reads();
        let outcome = RunOutcome::failure(AttemptFailure::transient("timeout"));
        let record = Verifier::new()
            .verify(&item(Platform::Greenhouse), &outcome, &mut session)
            .await;
        assert_eq!(record.confidence, Confidence::None);
        assert_eq!(record.method, VerificationMethod::NotRun);
        assert_eq!(record.runner_failure, outcome.failure);
        assert!(record.verification_failure.is_none());
    }

    #[tokio::test]
    async fn unreadable_page_is_inconclusive() {
        let mut session = ScriptedSession::new(vec![FakeStep::default()]).failing_reads();
        let record = Verifier::new()
            .verify(&item(Platform::Greenhouse), &success(), &mut session)
            .await;
        assert_eq!(record.confidence, Confidence::None);
        assert!(matches!(
            record.verification_failure,
            Some(AttemptFailure::VerificationInconclusive { .. })
        ));
    }

    #[tokio::test]
    async fn already_applied_marker_is_checked_independently() {
        let mut session = ScriptedSession::new(vec![FakeStep::default()
            .with_marker("#already_applied_notice", "You have already applied")])
            .with_url("https://boards.greenhouse.io/acme/jobs/1");
        let outcome = RunOutcome::success(RunEvidence {
            already_applied: true,
            ..RunEvidence::default()
        });
        let record = Verifier::new()
            .verify(&item(Platform::Greenhouse), &outcome, &mut session)
            .await;
        assert_eq!(record.confidence, Confidence::Hard);
        assert_eq!(record.method, VerificationMethod::AlreadyAppliedMarker);
    }
}
