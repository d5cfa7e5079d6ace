//! Workday 运行器
//!
//! 多步向导：点击 Apply 进入向导，每一步填写后点击底部的 Next，
//! 按钮文字变成 Submit 时即为最后一步。国家/地区字段会改变同页其余字段，必须先填。

use async_trait::async_trait;
use tracing::debug;

use crate::browser::BrowserSession;
use crate::error::AttemptFailure;
use crate::models::{normalize_signature, FieldKind, FormField, JobRef, Platform};
use crate::runners::{first_marker, DocumentSlot, PlatformRunner, ResultSignal, RunnerError};
use crate::services::confirmation_rules;

const APPLY_BUTTON: &str = "[data-automation-id='adventureButton']";
const APPLY_MANUALLY: &str = "[data-automation-id='applyManually']";
const NEXT_BUTTON: &str = "[data-automation-id='bottom-navigation-next-button']";
const ERROR_MARKERS: &[&str] = &["[data-automation-id='errorMessage']"];
/// 最后的核对页没有输入框
const REVIEW_MARKER: &str = "[data-automation-id='reviewJobApplicationPage']";

#[derive(Debug, Default)]
pub struct WorkdayRunner;

impl WorkdayRunner {
    pub fn new() -> Self {
        Self
    }

    /// 填写优先级，数字越小越先填
    fn fill_priority(field: &FormField) -> u8 {
        let signature = normalize_signature(field.signature());
        if signature.contains("country") {
            0
        } else if signature.contains("state") || signature.contains("region") {
            1
        } else {
            2
        }
    }
}

#[async_trait]
impl PlatformRunner for WorkdayRunner {
    fn platform(&self) -> Platform {
        Platform::Workday
    }

    async fn navigate_to_form(
        &self,
        session: &mut dyn BrowserSession,
        job: &JobRef,
    ) -> Result<(), RunnerError> {
        session.navigate(&job.apply_url).await?;

        // 已投递过的职位页面没有 Apply 按钮，交给 already_applied 判断
        if session.read_marker(APPLY_BUTTON).await?.is_some() {
            session.click(APPLY_BUTTON).await?;
            if session.read_marker(APPLY_MANUALLY).await?.is_some() {
                session.click(APPLY_MANUALLY).await?;
            }
        }
        Ok(())
    }

    async fn enumerate_fields(
        &self,
        session: &mut dyn BrowserSession,
    ) -> Result<Vec<FormField>, RunnerError> {
        let mut fields = session.list_fields().await?;
        if fields.is_empty() {
            // 核对页或纯说明页：只要还有翻页按钮就不算结构变化
            let navigable = session.read_marker(NEXT_BUTTON).await?.is_some()
                || session.read_marker(REVIEW_MARKER).await?.is_some();
            if !navigable {
                return Err(AttemptFailure::structure_changed("当前步骤没有任何字段，也没有翻页按钮").into());
            }
            debug!("Workday 当前步骤没有字段，直接翻页");
            return Ok(fields);
        }
        fields.sort_by_key(Self::fill_priority);
        debug!("Workday 当前步骤共 {} 个字段", fields.len());
        Ok(fields)
    }

    fn document_slot(&self, field: &FormField) -> Option<DocumentSlot> {
        if field.kind != FieldKind::File {
            return None;
        }
        if normalize_signature(field.signature()).contains("cover") {
            Some(DocumentSlot::CoverLetter)
        } else {
            Some(DocumentSlot::Resume)
        }
    }

    async fn next_page(&self, session: &mut dyn BrowserSession) -> Result<bool, RunnerError> {
        let Some(label) = session.read_marker(NEXT_BUTTON).await? else {
            return Err(AttemptFailure::structure_changed(format!("找不到翻页按钮 {}", NEXT_BUTTON)).into());
        };
        if label.trim().eq_ignore_ascii_case("submit") {
            return Ok(false);
        }

        session.click(NEXT_BUTTON).await?;
        if let Some(reason) = first_marker(session, ERROR_MARKERS).await? {
            return Err(AttemptFailure::SubmissionRejected { reason }.into());
        }
        Ok(true)
    }

    async fn submit(&self, session: &mut dyn BrowserSession) -> Result<(), RunnerError> {
        session.click(NEXT_BUTTON).await?;
        Ok(())
    }

    async fn read_result_signal(
        &self,
        session: &mut dyn BrowserSession,
    ) -> Result<ResultSignal, RunnerError> {
        let rules = confirmation_rules(Platform::Workday);
        if let Some(text) = first_marker(session, ERROR_MARKERS).await? {
            return Ok(ResultSignal::Rejected(text));
        }
        if let Some(text) = first_marker(session, rules.already_applied_markers).await? {
            return Ok(ResultSignal::DuplicateBlocked(text));
        }
        if let Some(text) = first_marker(session, rules.confirmation_markers).await? {
            return Ok(ResultSignal::Confirmed(text));
        }
        Ok(ResultSignal::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::{field, FakeStep, ScriptedSession};

    fn step(next_label: &str) -> FakeStep {
        FakeStep::default()
            .with_button(NEXT_BUTTON)
            .with_marker(NEXT_BUTTON, next_label)
    }

    #[tokio::test]
    async fn country_is_filled_first() {
        let mut session = ScriptedSession::new(vec![step("Next")
            .with_field(field("phone", FieldKind::Text, true))
            .with_field(field("state", FieldKind::Select, true))
            .with_field(field("country", FieldKind::Select, true))]);
        let fields = WorkdayRunner::new().enumerate_fields(&mut session).await.unwrap();
        let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["country", "state", "phone"]);
    }

    #[tokio::test]
    async fn apply_button_opens_wizard() {
        let landing = FakeStep::default()
            .with_button(APPLY_BUTTON)
            .with_marker(APPLY_BUTTON, "Apply");
        let mut session = ScriptedSession::new(vec![landing, step("Next")]).advancing_on(APPLY_BUTTON);
        let log = session.log();
        WorkdayRunner::new()
            .navigate_to_form(&mut session, &JobRef::new("wd-1", "https://acme.wd5.myworkdayjobs.com/job/1"))
            .await
            .unwrap();
        assert_eq!(log.lock().unwrap().clicks, vec![APPLY_BUTTON.to_string()]);
        assert_eq!(session.read_marker(NEXT_BUTTON).await.unwrap().as_deref(), Some("Next"));
    }

    #[tokio::test]
    async fn walks_pages_until_submit_label() {
        let mut session = ScriptedSession::new(vec![step("Next"), step("Next"), step("Submit")])
            .advancing_on(NEXT_BUTTON);
        let runner = WorkdayRunner::new();
        assert!(runner.next_page(&mut session).await.unwrap());
        assert!(runner.next_page(&mut session).await.unwrap());
        assert!(!runner.next_page(&mut session).await.unwrap());
    }

    #[tokio::test]
    async fn page_validation_error_is_rejection() {
        let mut session = ScriptedSession::new(vec![
            step("Next"),
            step("Next").with_marker("[data-automation-id='errorMessage']", "Phone is required"),
        ])
        .advancing_on(NEXT_BUTTON);
        let err = WorkdayRunner::new().next_page(&mut session).await.unwrap_err();
        assert!(matches!(
            err,
            RunnerError::Attempt(AttemptFailure::SubmissionRejected { ref reason }) if reason == "Phone is required"
        ));
    }

    #[tokio::test]
    async fn missing_navigation_button_is_structure_change() {
        let mut session = ScriptedSession::new(vec![FakeStep::default()]);
        let err = WorkdayRunner::new().next_page(&mut session).await.unwrap_err();
        assert!(matches!(
            err,
            RunnerError::Attempt(AttemptFailure::FormStructureChanged { .. })
        ));
    }

    #[tokio::test]
    async fn fieldless_review_step_is_not_a_structure_change() {
        let mut session = ScriptedSession::new(vec![step("Submit")]);
        let fields = WorkdayRunner::new().enumerate_fields(&mut session).await.unwrap();
        assert!(fields.is_empty());
    }

    #[tokio::test]
    async fn empty_step_without_navigation_is_structure_change() {
        let mut session = ScriptedSession::new(vec![FakeStep::default()]);
        let err = WorkdayRunner::new().enumerate_fields(&mut session).await.unwrap_err();
        assert!(matches!(
            err,
            RunnerError::Attempt(AttemptFailure::FormStructureChanged { .. })
        ));
    }

    #[test]
    fn every_file_input_is_a_document_slot() {
        let runner = WorkdayRunner::new();
        assert_eq!(
            runner.document_slot(&field("file_upload", FieldKind::File, true)),
            Some(DocumentSlot::Resume)
        );
        assert_eq!(
            runner.document_slot(&field("cover_letter_upload", FieldKind::File, false)),
            Some(DocumentSlot::CoverLetter)
        );
    }
}
