//! Greenhouse 运行器
//!
//! 单页表单。先上传简历（Greenhouse 会根据简历自动回填部分字段），
//! 再按 DOM 顺序填写其余字段，最后点击提交按钮。

use async_trait::async_trait;
use tracing::debug;

use crate::browser::BrowserSession;
use crate::error::{AttemptFailure, BrowserError};
use crate::models::{normalize_signature, FieldKind, FormField, JobRef, Platform};
use crate::runners::{first_marker, DocumentSlot, PlatformRunner, ResultSignal, RunnerError};
use crate::services::confirmation_rules;

const FORM_MARKER: &str = "#application_form";
const SUBMIT_BUTTON: &str = "#submit_app";
const ERROR_MARKERS: &[&str] = &["#error_explanation", ".flash-error"];

#[derive(Debug, Default)]
pub struct GreenhouseRunner;

impl GreenhouseRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PlatformRunner for GreenhouseRunner {
    fn platform(&self) -> Platform {
        Platform::Greenhouse
    }

    async fn navigate_to_form(
        &self,
        session: &mut dyn BrowserSession,
        job: &JobRef,
    ) -> Result<(), RunnerError> {
        session.navigate(&job.apply_url).await?;
        Ok(())
    }

    async fn enumerate_fields(
        &self,
        session: &mut dyn BrowserSession,
    ) -> Result<Vec<FormField>, RunnerError> {
        if session.read_marker(FORM_MARKER).await?.is_none() {
            return Err(AttemptFailure::structure_changed(format!("找不到申请表单 {}", FORM_MARKER)).into());
        }

        let mut fields = session.list_fields().await?;
        // 稳定排序：文件上传在前，其余保持 DOM 顺序
        fields.sort_by_key(|f| f.kind != FieldKind::File);
        debug!("Greenhouse 表单共 {} 个字段", fields.len());
        Ok(fields)
    }

    fn document_slot(&self, field: &FormField) -> Option<DocumentSlot> {
        if field.kind != FieldKind::File {
            return None;
        }
        let signature = normalize_signature(field.signature());
        if signature.contains("cover") {
            Some(DocumentSlot::CoverLetter)
        } else if signature.contains("resume") || signature.contains("cv") {
            Some(DocumentSlot::Resume)
        } else {
            None
        }
    }

    async fn next_page(&self, _session: &mut dyn BrowserSession) -> Result<bool, RunnerError> {
        Ok(false)
    }

    async fn submit(&self, session: &mut dyn BrowserSession) -> Result<(), RunnerError> {
        match session.click(SUBMIT_BUTTON).await {
            Ok(()) => Ok(()),
            Err(BrowserError::ElementNotFound { .. }) => {
                debug!("找不到 {}，改用通用提交", SUBMIT_BUTTON);
                session.submit().await?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn read_result_signal(
        &self,
        session: &mut dyn BrowserSession,
    ) -> Result<ResultSignal, RunnerError> {
        let rules = confirmation_rules(Platform::Greenhouse);
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
