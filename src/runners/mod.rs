//! 平台运行器 - 平台适配层
//!
//! 每个 ATS 平台实现同一组能力：打开表单、枚举字段、填写、翻页、提交、读取结果信号。
//! 新平台通过实现 [`PlatformRunner`] 并注册到 [`RunnerRegistry`] 接入，
//! 共享流程里不出现任何按平台分支的代码。

pub mod greenhouse;
pub mod workday;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::browser::BrowserSession;
use crate::error::{AttemptFailure, BrowserError};
use crate::models::{FormField, JobRef, Platform};
use crate::services::confirmation_rules;

pub use greenhouse::GreenhouseRunner;
pub use workday::WorkdayRunner;

/// 运行器内部错误：要么是浏览器传输层错误，要么已经是明确的失败分类
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Browser(#[from] BrowserError),
    #[error(transparent)]
    Attempt(#[from] AttemptFailure),
}

/// 文件上传槽位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentSlot {
    Resume,
    CoverLetter,
}

/// 投递用的文档（对引擎来说是不透明文件）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Documents {
    pub resume: PathBuf,
    pub cover_letter: Option<PathBuf>,
}

impl Documents {
    pub fn new(resume: impl Into<PathBuf>, cover_letter: Option<PathBuf>) -> Self {
        Self {
            resume: resume.into(),
            cover_letter,
        }
    }

    pub fn path(&self, slot: DocumentSlot) -> Option<&Path> {
        match slot {
            DocumentSlot::Resume => Some(self.resume.as_path()),
            DocumentSlot::CoverLetter => self.cover_letter.as_deref(),
        }
    }
}

/// 提交后平台给出的信号
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultSignal {
    /// 平台显示了确认信息
    Confirmed(String),
    /// 平台显示了校验错误或拦截
    Rejected(String),
    /// 平台拦截了重复投递
    DuplicateBlocked(String),
    /// 没有任何可识别的信号
    Unknown,
}

/// 平台运行器能力集
#[async_trait]
pub trait PlatformRunner: Send + Sync {
    fn platform(&self) -> Platform;

    /// 打开职位的申请表单
    async fn navigate_to_form(
        &self,
        session: &mut dyn BrowserSession,
        job: &JobRef,
    ) -> Result<(), RunnerError>;

    /// 检查"已投递"标记，返回命中的选择器
    async fn already_applied(
        &self,
        session: &mut dyn BrowserSession,
    ) -> Result<Option<String>, RunnerError> {
        for selector in confirmation_rules(self.platform()).already_applied_markers {
            if session.read_marker(selector).await?.is_some() {
                return Ok(Some(selector.to_string()));
            }
        }
        Ok(None)
    }

    /// 枚举当前页的字段，按平台要求的填写顺序返回
    async fn enumerate_fields(
        &self,
        session: &mut dyn BrowserSession,
    ) -> Result<Vec<FormField>, RunnerError>;

    /// 字段是否是文档上传位
    fn document_slot(&self, field: &FormField) -> Option<DocumentSlot>;

    async fn fill_field(
        &self,
        session: &mut dyn BrowserSession,
        field: &FormField,
        value: &str,
    ) -> Result<(), RunnerError> {
        session.fill_field(&field.selector, value).await?;
        Ok(())
    }

    async fn upload_document(
        &self,
        session: &mut dyn BrowserSession,
        field: &FormField,
        path: &Path,
    ) -> Result<(), RunnerError> {
        session.upload_file(&field.selector, path).await?;
        Ok(())
    }

    /// 进入下一页；已经是最后一页（该提交了）时返回 false
    async fn next_page(&self, session: &mut dyn BrowserSession) -> Result<bool, RunnerError>;

    async fn submit(&self, session: &mut dyn BrowserSession) -> Result<(), RunnerError>;

    /// 读取提交后的结果信号
    async fn read_result_signal(
        &self,
        session: &mut dyn BrowserSession,
    ) -> Result<ResultSignal, RunnerError>;
}

/// 读取第一个命中的标记，返回其文本（为空时用选择器代替）
pub(crate) async fn first_marker(
    session: &mut dyn BrowserSession,
    selectors: &[&str],
) -> Result<Option<String>, BrowserError> {
    for selector in selectors {
        if let Some(text) = session.read_marker(selector).await? {
            let text = text.trim();
            let text = if text.is_empty() { *selector } else { text };
            return Ok(Some(text.to_string()));
        }
    }
    Ok(None)
}

/// 按平台标识选择运行器
#[derive(Default, Clone)]
pub struct RunnerRegistry {
    runners: HashMap<Platform, Arc<dyn PlatformRunner>>,
}

impl RunnerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册内置的全部平台
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(GreenhouseRunner::new()));
        registry.register(Arc::new(WorkdayRunner::new()));
        registry
    }

    /// 注册运行器；同一平台重复注册时后者覆盖前者
    pub fn register(&mut self, runner: Arc<dyn PlatformRunner>) {
        self.runners.insert(runner.platform(), runner);
    }

    pub fn get(&self, platform: Platform) -> Option<Arc<dyn PlatformRunner>> {
        self.runners.get(&platform).cloned()
    }

    pub fn platforms(&self) -> Vec<Platform> {
        let mut platforms: Vec<Platform> = self.runners.keys().copied().collect();
        platforms.sort();
        platforms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_platform() {
        let registry = RunnerRegistry::with_defaults();
        assert_eq!(registry.platforms(), Platform::ALL.to_vec());
        for platform in Platform::ALL {
            assert_eq!(registry.get(platform).unwrap().platform(), platform);
        }
    }

    #[test]
    fn missing_cover_letter_has_no_path() {
        let docs = Documents::new("resume.pdf", None);
        assert_eq!(docs.path(DocumentSlot::Resume), Some(Path::new("resume.pdf")));
        assert!(docs.path(DocumentSlot::CoverLetter).is_none());
    }
}
