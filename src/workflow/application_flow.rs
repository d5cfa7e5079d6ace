//! 投递流程 - 流程层
//!
//! 核心职责：定义"一次投递尝试"的完整流程
//!
//! 流程顺序：
//! 1. 打开申请表单
//! 2. 检查"已投递"标记（命中则直接报告成功，不再提交）
//! 3. 逐页：枚举字段 → 上传文档 / 查答案填写 → 翻页
//! 4. 提交 → 读取结果信号
//!
//! 不持有浏览器会话，不修改队列状态，只产出 RunOutcome。

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::browser::BrowserSession;
use crate::error::AttemptFailure;
use crate::models::{FieldKind, FormField, QueueItem, RunEvidence, RunOutcome};
use crate::runners::{Documents, PlatformRunner, ResultSignal, RunnerError};
use crate::services::{AnswerResolver, Resolution, UnresolvedWriter};

/// 单次尝试最多走过的页数，超过视为表单结构异常
const MAX_PAGES: usize = 10;

/// 投递流程
///
/// - 编排单次尝试的各个步骤
/// - 决定字段用答案、文档还是保留平台默认值
/// - 只依赖运行器能力和答案解析
pub struct ApplicationFlow {
    resolver: Arc<AnswerResolver>,
    documents: Documents,
    unresolved_writer: Arc<UnresolvedWriter>,
}

impl ApplicationFlow {
    pub fn new(
        resolver: Arc<AnswerResolver>,
        documents: Documents,
        unresolved_writer: Arc<UnresolvedWriter>,
    ) -> Self {
        Self {
            resolver,
            documents,
            unresolved_writer,
        }
    }

    /// `attempt(queueItem) -> RunOutcome`
    ///
    /// 所有错误都折算成 RunOutcome，不会向上传播。
    pub async fn attempt(
        &self,
        runner: &dyn PlatformRunner,
        session: &mut dyn BrowserSession,
        item: &QueueItem,
    ) -> RunOutcome {
        match self.drive(runner, session, item).await {
            Ok(outcome) => outcome,
            Err(RunnerError::Attempt(failure)) => RunOutcome::failure(failure),
            Err(RunnerError::Browser(err)) => {
                RunOutcome::failure(AttemptFailure::from_browser(&err, item.last_error.as_ref()))
            }
        }
    }

    async fn drive(
        &self,
        runner: &dyn PlatformRunner,
        session: &mut dyn BrowserSession,
        item: &QueueItem,
    ) -> Result<RunOutcome, RunnerError> {
        let id = item.short_id();

        info!("[投递 {}] 🌐 打开申请页: {}", id, item.job.apply_url);
        runner.navigate_to_form(session, &item.job).await?;

        if let Some(marker) = runner.already_applied(session).await? {
            info!("[投递 {}] ✓ 检测到已投递标记 {}，不再提交", id, marker);
            return Ok(RunOutcome::success(RunEvidence {
                final_url: session.current_url().await.ok(),
                result_signal: Some(marker),
                already_applied: true,
            }));
        }

        let mut page = 1;
        loop {
            let fields = runner.enumerate_fields(session).await?;
            debug!("[投递 {}] 第 {} 页，{} 个字段", id, page, fields.len());
            self.fill_page(runner, session, item, &fields).await?;

            if !runner.next_page(session).await? {
                break;
            }
            page += 1;
            if page > MAX_PAGES {
                return Err(AttemptFailure::structure_changed(format!(
                    "表单超过 {} 页仍未到达提交步骤",
                    MAX_PAGES
                ))
                .into());
            }
        }

        info!("[投递 {}] 📤 提交申请 (共 {} 页)", id, page);
        runner.submit(session).await?;

        let signal = runner.read_result_signal(session).await?;
        let final_url = session.current_url().await.ok();
        match signal {
            ResultSignal::Rejected(reason) => {
                warn!("[投递 {}] ⚠️ 平台拒绝了提交: {}", id, reason);
                Err(AttemptFailure::SubmissionRejected { reason }.into())
            }
            ResultSignal::DuplicateBlocked(reason) => {
                warn!("[投递 {}] ⚠️ 平台拦截了重复投递: {}", id, reason);
                Err(AttemptFailure::Unrecoverable { reason }.into())
            }
            ResultSignal::Confirmed(text) => Ok(RunOutcome::success(RunEvidence {
                final_url,
                result_signal: Some(text),
                already_applied: false,
            })),
            ResultSignal::Unknown => Ok(RunOutcome::success(RunEvidence {
                final_url,
                result_signal: None,
                already_applied: false,
            })),
        }
    }

    /// 填写一页
    ///
    /// 整页走完再判断必填缺失，让操作者一次看到该页所有未解析字段。
    async fn fill_page(
        &self,
        runner: &dyn PlatformRunner,
        session: &mut dyn BrowserSession,
        item: &QueueItem,
        fields: &[FormField],
    ) -> Result<(), RunnerError> {
        let mut missing_required: Option<String> = None;

        for field in fields {
            let signature = field.signature();

            if field.kind == FieldKind::File {
                let path = runner
                    .document_slot(field)
                    .and_then(|slot| self.documents.path(slot));
                match path {
                    Some(path) => {
                        debug!("[投递 {}] 上传 {} → {}", item.short_id(), signature, path.display());
                        runner.upload_document(session, field, path).await?;
                    }
                    None => {
                        self.note_unresolved(item, field).await;
                        if field.required && missing_required.is_none() {
                            missing_required = Some(signature.to_string());
                        }
                    }
                }
                continue;
            }

            match self.resolver.resolve(signature, item.platform) {
                Resolution::Resolved { value, tier } => {
                    debug!("[投递 {}] 填写 {} ({:?})", item.short_id(), signature, tier);
                    runner.fill_field(session, field, &value).await?;
                }
                Resolution::Unresolved if field.is_prefilled() => {
                    debug!("[投递 {}] {} 无答案，保留平台预填值", item.short_id(), signature);
                }
                Resolution::Unresolved => {
                    self.note_unresolved(item, field).await;
                    if field.required && missing_required.is_none() {
                        missing_required = Some(signature.to_string());
                    }
                }
            }
        }

        match missing_required {
            Some(signature) => Err(AttemptFailure::UnresolvedField { signature }.into()),
            None => Ok(()),
        }
    }

    /// 记录未解析字段（写文件失败只告警）
    async fn note_unresolved(&self, item: &QueueItem, field: &FormField) {
        let level = if field.required { "必填" } else { "选填" };
        warn!(
            "[投递 {}] ⚠️ {}字段无可用答案: {} ({})",
            item.short_id(),
            level,
            field.signature(),
            field.label
        );
        if let Err(e) = self
            .unresolved_writer
            .write(
                item.platform,
                &item.job.job_id,
                field.signature(),
                &field.label,
                field.required,
            )
            .await
        {
            warn!("写入未解析字段记录失败: {}", e);
        }
    }
}
