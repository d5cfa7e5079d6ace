//! 批量投递处理器 - 编排层
//!
//! ## 职责
//!
//! `run_batch(maxItems, perPlatformConcurrency) -> BatchSummary`
//!
//! 1. **按平台分派**：每个有 pending 条目的平台启动若干 worker
//! 2. **熔断把关**：每次认领前向熔断器申请许可
//! 3. **单次尝试**：独立会话 + 硬超时，结束后（包括超时）会话立即销毁
//! 4. **结果落盘**：验证 → 队列状态机 → 熔断器，顺序固定
//! 5. **汇总**：本轮每个条目的结果、熔断的平台
//!
//! ## 设计特点
//!
//! - 单个条目的任何失败都不会中断整轮
//! - 同一平台内按入队顺序分派，平台之间互不影响
//! - 本轮已经尝试过的条目不会在本轮再次分派，重试留到下一轮

use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::browser::SessionFactory;
use crate::config::Config;
use crate::error::AttemptFailure;
use crate::models::{
    AttemptRecord, BatchSummary, Confidence, ItemOutcome, Platform, QueueItem, QueueStatus,
    RunOutcome,
};
use crate::runners::{PlatformRunner, RunnerRegistry};
use crate::services::{BreakerSignal, CircuitBreaker, Permit, QueueManager, Verifier};
use crate::workflow::ApplicationFlow;

/// 编排策略
#[derive(Debug, Clone)]
pub struct BatchSettings {
    /// 单次尝试的硬超时
    pub attempt_timeout: Duration,
    /// 平台被熔断时最多等待多久
    pub suspension_wait: Duration,
    /// 平台被熔断时是否把剩余条目标记为 skipped
    pub skip_when_suspended: bool,
}

impl BatchSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            attempt_timeout: config.attempt_timeout(),
            suspension_wait: config.suspension_wait(),
            skip_when_suspended: config.skip_when_suspended,
        }
    }
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// 一轮批处理内 worker 之间共享的状态
#[derive(Default)]
struct RunState {
    remaining: AtomicUsize,
    attempted: Mutex<HashSet<Uuid>>,
    outcomes: Mutex<Vec<ItemOutcome>>,
    tripped: Mutex<BTreeSet<Platform>>,
}

impl RunState {
    fn new(max_items: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(max_items),
            ..Self::default()
        }
    }

    fn budget_left(&self) -> bool {
        self.remaining.load(Ordering::SeqCst) > 0
    }

    /// 预占一个名额
    fn reserve(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn release(&self) {
        self.remaining.fetch_add(1, Ordering::SeqCst);
    }

    async fn attempted(&self) -> HashSet<Uuid> {
        self.attempted.lock().await.clone()
    }

    async fn finish(&self, outcome: ItemOutcome) {
        self.attempted.lock().await.insert(outcome.item_id);
        self.outcomes.lock().await.push(outcome);
    }

    async fn note_tripped(&self, platform: Platform) {
        self.tripped.lock().await.insert(platform);
    }
}

/// 批量投递编排器
#[derive(Clone)]
pub struct BatchOrchestrator {
    queue: Arc<QueueManager>,
    breaker: Arc<CircuitBreaker>,
    verifier: Arc<Verifier>,
    flow: Arc<ApplicationFlow>,
    registry: RunnerRegistry,
    sessions: Arc<dyn SessionFactory>,
    settings: BatchSettings,
}

impl BatchOrchestrator {
    pub fn new(
        queue: Arc<QueueManager>,
        breaker: Arc<CircuitBreaker>,
        verifier: Arc<Verifier>,
        flow: Arc<ApplicationFlow>,
        registry: RunnerRegistry,
        sessions: Arc<dyn SessionFactory>,
        settings: BatchSettings,
    ) -> Self {
        Self {
            queue,
            breaker,
            verifier,
            flow,
            registry,
            sessions,
            settings,
        }
    }

    pub fn queue(&self) -> &Arc<QueueManager> {
        &self.queue
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// 运行一轮批处理
    pub async fn run_batch(&self, max_items: usize, per_platform_concurrency: usize) -> BatchSummary {
        let started = Instant::now();
        let run = Arc::new(RunState::new(max_items));
        let workers_per_platform = per_platform_concurrency.max(1);

        let mut platforms = Vec::new();
        for platform in self.queue.platforms_with_pending().await {
            if self.registry.get(platform).is_some() {
                platforms.push(platform);
            } else {
                warn!("⚠️ 平台 {} 没有注册运行器，其条目保留在 pending", platform);
            }
        }

        if platforms.is_empty() {
            info!("✓ 队列中没有待投递的条目");
            return BatchSummary::new(Vec::new(), Vec::new(), started.elapsed());
        }

        log_batch_start(&platforms, max_items, workers_per_platform);

        let mut handles = Vec::new();
        for platform in platforms {
            for worker in 1..=workers_per_platform {
                let this = self.clone();
                let run = run.clone();
                let handle = tokio::spawn(async move { this.worker_loop(platform, worker, run).await });
                handles.push((platform, handle));
            }
        }

        for (platform, handle) in handles {
            if let Err(e) = handle.await {
                error!("[{}] ❌ worker 异常终止: {}", platform, e);
            }
        }

        let outcomes = std::mem::take(&mut *run.outcomes.lock().await);
        let tripped: Vec<Platform> = run.tripped.lock().await.iter().copied().collect();
        BatchSummary::new(outcomes, tripped, started.elapsed())
    }

    /// 单个平台的 worker：申请许可 → 认领 → 尝试，直到没有条目、名额用完或平台被熔断
    async fn worker_loop(&self, platform: Platform, worker: usize, run: Arc<RunState>) {
        let Some(runner) = self.registry.get(platform) else {
            return;
        };

        while run.budget_left() {
            let permit = match self.breaker.permit(platform).await {
                Ok(permit) => permit,
                Err(e) => {
                    error!("[{}] ❌ 读取熔断状态失败: {}", platform, e);
                    return;
                }
            };

            match permit {
                Permit::Denied { retry_after } => {
                    run.note_tripped(platform).await;
                    if retry_after <= self.settings.suspension_wait {
                        info!("[{}] ⏳ 平台熔断中，等待 {} 秒后重试", platform, retry_after.as_secs());
                        tokio::time::sleep(retry_after).await;
                        continue;
                    }
                    if self.settings.skip_when_suspended {
                        self.skip_remaining(platform, &run).await;
                    } else {
                        warn!("[{}] ⏸️ 平台熔断中，剩余条目留到下一轮", platform);
                    }
                    return;
                }
                Permit::TrialInFlight => {
                    info!("[{}] 半开试探进行中，worker {} 退出", platform, worker);
                    return;
                }
                Permit::Trial => {
                    info!("[{}] 🔎 冷却结束，放行一次试探", platform);
                }
                Permit::Allowed => {}
            }

            if !run.reserve() {
                self.release_trial(platform, permit).await;
                return;
            }

            let exclude = run.attempted().await;
            let item = match self.queue.claim_next(platform, &exclude).await {
                Ok(Some(item)) => item,
                Ok(None) => {
                    run.release();
                    self.release_trial(platform, permit).await;
                    return;
                }
                Err(e) => {
                    error!("[{}] ❌ 认领条目失败: {}", platform, e);
                    run.release();
                    self.release_trial(platform, permit).await;
                    return;
                }
            };

            let outcome = self.process_item(runner.clone(), item, permit, &run).await;
            run.finish(outcome).await;
        }
    }

    /// 处理一个已认领的条目，返回本轮结果
    async fn process_item(
        &self,
        runner: Arc<dyn PlatformRunner>,
        item: QueueItem,
        permit: Permit,
        run: &RunState,
    ) -> ItemOutcome {
        let id = item.short_id();
        let platform = item.platform;
        info!(
            "[投递 {}] ▶️ 第 {} 次尝试: {} ({})",
            id,
            item.attempt_count + 1,
            item.job.job_id,
            platform
        );

        let (outcome, record) = self.execute(runner, &item).await;
        let confidence = record.confidence;
        let signal = BreakerSignal::from_attempt(
            confidence,
            outcome.failure.as_ref().or(record.verification_failure.as_ref()),
        );

        let result = match self.queue.record_outcome(item.id, &outcome, record).await {
            Ok(updated) => {
                log_item_result(&updated, confidence);
                item_outcome(&updated, Some(confidence))
            }
            Err(e) => {
                error!("[投递 {}] ❌ 保存结果失败，下次启动时将恢复: {}", id, e);
                ItemOutcome {
                    error: outcome
                        .failure
                        .clone()
                        .or_else(|| Some(AttemptFailure::transient(format!("保存结果失败: {}", e)))),
                    ..item_outcome(&item, Some(confidence))
                }
            }
        };

        let recorded = if permit == Permit::Trial {
            self.breaker.record_trial(platform, signal).await
        } else {
            self.breaker.record(platform, signal).await
        };
        match recorded {
            Ok(transition) if transition.tripped() => {
                error!(
                    "🚨 平台 {} 已熔断：连续失败达到 {} 次，暂停投递",
                    platform,
                    self.breaker.threshold()
                );
                run.note_tripped(platform).await;
            }
            Ok(_) => {}
            Err(e) => error!("[{}] ❌ 更新熔断状态失败: {}", platform, e),
        }

        result
    }

    /// 执行一次尝试并验证
    ///
    /// 尝试在独立任务中运行：超时或任务崩溃都折算成 TransientFailure，会话总会被销毁。
    async fn execute(&self, runner: Arc<dyn PlatformRunner>, item: &QueueItem) -> (RunOutcome, AttemptRecord) {
        let mut session = match self.sessions.open().await {
            Ok(session) => session,
            Err(e) => {
                let outcome = RunOutcome::failure(AttemptFailure::from_browser(&e, item.last_error.as_ref()));
                let record = self.verifier.not_run(item, &outcome);
                return (outcome, record);
            }
        };

        let flow = self.flow.clone();
        let verifier = self.verifier.clone();
        let timeout = self.settings.attempt_timeout;
        let task_item = item.clone();

        let handle = tokio::spawn(async move {
            let outcome = match tokio::time::timeout(
                timeout,
                flow.attempt(runner.as_ref(), session.as_mut(), &task_item),
            )
            .await
            {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!("[投递 {}] ⏱️ 尝试超时 ({} 秒)", task_item.short_id(), timeout.as_secs());
                    RunOutcome::failure(AttemptFailure::transient(format!(
                        "尝试超过 {} 秒未完成",
                        timeout.as_secs()
                    )))
                }
            };

            let record = verifier.verify(&task_item, &outcome, session.as_mut()).await;
            if let Err(e) = session.close().await {
                warn!("[投递 {}] 关闭会话失败: {}", task_item.short_id(), e);
            }
            (outcome, record)
        });

        match handle.await {
            Ok(result) => result,
            Err(e) => {
                error!("[投递 {}] ❌ 运行器异常终止: {}", item.short_id(), e);
                let outcome = RunOutcome::failure(AttemptFailure::transient("运行器异常终止"));
                let record = self.verifier.not_run(item, &outcome);
                (outcome, record)
            }
        }
    }

    /// 平台熔断：把本轮剩余的 pending 条目标记为 skipped（不占用名额，不计尝试次数）
    async fn skip_remaining(&self, platform: Platform, run: &RunState) {
        loop {
            let exclude = run.attempted().await;
            let item = match self.queue.claim_next(platform, &exclude).await {
                Ok(Some(item)) => item,
                Ok(None) => return,
                Err(e) => {
                    error!("[{}] ❌ 认领待跳过条目失败: {}", platform, e);
                    return;
                }
            };

            match self.queue.mark_skipped(item.id, platform).await {
                Ok(skipped) => {
                    warn!("[投递 {}] ⏭️ 平台 {} 熔断中，已跳过", skipped.short_id(), platform);
                    run.finish(item_outcome(&skipped, None)).await;
                }
                Err(e) => {
                    error!("[投递 {}] ❌ 标记跳过失败: {}", item.short_id(), e);
                    return;
                }
            }
        }
    }

    /// 拿到试探许可却没有用上时，释放试探名额
    async fn release_trial(&self, platform: Platform, permit: Permit) {
        if permit != Permit::Trial {
            return;
        }
        if let Err(e) = self.breaker.record_trial(platform, BreakerSignal::Neutral).await {
            error!("[{}] ❌ 释放试探名额失败: {}", platform, e);
        }
    }
}

fn item_outcome(item: &QueueItem, confidence: Option<Confidence>) -> ItemOutcome {
    ItemOutcome {
        item_id: item.id,
        job_id: item.job.job_id.clone(),
        platform: item.platform,
        status: item.status,
        attempt_count: item.attempt_count,
        confidence,
        error: item.last_error.clone(),
    }
}

// ========== 日志辅助函数 ==========

fn log_batch_start(platforms: &[Platform], max_items: usize, workers: usize) {
    let names: Vec<&str> = platforms.iter().map(|p| p.name()).collect();
    info!("\n{}", "=".repeat(60));
    info!("📦 开始本轮投递: {}", names.join(", "));
    info!("📊 本轮上限 {} 个条目，每个平台 {} 个 worker", max_items, workers);
    info!("{}", "=".repeat(60));
}

fn log_item_result(item: &QueueItem, confidence: Confidence) {
    let id = item.short_id();
    match item.status {
        QueueStatus::AppliedVerified => info!("[投递 {}] ✅ 投递成功（已验证）", id),
        QueueStatus::AppliedSoft => warn!(
            "[投递 {}] ⚠️ 运行器报告成功，但没有确认证据 ({:?})，需要人工确认",
            id, confidence
        ),
        QueueStatus::Pending => warn!(
            "[投递 {}] 🔁 本次失败，下一轮重试 (已尝试 {} 次): {}",
            id,
            item.attempt_count,
            describe(item.last_error.as_ref())
        ),
        QueueStatus::Failed => error!(
            "[投递 {}] ❌ 投递失败 (共 {} 次): {}",
            id,
            item.attempt_count,
            describe(item.last_error.as_ref())
        ),
        QueueStatus::Skipped | QueueStatus::InProgress => {
            info!("[投递 {}] 状态: {}", id, item.status)
        }
    }
}

fn describe(error: Option<&AttemptFailure>) -> String {
    error.map(ToString::to_string).unwrap_or_else(|| "未知原因".to_string())
}
