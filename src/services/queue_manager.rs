//! 队列管理服务 - 业务能力层
//!
//! 持久化队列的唯一修改入口。认领（pending → in_progress）与结果记录都在
//! StateStore 的锁内原子完成，运行器从不直接修改条目状态。

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{AttemptFailure, FailureKind, QueueError};
use crate::infrastructure::{PersistedState, StateStore};
use crate::models::{
    AttemptRecord, BreakerState, Confidence, JobRef, Platform, QueueItem, QueueStatus, RunOutcome,
};
use crate::services::CircuitBreaker;

/// 队列管理器
pub struct QueueManager {
    store: Arc<StateStore>,
    max_attempts: u32,
}

impl QueueManager {
    pub fn new(store: Arc<StateStore>, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// 入队（幂等）
    ///
    /// 同一职位 + 平台已有未终结条目，或已经投递成功（含 soft）时，返回已有条目；
    /// 只有之前的条目全部 failed / skipped 时才会新建。
    pub async fn enqueue(&self, job: JobRef, platform: Platform) -> Result<QueueItem, QueueError> {
        let now = Utc::now();
        let (item, created) = self
            .store
            .mutate(|state| {
                let existing = state.items.iter().find(|i| {
                    i.same_application(&job.job_id, platform)
                        && !matches!(i.status, QueueStatus::Failed | QueueStatus::Skipped)
                });
                if let Some(existing) = existing {
                    return Ok::<_, QueueError>((existing.clone(), false));
                }

                let item = QueueItem::new(job, platform, state.next_sequence, now);
                state.next_sequence += 1;
                state.items.push(item.clone());
                Ok((item, true))
            })
            .await?;

        if created {
            info!("[投递 {}] ➕ 已入队: {} ({})", item.short_id(), item.job.job_id, platform);
        }
        Ok(item)
    }

    /// `nextEligible(platform)`：该平台最早的 pending 条目；平台熔断中时返回 None
    pub async fn next_eligible(
        &self,
        platform: Platform,
        breaker: &CircuitBreaker,
    ) -> Option<QueueItem> {
        if breaker.state(platform).await == BreakerState::Open {
            return None;
        }
        self.store
            .read(|state| oldest_pending(state, platform, &HashSet::new()).cloned())
            .await
    }

    /// 原子认领该平台最早的 pending 条目（跳过 `exclude` 中的条目）
    pub async fn claim_next(
        &self,
        platform: Platform,
        exclude: &HashSet<Uuid>,
    ) -> Result<Option<QueueItem>, QueueError> {
        let now = Utc::now();
        self.store
            .mutate(|state| {
                let Some(id) = oldest_pending(state, platform, exclude).map(|i| i.id) else {
                    return Ok(None);
                };
                let item = find_mut(state, id)?;
                transition(item, QueueStatus::InProgress)?;
                item.last_attempted_at = Some(now);
                Ok(Some(item.clone()))
            })
            .await
    }

    /// 记录一次尝试的结果，与尝试记录一起原子落盘
    pub async fn record_outcome(
        &self,
        id: Uuid,
        outcome: &RunOutcome,
        record: AttemptRecord,
    ) -> Result<QueueItem, QueueError> {
        let now = Utc::now();
        let max_attempts = self.max_attempts;
        let item = self
            .store
            .mutate(|state| {
                let item = find_mut(state, id)?;
                if item.status != QueueStatus::InProgress {
                    return Err(QueueError::NotInProgress {
                        id,
                        status: item.status,
                    });
                }
                item.attempt_count += 1;

                let next = if outcome.succeeded {
                    if record.confidence == Confidence::Hard {
                        item.verified_at = Some(now);
                        item.last_error = None;
                        QueueStatus::AppliedVerified
                    } else {
                        item.last_error = record.verification_failure.clone();
                        QueueStatus::AppliedSoft
                    }
                } else {
                    let failure = outcome
                        .failure
                        .clone()
                        .unwrap_or_else(|| AttemptFailure::transient("运行器未给出失败原因"));
                    let next = next_status_after_failure(item, &failure, max_attempts);
                    item.last_error = Some(failure);
                    next
                };

                transition(item, next)?;
                let updated = item.clone();
                state.records.push(record);
                Ok(updated)
            })
            .await?;

        Ok(item)
    }

    /// 因平台熔断而跳过已认领的条目（不计入尝试次数）
    pub async fn mark_skipped(&self, id: Uuid, platform: Platform) -> Result<QueueItem, QueueError> {
        self.store
            .mutate(|state| {
                let item = find_mut(state, id)?;
                transition(item, QueueStatus::Skipped)?;
                item.last_error = Some(AttemptFailure::PlatformSuspended { platform });
                Ok(item.clone())
            })
            .await
    }

    /// 人工排除 pending 条目
    pub async fn exclude(&self, id: Uuid, reason: impl Into<String>) -> Result<QueueItem, QueueError> {
        let reason = reason.into();
        self.store
            .mutate(|state| {
                let item = find_mut(state, id)?;
                transition(item, QueueStatus::Skipped)?;
                item.excluded_reason = Some(reason);
                Ok(item.clone())
            })
            .await
    }

    /// 崩溃恢复：启动时把所有 in_progress 条目放回 pending，尝试次数保持不变
    ///
    /// 必须在任何 worker 开始之前调用。
    pub async fn recover_in_flight(&self) -> Result<Vec<QueueItem>, QueueError> {
        let recovered = self
            .store
            .mutate(|state| {
                let mut recovered = Vec::new();
                for item in state
                    .items
                    .iter_mut()
                    .filter(|i| i.status == QueueStatus::InProgress)
                {
                    transition(item, QueueStatus::Pending)?;
                    item.last_error = Some(AttemptFailure::transient("进程中断，上次尝试未完成"));
                    recovered.push(item.clone());
                }
                Ok::<_, QueueError>(recovered)
            })
            .await?;

        for item in &recovered {
            warn!(
                "[投递 {}] ♻️ 上次运行中断，已放回 pending (已尝试 {} 次)",
                item.short_id(),
                item.attempt_count
            );
        }
        Ok(recovered)
    }

    /// `getStatus(queueItemId)`
    pub async fn get_status(&self, id: Uuid) -> Result<QueueItem, QueueError> {
        self.store
            .read(|state| state.items.iter().find(|i| i.id == id).cloned())
            .await
            .ok_or(QueueError::ItemNotFound(id))
    }

    /// 某个条目的全部尝试记录（按时间顺序）
    pub async fn attempt_records(&self, id: Uuid) -> Vec<AttemptRecord> {
        self.store
            .read(|state| {
                state
                    .records
                    .iter()
                    .filter(|r| r.item_id == id)
                    .cloned()
                    .collect()
            })
            .await
    }

    pub async fn items(&self) -> Vec<QueueItem> {
        self.store.read(|state| state.items.clone()).await
    }

    /// 有 pending 条目的平台
    pub async fn platforms_with_pending(&self) -> Vec<Platform> {
        let mut platforms: Vec<Platform> = self
            .store
            .read(|state| {
                state
                    .items
                    .iter()
                    .filter(|i| i.status == QueueStatus::Pending)
                    .map(|i| i.platform)
                    .collect()
            })
            .await;
        platforms.sort();
        platforms.dedup();
        platforms
    }
}

/// 失败后的下一个状态
///
/// - TransientFailure / FormStructureChanged：预算内回到 pending
/// - UnresolvedField：只重试一次，给操作者一次补录答案的机会
/// - 其余：直接 failed
fn next_status_after_failure(item: &mut QueueItem, failure: &AttemptFailure, max_attempts: u32) -> QueueStatus {
    let budget_left = item.attempt_count < max_attempts;
    match failure.kind() {
        FailureKind::TransientFailure | FailureKind::FormStructureChanged if budget_left => {
            QueueStatus::Pending
        }
        FailureKind::UnresolvedField if budget_left && item.unresolved_retries == 0 => {
            item.unresolved_retries += 1;
            QueueStatus::Pending
        }
        _ => QueueStatus::Failed,
    }
}

fn oldest_pending<'a>(
    state: &'a PersistedState,
    platform: Platform,
    exclude: &HashSet<Uuid>,
) -> Option<&'a QueueItem> {
    state
        .items
        .iter()
        .filter(|i| i.platform == platform && i.status == QueueStatus::Pending)
        .filter(|i| !exclude.contains(&i.id))
        .min_by_key(|i| (i.created_at, i.sequence))
}

fn find_mut(state: &mut PersistedState, id: Uuid) -> Result<&mut QueueItem, QueueError> {
    state
        .items
        .iter_mut()
        .find(|i| i.id == id)
        .ok_or(QueueError::ItemNotFound(id))
}

fn transition(item: &mut QueueItem, next: QueueStatus) -> Result<(), QueueError> {
    if !item.status.can_transition_to(next) {
        return Err(QueueError::InvalidTransition {
            id: item.id,
            from: item.status,
            to: next,
        });
    }
    item.status = next;
    Ok(())
}
