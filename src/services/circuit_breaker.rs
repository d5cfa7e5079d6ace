//! 熔断服务 - 业务能力层
//!
//! 按平台跟踪健康状态。连续失败达到阈值后熔断，冷却结束进入半开，
//! 半开状态只放行一次试探：成功则闭合并清零，失败则重新熔断并以相同时长重新冷却。
//!
//! 所有读改写都在 StateStore 的锁内完成，并发结果不会互相覆盖失败计数。

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::error::{AttemptFailure, FailureKind, StoreError};
use crate::infrastructure::StateStore;
use crate::models::{BreakerState, Confidence, Platform, PlatformHealth};

/// `permit(platform)` 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permit {
    /// 闭合，正常放行
    Allowed,
    /// 半开，放行唯一一次试探
    Trial,
    /// 半开，但试探正在进行
    TrialInFlight,
    /// 熔断中
    Denied { retry_after: Duration },
}

impl Permit {
    pub fn is_allowed(self) -> bool {
        matches!(self, Permit::Allowed | Permit::Trial)
    }
}

/// 向熔断器报告的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerSignal {
    /// hard 验证成功
    Success,
    /// 平台侧失败
    Failure,
    /// 与平台健康无关（字段缺答案、soft 成功等），只释放试探名额
    Neutral,
}

impl BreakerSignal {
    /// 根据尝试结果推导信号
    pub fn from_attempt(confidence: Confidence, failure: Option<&AttemptFailure>) -> Self {
        match failure.map(AttemptFailure::kind) {
            None if confidence == Confidence::Hard => BreakerSignal::Success,
            None => BreakerSignal::Neutral,
            Some(
                FailureKind::UnresolvedField
                | FailureKind::VerificationInconclusive
                | FailureKind::PlatformSuspended,
            ) => BreakerSignal::Neutral,
            Some(_) => BreakerSignal::Failure,
        }
    }
}

/// 一次 record 前后的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerTransition {
    pub before: BreakerState,
    pub after: BreakerState,
}

impl BreakerTransition {
    /// 本次记录导致熔断（含半开试探失败后的重新熔断）
    pub fn tripped(&self) -> bool {
        self.after == BreakerState::Open && self.before != BreakerState::Open
    }
}

/// 熔断器
pub struct CircuitBreaker {
    store: Arc<StateStore>,
    threshold: u32,
    cooldown: Duration,
}

impl CircuitBreaker {
    pub fn new(store: Arc<StateStore>, threshold: u32, cooldown: Duration) -> Self {
        Self {
            store,
            threshold,
            cooldown,
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub async fn permit(&self, platform: Platform) -> Result<Permit, StoreError> {
        self.permit_at(platform, Utc::now()).await
    }

    pub async fn permit_at(&self, platform: Platform, now: DateTime<Utc>) -> Result<Permit, StoreError> {
        let threshold = self.threshold;
        let cooldown_secs = self.cooldown.as_secs();
        self.store
            .mutate(|state| {
                let health = state
                    .health
                    .entry(platform)
                    .or_insert_with(|| PlatformHealth::new(platform, cooldown_secs));
                health.state = health.state_at(now, threshold);

                let permit = match health.state {
                    BreakerState::Closed => Permit::Allowed,
                    BreakerState::Open => Permit::Denied {
                        retry_after: health
                            .reopens_at()
                            .and_then(|at| (at - now).to_std().ok())
                            .unwrap_or_default(),
                    },
                    BreakerState::HalfOpen if health.trial_in_flight => Permit::TrialInFlight,
                    BreakerState::HalfOpen => {
                        health.trial_in_flight = true;
                        Permit::Trial
                    }
                };
                Ok::<_, StoreError>(permit)
            })
            .await
    }

    /// 记录普通尝试的结果，不会释放半开试探名额
    pub async fn record(
        &self,
        platform: Platform,
        signal: BreakerSignal,
    ) -> Result<BreakerTransition, StoreError> {
        self.apply(platform, signal, false, Utc::now()).await
    }

    pub async fn record_at(
        &self,
        platform: Platform,
        signal: BreakerSignal,
        now: DateTime<Utc>,
    ) -> Result<BreakerTransition, StoreError> {
        self.apply(platform, signal, false, now).await
    }

    /// 记录持有 [`Permit::Trial`] 的那次尝试的结果，并释放试探名额
    pub async fn record_trial(
        &self,
        platform: Platform,
        signal: BreakerSignal,
    ) -> Result<BreakerTransition, StoreError> {
        self.apply(platform, signal, true, Utc::now()).await
    }

    pub async fn record_trial_at(
        &self,
        platform: Platform,
        signal: BreakerSignal,
        now: DateTime<Utc>,
    ) -> Result<BreakerTransition, StoreError> {
        self.apply(platform, signal, true, now).await
    }

    async fn apply(
        &self,
        platform: Platform,
        signal: BreakerSignal,
        trial: bool,
        now: DateTime<Utc>,
    ) -> Result<BreakerTransition, StoreError> {
        let threshold = self.threshold;
        let cooldown_secs = self.cooldown.as_secs();
        let transition = self
            .store
            .mutate(|state| {
                let health = state
                    .health
                    .entry(platform)
                    .or_insert_with(|| PlatformHealth::new(platform, cooldown_secs));
                let before = health.state_at(now, threshold);
                let was_trial = trial && health.trial_in_flight;
                if trial {
                    health.trial_in_flight = false;
                }

                match signal {
                    BreakerSignal::Success => {
                        health.consecutive_failures = 0;
                        health.tripped_at = None;
                    }
                    BreakerSignal::Failure => {
                        health.consecutive_failures = health.consecutive_failures.saturating_add(1);
                        let newly_tripped =
                            health.consecutive_failures >= threshold && health.tripped_at.is_none();
                        // 试探失败：重新熔断，冷却时长不变
                        if newly_tripped || (was_trial && before == BreakerState::HalfOpen) {
                            health.tripped_at = Some(now);
                            health.cooldown_secs = cooldown_secs;
                        }
                    }
                    BreakerSignal::Neutral => {}
                }

                health.state = health.state_at(now, threshold);
                Ok::<_, StoreError>(BreakerTransition {
                    before,
                    after: health.state,
                })
            })
            .await?;

        if transition.tripped() {
            warn!("🔌 平台 {} 已熔断，冷却 {} 秒", platform, self.cooldown.as_secs());
        } else if transition.before != BreakerState::Closed && transition.after == BreakerState::Closed {
            info!("✓ 平台 {} 熔断恢复", platform);
        }

        Ok(transition)
    }

    /// 进程启动时清理崩溃前遗留的试探占位
    pub async fn recover_trials(&self) -> Result<usize, StoreError> {
        self.store
            .mutate(|state| {
                let mut released = 0;
                for health in state.health.values_mut() {
                    if health.trial_in_flight {
                        health.trial_in_flight = false;
                        released += 1;
                    }
                }
                Ok::<_, StoreError>(released)
            })
            .await
    }

    pub async fn state(&self, platform: Platform) -> BreakerState {
        let now = Utc::now();
        self.store
            .read(|state| {
                state
                    .health
                    .get(&platform)
                    .map(|h| h.state_at(now, self.threshold))
                    .unwrap_or(BreakerState::Closed)
            })
            .await
    }

    pub async fn health(&self, platform: Platform) -> Option<PlatformHealth> {
        self.store.read(|state| state.health.get(&platform).cloned()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(Arc::new(StateStore::in_memory()), 3, Duration::from_secs(600))
    }

    async fn fail_times(b: &CircuitBreaker, platform: Platform, n: usize, now: DateTime<Utc>) {
        for _ in 0..n {
            b.record_at(platform, BreakerSignal::Failure, now).await.unwrap();
        }
    }

    #[tokio::test]
    async fn three_failures_open_the_breaker() {
        let b = breaker();
        let now = Utc::now();
        fail_times(&b, Platform::Greenhouse, 2, now).await;
        assert_eq!(b.permit_at(Platform::Greenhouse, now).await.unwrap(), Permit::Allowed);

        let t = b
            .record_at(Platform::Greenhouse, BreakerSignal::Failure, now)
            .await
            .unwrap();
        assert!(t.tripped());
        assert!(matches!(
            b.permit_at(Platform::Greenhouse, now).await.unwrap(),
            Permit::Denied { .. }
        ));
        assert_eq!(b.permit_at(Platform::Workday, now).await.unwrap(), Permit::Allowed);
    }

    #[tokio::test]
    async fn neutral_signals_do_not_count() {
        let b = breaker();
        let now = Utc::now();
        fail_times(&b, Platform::Greenhouse, 2, now).await;
        b.record_at(Platform::Greenhouse, BreakerSignal::Neutral, now).await.unwrap();
        assert_eq!(b.permit_at(Platform::Greenhouse, now).await.unwrap(), Permit::Allowed);
        assert_eq!(b.health(Platform::Greenhouse).await.unwrap().consecutive_failures, 2);
    }

    #[tokio::test]
    async fn success_resets_failure_count() {
        let b = breaker();
        let now = Utc::now();
        fail_times(&b, Platform::Greenhouse, 2, now).await;
        b.record_at(Platform::Greenhouse, BreakerSignal::Success, now).await.unwrap();
        fail_times(&b, Platform::Greenhouse, 2, now).await;
        assert_eq!(b.permit_at(Platform::Greenhouse, now).await.unwrap(), Permit::Allowed);
    }

    #[tokio::test]
    async fn half_open_allows_exactly_one_trial() {
        let b = breaker();
        let now = Utc::now();
        fail_times(&b, Platform::Greenhouse, 3, now).await;

        let later = now + ChronoDuration::seconds(601);
        assert_eq!(b.permit_at(Platform::Greenhouse, later).await.unwrap(), Permit::Trial);
        assert_eq!(
            b.permit_at(Platform::Greenhouse, later).await.unwrap(),
            Permit::TrialInFlight
        );

        b.record_trial_at(Platform::Greenhouse, BreakerSignal::Success, later)
            .await
            .unwrap();
        assert_eq!(b.permit_at(Platform::Greenhouse, later).await.unwrap(), Permit::Allowed);
        assert_eq!(b.health(Platform::Greenhouse).await.unwrap().consecutive_failures, 0);
    }

    #[tokio::test]
    async fn failed_trial_reopens_with_same_cooldown() {
        let b = breaker();
        let now = Utc::now();
        fail_times(&b, Platform::Greenhouse, 3, now).await;

        let later = now + ChronoDuration::seconds(601);
        assert_eq!(b.permit_at(Platform::Greenhouse, later).await.unwrap(), Permit::Trial);
        let t = b
            .record_trial_at(Platform::Greenhouse, BreakerSignal::Failure, later)
            .await
            .unwrap();
        assert!(t.tripped());

        match b.permit_at(Platform::Greenhouse, later).await.unwrap() {
            Permit::Denied { retry_after } => assert_eq!(retry_after, Duration::from_secs(600)),
            other => panic!("expected denied, got {:?}", other),
        }
        let health = b.health(Platform::Greenhouse).await.unwrap();
        assert_eq!(health.tripped_at, Some(later));
        assert_eq!(health.cooldown_secs, 600);
    }

    #[tokio::test]
    async fn late_failures_while_open_do_not_extend_cooldown() {
        let b = breaker();
        let now = Utc::now();
        fail_times(&b, Platform::Greenhouse, 3, now).await;
        let a_bit_later = now + ChronoDuration::seconds(10);
        b.record_at(Platform::Greenhouse, BreakerSignal::Failure, a_bit_later)
            .await
            .unwrap();
        assert_eq!(b.health(Platform::Greenhouse).await.unwrap().tripped_at, Some(now));
    }

    #[tokio::test]
    async fn late_outcome_of_other_attempt_keeps_trial_slot() {
        let b = breaker();
        let now = Utc::now();
        fail_times(&b, Platform::Greenhouse, 3, now).await;
        let later = now + ChronoDuration::seconds(601);
        assert_eq!(b.permit_at(Platform::Greenhouse, later).await.unwrap(), Permit::Trial);

        // 熔断前就开始的尝试此刻才结束
        b.record_at(Platform::Greenhouse, BreakerSignal::Failure, later)
            .await
            .unwrap();
        assert_eq!(
            b.permit_at(Platform::Greenhouse, later).await.unwrap(),
            Permit::TrialInFlight
        );
        assert!(b.health(Platform::Greenhouse).await.unwrap().trial_in_flight);

        b.record_trial_at(Platform::Greenhouse, BreakerSignal::Neutral, later)
            .await
            .unwrap();
        assert_eq!(b.permit_at(Platform::Greenhouse, later).await.unwrap(), Permit::Trial);
    }

    #[tokio::test]
    async fn recover_releases_stale_trial() {
        let b = breaker();
        let now = Utc::now();
        fail_times(&b, Platform::Greenhouse, 3, now).await;
        let later = now + ChronoDuration::seconds(601);
        assert_eq!(b.permit_at(Platform::Greenhouse, later).await.unwrap(), Permit::Trial);

        assert_eq!(b.recover_trials().await.unwrap(), 1);
        assert_eq!(b.permit_at(Platform::Greenhouse, later).await.unwrap(), Permit::Trial);
    }

    #[test]
    fn signal_mapping() {
        let unresolved = AttemptFailure::UnresolvedField {
            signature: "salary".to_string(),
        };
        assert_eq!(
            BreakerSignal::from_attempt(Confidence::None, Some(&unresolved)),
            BreakerSignal::Neutral
        );
        assert_eq!(
            BreakerSignal::from_attempt(Confidence::None, Some(&AttemptFailure::transient("x"))),
            BreakerSignal::Failure
        );
        assert_eq!(BreakerSignal::from_attempt(Confidence::Hard, None), BreakerSignal::Success);
        assert_eq!(BreakerSignal::from_attempt(Confidence::Soft, None), BreakerSignal::Neutral);
    }
}
