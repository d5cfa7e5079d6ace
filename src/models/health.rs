use std::fmt;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Platform;

/// 熔断器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakerState::Closed => write!(f, "closed"),
            BreakerState::Open => write!(f, "open"),
            BreakerState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// 单个平台的熔断健康状态
///
/// `state` 只是最近一次计算结果的缓存，真正的状态始终由
/// 连续失败次数和冷却时间推导（见 [`PlatformHealth::state_at`]）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformHealth {
    pub platform: Platform,
    pub consecutive_failures: u32,
    pub state: BreakerState,
    pub tripped_at: Option<DateTime<Utc>>,
    pub cooldown_secs: u64,
    /// 半开状态下的试探尝试是否正在进行
    #[serde(default)]
    pub trial_in_flight: bool,
}

impl PlatformHealth {
    pub fn new(platform: Platform, cooldown_secs: u64) -> Self {
        Self {
            platform,
            consecutive_failures: 0,
            state: BreakerState::Closed,
            tripped_at: None,
            cooldown_secs,
            trial_in_flight: false,
        }
    }

    /// 根据失败次数与冷却时间推导当前状态
    pub fn state_at(&self, now: DateTime<Utc>, threshold: u32) -> BreakerState {
        if self.consecutive_failures < threshold {
            return BreakerState::Closed;
        }
        match self.reopens_at() {
            Some(at) if now < at => BreakerState::Open,
            _ => BreakerState::HalfOpen,
        }
    }

    /// 冷却结束时间，超出可表示范围时停在 `DateTime::MAX_UTC`
    pub fn reopens_at(&self) -> Option<DateTime<Utc>> {
        let cooldown = i64::try_from(self.cooldown_secs)
            .ok()
            .and_then(ChronoDuration::try_seconds);
        self.tripped_at.map(|at| {
            cooldown
                .and_then(|c| at.checked_add_signed(c))
                .unwrap_or(DateTime::<Utc>::MAX_UTC)
        })
    }
}
