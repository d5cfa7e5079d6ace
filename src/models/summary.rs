use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use crate::error::AttemptFailure;
use crate::models::{Confidence, Platform, QueueStatus};

/// 单个条目在本轮中的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemOutcome {
    pub item_id: Uuid,
    pub job_id: String,
    pub platform: Platform,
    /// 本轮结束时的状态
    pub status: QueueStatus,
    pub attempt_count: u32,
    pub confidence: Option<Confidence>,
    pub error: Option<AttemptFailure>,
}

/// 一轮批处理的汇总，返回后不可变
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    counts: BTreeMap<QueueStatus, usize>,
    outcomes: Vec<ItemOutcome>,
    tripped_platforms: Vec<Platform>,
    elapsed: Duration,
}

impl BatchSummary {
    pub fn new(outcomes: Vec<ItemOutcome>, mut tripped_platforms: Vec<Platform>, elapsed: Duration) -> Self {
        let mut counts = BTreeMap::new();
        for outcome in &outcomes {
            *counts.entry(outcome.status).or_insert(0) += 1;
        }
        tripped_platforms.sort();
        tripped_platforms.dedup();
        Self {
            counts,
            outcomes,
            tripped_platforms,
            elapsed,
        }
    }

    pub fn count(&self, status: QueueStatus) -> usize {
        self.counts.get(&status).copied().unwrap_or(0)
    }

    pub fn counts(&self) -> &BTreeMap<QueueStatus, usize> {
        &self.counts
    }

    pub fn outcomes(&self) -> &[ItemOutcome] {
        &self.outcomes
    }

    /// 本轮中被熔断的平台
    pub fn tripped_platforms(&self) -> &[Platform] {
        &self.tripped_platforms
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    /// 所有带错误的结果（含重试中的条目）
    pub fn failures(&self) -> impl Iterator<Item = &ItemOutcome> {
        self.outcomes.iter().filter(|o| o.error.is_some())
    }

    /// 需要人工确认的 soft 条目
    pub fn needs_review(&self) -> impl Iterator<Item = &ItemOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.status == QueueStatus::AppliedSoft)
    }

    pub fn outcome_for(&self, item_id: Uuid) -> Option<&ItemOutcome> {
        self.outcomes.iter().find(|o| o.item_id == item_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(status: QueueStatus, error: Option<AttemptFailure>) -> ItemOutcome {
        ItemOutcome {
            item_id: Uuid::new_v4(),
            job_id: "job".to_string(),
            platform: Platform::Workday,
            status,
            attempt_count: 1,
            confidence: None,
            error,
        }
    }

    #[test]
    fn counts_by_status_and_dedups_tripped() {
        let summary = BatchSummary::new(
            vec![
                outcome(QueueStatus::AppliedVerified, None),
                outcome(QueueStatus::AppliedSoft, None),
                outcome(QueueStatus::Failed, Some(AttemptFailure::transient("timeout"))),
                outcome(QueueStatus::AppliedVerified, None),
            ],
            vec![Platform::Greenhouse, Platform::Greenhouse],
            Duration::from_secs(3),
        );
        assert_eq!(summary.count(QueueStatus::AppliedVerified), 2);
        assert_eq!(summary.count(QueueStatus::Skipped), 0);
        assert_eq!(summary.failures().count(), 1);
        assert_eq!(summary.needs_review().count(), 1);
        assert_eq!(summary.tripped_platforms(), &[Platform::Greenhouse]);
    }
}
