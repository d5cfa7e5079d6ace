//! 答案解析服务 - 业务能力层
//!
//! 只负责"字段签名 → 答案"的查找，纯内存、无副作用。
//!
//! 查找顺序：
//! 1. 平台专属签名精确匹配
//! 2. 全局签名精确匹配
//! 3. 归一化匹配（忽略大小写和标点），先平台专属后全局
//! 4. 未解析
//!
//! 未解析时绝不编造答案，由调用方决定是否停止本次尝试。

use std::collections::HashMap;

use tracing::warn;

use crate::models::{normalize_signature, AnswerEntry, AnswerScope, Platform};

/// 命中的层级
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchTier {
    PlatformExact,
    GlobalExact,
    PlatformNormalized,
    GlobalNormalized,
}

/// 查找结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved { value: String, tier: MatchTier },
    Unresolved,
}

impl Resolution {
    pub fn value(&self) -> Option<&str> {
        match self {
            Resolution::Resolved { value, .. } => Some(value),
            Resolution::Unresolved => None,
        }
    }
}

/// 答案解析器
///
/// 每轮运行加载一次答案库，运行期间不可变。
#[derive(Debug, Default)]
pub struct AnswerResolver {
    platform_exact: HashMap<(Platform, String), String>,
    global_exact: HashMap<String, String>,
    platform_normalized: HashMap<(Platform, String), String>,
    global_normalized: HashMap<String, String>,
}

impl AnswerResolver {
    pub fn new(entries: impl IntoIterator<Item = AnswerEntry>) -> Self {
        let mut resolver = Self::default();

        for entry in entries {
            let normalized = normalize_signature(&entry.signature);
            match entry.scope {
                AnswerScope::Platform(platform) => {
                    if !normalized.is_empty() {
                        insert_first(
                            &mut resolver.platform_normalized,
                            (platform, normalized),
                            &entry,
                        );
                    }
                    insert_first(
                        &mut resolver.platform_exact,
                        (platform, entry.signature.clone()),
                        &entry,
                    );
                }
                AnswerScope::Global => {
                    if !normalized.is_empty() {
                        insert_first(&mut resolver.global_normalized, normalized, &entry);
                    }
                    insert_first(&mut resolver.global_exact, entry.signature.clone(), &entry);
                }
            }
        }

        resolver
    }

    /// 为某个平台上的字段签名查找答案
    pub fn resolve(&self, signature: &str, platform: Platform) -> Resolution {
        if let Some(value) = self.platform_exact.get(&(platform, signature.to_string())) {
            return resolved(value, MatchTier::PlatformExact);
        }
        if let Some(value) = self.global_exact.get(signature) {
            return resolved(value, MatchTier::GlobalExact);
        }

        let normalized = normalize_signature(signature);
        if normalized.is_empty() {
            return Resolution::Unresolved;
        }
        if let Some(value) = self.platform_normalized.get(&(platform, normalized.clone())) {
            return resolved(value, MatchTier::PlatformNormalized);
        }
        if let Some(value) = self.global_normalized.get(&normalized) {
            return resolved(value, MatchTier::GlobalNormalized);
        }

        Resolution::Unresolved
    }

    /// 已加载的签名数量（精确键）
    pub fn len(&self) -> usize {
        self.platform_exact.len() + self.global_exact.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn resolved(value: &str, tier: MatchTier) -> Resolution {
    Resolution::Resolved {
        value: value.to_string(),
        tier,
    }
}

/// 同一个键只保留第一次出现的答案，冲突时告警
fn insert_first<K>(map: &mut HashMap<K, String>, key: K, entry: &AnswerEntry)
where
    K: std::hash::Hash + Eq,
{
    match map.get(&key) {
        Some(existing) if *existing != entry.value => {
            warn!(
                "答案库中签名 '{}' 存在冲突的答案，保留先出现的值",
                entry.signature
            );
        }
        Some(_) => {}
        None => {
            map.insert(key, entry.value.clone());
        }
    }
}
