use serde::{Deserialize, Serialize};

use crate::models::Platform;

/// 答案作用域
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnswerScope {
    /// 全局默认
    Global,
    /// 平台专属，优先于全局
    Platform(Platform),
}

/// 某类表单字段的已知答案
///
/// 只能来源于操作者维护的答案库，从不由内容生成填充。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerEntry {
    /// 字段签名（字段 label / name）
    pub signature: String,
    pub value: String,
    pub scope: AnswerScope,
}

impl AnswerEntry {
    pub fn global(signature: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            signature: signature.into(),
            value: value.into(),
            scope: AnswerScope::Global,
        }
    }

    pub fn for_platform(
        platform: Platform,
        signature: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            signature: signature.into(),
            value: value.into(),
            scope: AnswerScope::Platform(platform),
        }
    }
}

/// 签名归一化：忽略大小写，去掉所有标点、下划线和空白
///
/// `"LinkedIn URL"`、`"linkedin_url"`、`"LinkedIn-URL:"` 归一化后都是 `"linkedinurl"`。
pub fn normalize_signature(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}
