use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::QueueError;

/// ATS 平台枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Greenhouse（单页表单）
    Greenhouse,
    /// Workday（多步向导）
    Workday,
}

impl Platform {
    /// 所有已支持的平台
    pub const ALL: [Platform; 2] = [Platform::Greenhouse, Platform::Workday];

    /// 获取平台代码（用于持久化和配置表键）
    pub fn code(self) -> &'static str {
        match self {
            Platform::Greenhouse => "greenhouse",
            Platform::Workday => "workday",
        }
    }

    /// 获取展示名称
    pub fn name(self) -> &'static str {
        match self {
            Platform::Greenhouse => "Greenhouse",
            Platform::Workday => "Workday",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Platform {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        Platform::ALL
            .into_iter()
            .find(|p| p.code() == lowered)
            .ok_or_else(|| QueueError::UnknownPlatform(s.to_string()))
    }
}
