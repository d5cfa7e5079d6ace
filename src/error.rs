use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Platform, QueueStatus};

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 浏览器相关错误
    #[error("浏览器错误: {0}")]
    Browser(#[from] BrowserError),
    /// 持久化存储错误
    #[error("存储错误: {0}")]
    Store(#[from] StoreError),
    /// 队列操作错误
    #[error("队列错误: {0}")]
    Queue(#[from] QueueError),
    /// 文件操作错误
    #[error("文件错误: {0}")]
    File(#[from] FileError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
}

/// 浏览器相关错误
///
/// 除了连接/启动阶段的错误，其余都被视为一次性的传输层失败。
#[derive(Debug, Error)]
pub enum BrowserError {
    /// 连接浏览器失败
    #[error("无法连接到浏览器 (端口: {port}): {source}")]
    ConnectionFailed {
        port: u16,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 启动浏览器失败
    #[error("启动浏览器失败: {0}")]
    LaunchFailed(String),
    /// 创建页面失败
    #[error("创建页面失败: {source}")]
    PageCreationFailed {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 页面操作失败（导航、执行脚本、点击等）
    #[error("{operation} 失败: {detail}")]
    Transport { operation: String, detail: String },
    /// 页面上找不到元素
    #[error("找不到元素: {selector}")]
    ElementNotFound { selector: String },
}

impl BrowserError {
    pub fn transport(operation: impl Into<String>, detail: impl std::fmt::Display) -> Self {
        BrowserError::Transport {
            operation: operation.into(),
            detail: detail.to_string(),
        }
    }
}

impl From<chromiumoxide::error::CdpError> for BrowserError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        BrowserError::transport("CDP 调用", err)
    }
}

/// 持久化存储错误
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("读取状态文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("写入状态文件失败 ({path}): {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("状态文件格式错误 ({path}): {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("状态序列化失败: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// 队列操作错误
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("投递条目不存在: {0}")]
    ItemNotFound(Uuid),
    #[error("非法状态转换 ({id}): {from} -> {to}")]
    InvalidTransition {
        id: Uuid,
        from: QueueStatus,
        to: QueueStatus,
    },
    #[error("条目 {id} 当前为 {status}，没有进行中的尝试可记录")]
    NotInProgress { id: Uuid, status: QueueStatus },
    #[error("未知平台: {0}")]
    UnknownPlatform(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// 文件操作错误
#[derive(Debug, Error)]
pub enum FileError {
    #[error("读取文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("写入文件失败 ({path}): {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("TOML 解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("目录不存在: {path}")]
    DirectoryNotFound { path: String },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("环境变量 {var_name} 取值 '{value}' 无效: {reason}")]
    InvalidValue {
        var_name: String,
        value: String,
        reason: String,
    },
}

/// 单次投递尝试的失败分类
///
/// 这些不是程序错误，而是附着在 QueueItem 上的结果值，决定状态机走向。
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum AttemptFailure {
    /// 答案库中没有该字段，且表单也没有可保留的默认值
    #[error("字段无可用答案: {signature}")]
    UnresolvedField { signature: String },
    /// 预期的字段或步骤不存在（平台可能改版）
    #[error("表单结构变化: {detail}")]
    FormStructureChanged { detail: String },
    /// 平台返回校验失败或拦截信号
    #[error("提交被拒绝: {reason}")]
    SubmissionRejected { reason: String },
    /// 网络/超时类失败，可重试
    #[error("临时失败: {detail}")]
    TransientFailure { detail: String },
    /// 不可重试（例如平台自身的重复投递拦截）
    #[error("不可恢复: {reason}")]
    Unrecoverable { reason: String },
    /// 验证无法达到 hard 或 soft 置信度
    #[error("验证无结论: {detail}")]
    VerificationInconclusive { detail: String },
    /// 熔断器拒绝调度
    #[error("平台已暂停: {platform}")]
    PlatformSuspended { platform: Platform },
}

/// 失败类型（不带明细），用于状态机和熔断器判断
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    UnresolvedField,
    FormStructureChanged,
    SubmissionRejected,
    TransientFailure,
    Unrecoverable,
    VerificationInconclusive,
    PlatformSuspended,
}

impl AttemptFailure {
    pub fn kind(&self) -> FailureKind {
        match self {
            AttemptFailure::UnresolvedField { .. } => FailureKind::UnresolvedField,
            AttemptFailure::FormStructureChanged { .. } => FailureKind::FormStructureChanged,
            AttemptFailure::SubmissionRejected { .. } => FailureKind::SubmissionRejected,
            AttemptFailure::TransientFailure { .. } => FailureKind::TransientFailure,
            AttemptFailure::Unrecoverable { .. } => FailureKind::Unrecoverable,
            AttemptFailure::VerificationInconclusive { .. } => FailureKind::VerificationInconclusive,
            AttemptFailure::PlatformSuspended { .. } => FailureKind::PlatformSuspended,
        }
    }

    pub fn transient(detail: impl Into<String>) -> Self {
        AttemptFailure::TransientFailure {
            detail: detail.into(),
        }
    }

    pub fn structure_changed(detail: impl Into<String>) -> Self {
        AttemptFailure::FormStructureChanged {
            detail: detail.into(),
        }
    }

    /// 浏览器传输层错误统一视为临时失败；
    /// 同一条目上一次尝试以完全相同的错误结束时，视为确定性复现，升级为表单结构变化。
    pub fn from_browser(err: &BrowserError, previous: Option<&AttemptFailure>) -> Self {
        let detail = err.to_string();
        let recurred = matches!(
            previous,
            Some(AttemptFailure::TransientFailure { detail: prev }) if *prev == detail
        );
        match err {
            BrowserError::ElementNotFound { .. } => AttemptFailure::structure_changed(detail),
            _ if recurred => AttemptFailure::structure_changed(format!("重复出现: {}", detail)),
            _ => AttemptFailure::transient(detail),
        }
    }
}

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
