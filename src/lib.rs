//! # Auto Apply
//!
//! 一个用于自动投递 ATS 职位申请的 Rust 应用程序
//!
//! ## 架构设计
//!
//! 本系统采用严格的分层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源，只暴露能力
//! - `JsExecutor` - 页面的唯一 owner，提供 eval() 能力
//! - `StateStore` - 队列、平台健康、尝试记录的唯一持久化来源
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单个条目
//! - `AnswerResolver` - 字段签名 → 答案
//! - `Verifier` - 独立验证提交是否被平台接受
//! - `CircuitBreaker` - 按平台熔断
//! - `QueueManager` - 持久化队列状态机
//! - `UnresolvedWriter` - 记录未解析字段
//!
//! ### ③ 平台适配层（Runners）
//! - `runners/` - 每个 ATS 平台一个 `PlatformRunner` 实现
//!
//! ### ④ 流程层（Workflow）
//! - `ApplicationFlow` - 单次投递尝试（打开 → 填写 → 翻页 → 提交 → 读取信号）
//!
//! ### ⑤ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 批量投递编排器，管理并发、熔断和汇总
//! - `orchestrator/app` - 进程装配
//!
//! ## 模块结构

pub mod browser;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod orchestrator;
pub mod runners;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use browser::{BrowserSession, SessionFactory};
pub use config::Config;
pub use error::{AppError, AppResult, AttemptFailure};
pub use infrastructure::StateStore;
pub use models::{BatchSummary, JobRef, Platform, QueueItem, QueueStatus};
pub use orchestrator::{App, BatchOrchestrator, BatchSettings};
pub use runners::{PlatformRunner, RunnerRegistry};
pub use services::{AnswerResolver, CircuitBreaker, QueueManager, Verifier};
pub use workflow::ApplicationFlow;
