//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量投递和流程调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `app` - 进程装配
//! - 配置校验、日志文件
//! - 打开持久化存储并做崩溃恢复
//! - 连接浏览器、加载答案库
//! - 入队职位、输出汇总
//!
//! ### `batch_processor` - 批量投递编排器
//! - 按平台启动 worker，控制每轮名额和每平台并发
//! - 在熔断器许可下认领条目
//! - 单次尝试的超时和会话销毁
//! - 汇总本轮结果
//!
//! ## 层次关系
//!
//! ```text
//! app (进程生命周期)
//!     ↓
//! batch_processor (处理一轮队列)
//!     ↓
//! workflow::ApplicationFlow (处理单次尝试)
//!     ↓
//! runners (平台能力：Greenhouse / Workday)
//!     ↓
//! services (能力层：答案 / 验证 / 熔断 / 队列)
//!     ↓
//! infrastructure (基础设施：StateStore、JsExecutor)
//! ```

pub mod app;
pub mod batch_processor;

pub use app::App;
pub use batch_processor::{BatchOrchestrator, BatchSettings};
