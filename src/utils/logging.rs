//! 日志工具模块
//!
//! 提供日志初始化、格式化和输出的辅助函数

use std::fs;

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::models::{BatchSummary, QueueStatus};

/// 初始化 tracing 订阅者
///
/// 优先使用 `RUST_LOG`，否则默认 info（verbose 时为 debug）
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    // 重复初始化（例如测试中）时忽略
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 初始化日志文件
pub fn init_log_file(log_file_path: &str) -> Result<()> {
    let log_header = format!(
        "{}\n自动投递日志 - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header)
        .with_context(|| format!("无法写入日志文件: {}", log_file_path))?;
    Ok(())
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 自动投递模式");
    info!(
        "📊 每轮上限: {} 个，每平台并发: {}",
        config.max_items, config.per_platform_concurrency
    );
    info!(
        "🛡️ 最多尝试 {} 次，连续失败 {} 次熔断，冷却 {} 秒",
        config.max_attempts, config.breaker_threshold, config.breaker_cooldown_secs
    );
    info!("{}", "=".repeat(60));
}

/// 打印本轮汇总
///
/// 熔断的平台放在最前面单独提示，soft 条目单独列出等待人工确认
pub fn print_summary(summary: &BatchSummary, log_file_path: &str) {
    info!("\n{}", "=".repeat(60));
    info!("📊 本轮投递完成统计");
    info!(
        "完成时间: {} (耗时 {:.1} 秒)",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        summary.elapsed().as_secs_f64()
    );
    info!("{}", "=".repeat(60));

    if !summary.tripped_platforms().is_empty() {
        let names: Vec<&str> = summary.tripped_platforms().iter().map(|p| p.name()).collect();
        error!("🚨 以下平台已熔断，本轮暂停投递: {}", names.join(", "));
        info!("{}", "-".repeat(60));
    }

    info!("✅ 已验证投递: {}", summary.count(QueueStatus::AppliedVerified));
    info!("⚠️ 待人工确认: {}", summary.count(QueueStatus::AppliedSoft));
    info!("🔁 稍后重试: {}", summary.count(QueueStatus::Pending));
    info!("❌ 失败: {}", summary.count(QueueStatus::Failed));
    info!("⏭️ 跳过: {}", summary.count(QueueStatus::Skipped));
    info!("合计: {}", summary.total());

    let failures: Vec<_> = summary
        .failures()
        .filter(|o| o.status != QueueStatus::AppliedSoft)
        .collect();
    if !failures.is_empty() {
        info!("{}", "-".repeat(60));
        info!("失败明细:");
        for outcome in failures {
            let reason = outcome
                .error
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default();
            warn!(
                "  [{}] {} ({}, 已尝试 {} 次): {}",
                outcome.platform,
                outcome.job_id,
                outcome.status,
                outcome.attempt_count,
                truncate_text(&reason, 120)
            );
        }
    }

    let review: Vec<_> = summary.needs_review().collect();
    if !review.is_empty() {
        info!("{}", "-".repeat(60));
        info!("需要人工确认的投递（运行器报告成功，但没有确认证据）:");
        for outcome in review {
            warn!("  [{}] {}", outcome.platform, outcome.job_id);
        }
    }

    info!("{}", "=".repeat(60));
    info!("\n日志已保存至: {}", log_file_path);
}

/// 截断长文本用于日志显示
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_counts_characters_not_bytes() {
        assert_eq!(truncate_text("表单结构变化", 4), "表单结构...");
        assert_eq!(truncate_text("short", 10), "short");
    }

    #[test]
    fn log_file_gets_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");
        let path = path.to_str().unwrap();
        init_log_file(path).unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("自动投递日志"));
    }
}
