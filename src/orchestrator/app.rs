//! 应用入口 - 编排层
//!
//! 进程级装配：配置 → 持久化存储 → 崩溃恢复 → 答案库 → 浏览器 → 批处理 → 汇总

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::browser::{self, ChromeSessionFactory, SessionFactory};
use crate::config::Config;
use crate::infrastructure::StateStore;
use crate::models::{self, BatchSummary};
use crate::orchestrator::{BatchOrchestrator, BatchSettings};
use crate::runners::{Documents, RunnerRegistry};
use crate::services::{AnswerResolver, CircuitBreaker, QueueManager, UnresolvedWriter, Verifier};
use crate::utils::logging;
use crate::workflow::ApplicationFlow;

/// 应用主结构
pub struct App {
    config: Config,
    orchestrator: BatchOrchestrator,
}

impl App {
    /// 初始化应用（连接真实浏览器）
    pub async fn initialize(config: Config) -> Result<Self> {
        config.validate()?;

        // 先确认浏览器可用，再改动持久化状态
        let browser = if config.headless {
            browser::launch_headless_browser(config.chrome_executable.as_deref()).await?
        } else {
            browser::connect_to_browser(config.browser_debug_port).await?
        };
        let sessions: Arc<dyn SessionFactory> = Arc::new(ChromeSessionFactory::new(browser));

        Self::assemble(config, sessions, RunnerRegistry::with_defaults()).await
    }

    /// 使用给定的会话工厂和运行器装配
    pub async fn assemble(
        config: Config,
        sessions: Arc<dyn SessionFactory>,
        registry: RunnerRegistry,
    ) -> Result<Self> {
        config.validate()?;

        // 初始化日志文件
        logging::init_log_file(&config.output_log_file)?;
        logging::log_startup(&config);

        let store = Arc::new(
            StateStore::open(&config.state_file)
                .await
                .with_context(|| format!("无法打开状态文件: {}", config.state_file))?,
        );
        let queue = Arc::new(QueueManager::new(store.clone(), config.max_attempts));
        let breaker = Arc::new(CircuitBreaker::new(
            store,
            config.breaker_threshold,
            config.breaker_cooldown(),
        ));

        // 崩溃恢复：必须在任何 worker 启动之前
        let recovered = queue.recover_in_flight().await?;
        if !recovered.is_empty() {
            warn!("♻️ 恢复了 {} 个上次中断的条目", recovered.len());
        }
        let released = breaker.recover_trials().await?;
        if released > 0 {
            warn!("♻️ 释放了 {} 个未完成的半开试探", released);
        }

        let resolver = Arc::new(load_resolver(&config.answer_bank_file).await?);
        let documents = Documents::new(
            &config.resume_path,
            config.cover_letter_path.as_ref().map(PathBuf::from),
        );
        if !documents.resume.exists() {
            warn!("⚠️ 简历文件不存在: {}", documents.resume.display());
        }

        let flow = Arc::new(ApplicationFlow::new(
            resolver,
            documents,
            Arc::new(UnresolvedWriter::with_path(&config.unresolved_log_file)),
        ));

        let orchestrator = BatchOrchestrator::new(
            queue,
            breaker,
            Arc::new(Verifier::new()),
            flow,
            registry,
            sessions,
            BatchSettings::from_config(&config),
        );

        Ok(Self {
            config,
            orchestrator,
        })
    }

    pub fn orchestrator(&self) -> &BatchOrchestrator {
        &self.orchestrator
    }

    /// 运行应用主逻辑：入队新职位 → 跑一轮 → 输出汇总
    pub async fn run(&self) -> Result<BatchSummary> {
        self.enqueue_seeds().await?;

        let summary = self
            .orchestrator
            .run_batch(self.config.max_items, self.config.per_platform_concurrency)
            .await;

        logging::print_summary(&summary, &self.config.output_log_file);
        Ok(summary)
    }

    /// 扫描职位目录并入队（幂等，重复扫描不会产生重复条目）
    async fn enqueue_seeds(&self) -> Result<usize> {
        if !Path::new(&self.config.jobs_folder).is_dir() {
            info!("📁 职位目录 {} 不存在，只处理已有队列", self.config.jobs_folder);
            return Ok(0);
        }

        info!("\n📁 正在扫描待投递的职位...");
        let seeds = models::load_all_job_seeds(&self.config.jobs_folder).await?;
        let queue = self.orchestrator.queue();
        for seed in &seeds {
            queue.enqueue(seed.job_ref(), seed.platform).await?;
        }
        info!("✓ 扫描到 {} 个职位", seeds.len());
        Ok(seeds.len())
    }
}

/// 加载答案库；文件不存在时使用空答案库（所有必填字段都会停下）
async fn load_resolver(path: &str) -> Result<AnswerResolver> {
    let path = Path::new(path);
    if !path.exists() {
        warn!("⚠️ 答案库 {} 不存在，所有字段都将无法解析", path.display());
        return Ok(AnswerResolver::default());
    }
    let entries = models::load_answer_bank(path).await?;
    let resolver = AnswerResolver::new(entries);
    info!("✓ 答案库已加载: {} 个签名", resolver.len());
    Ok(resolver)
}
