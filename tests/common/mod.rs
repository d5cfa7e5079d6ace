//! 集成测试共用的脚本化运行器和会话

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use auto_apply::browser::{BrowserSession, SessionFactory};
use auto_apply::error::{AttemptFailure, BrowserError};
use auto_apply::models::{FieldKind, FormField, JobRef, Platform};
use auto_apply::runners::{DocumentSlot, Documents, PlatformRunner, ResultSignal, RunnerError, RunnerRegistry};
use auto_apply::services::{AnswerResolver, CircuitBreaker, QueueManager, UnresolvedWriter, Verifier};
use auto_apply::workflow::ApplicationFlow;
use auto_apply::{BatchOrchestrator, BatchSettings, StateStore};

/// 某个职位在运行器里的表现
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// 提交后跳转到确认页
    Confirm,
    /// 提交后停在普通页面
    Soft,
    /// 导航时连接被重置
    Transient,
    /// 平台拒绝
    Reject,
    /// 有一个答案库里没有的必填字段
    Unresolved,
    /// 卡住不返回
    Hang,
}

/// 会话只记录 URL，其它操作都成功
pub struct FakeSession {
    url: String,
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        self.url = url.to_string();
        Ok(())
    }

    async fn list_fields(&mut self) -> Result<Vec<FormField>, BrowserError> {
        Ok(Vec::new())
    }

    async fn fill_field(&mut self, _selector: &str, _value: &str) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn upload_file(&mut self, _selector: &str, _path: &Path) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn click(&mut self, _selector: &str) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn submit(&mut self) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String, BrowserError> {
        Ok(self.url.clone())
    }

    async fn read_marker(&mut self, _selector: &str) -> Result<Option<String>, BrowserError> {
        Ok(None)
    }

    async fn close(self: Box<Self>) -> Result<(), BrowserError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeSessionFactory {
    pub opened: AtomicUsize,
    pub closed: Arc<AtomicUsize>,
}

#[async_trait]
impl SessionFactory for FakeSessionFactory {
    async fn open(&self) -> Result<Box<dyn BrowserSession>, BrowserError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            url: "about:blank".to_string(),
            closed: self.closed.clone(),
        }))
    }
}

/// 按申请地址查表决定行为的运行器
pub struct ScriptedRunner {
    platform: Platform,
    behaviors: HashMap<String, Behavior>,
    pub navigations: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            behaviors: HashMap::new(),
            navigations: Mutex::new(Vec::new()),
        }
    }

    pub fn with(mut self, job: &JobRef, behavior: Behavior) -> Self {
        self.behaviors.insert(job.apply_url.clone(), behavior);
        self
    }

    pub fn attempts_for(&self, job: &JobRef) -> usize {
        self.navigations
            .lock()
            .unwrap()
            .iter()
            .filter(|url| **url == job.apply_url)
            .count()
    }

    fn behavior(&self, url: &str) -> Behavior {
        self.behaviors.get(url).copied().unwrap_or(Behavior::Confirm)
    }

    fn confirmation_url(&self, url: &str) -> String {
        match self.platform {
            Platform::Greenhouse => format!("{}/confirmation", url),
            Platform::Workday => format!("{}/applicationSubmitted", url),
        }
    }
}

#[async_trait]
impl PlatformRunner for ScriptedRunner {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn navigate_to_form(
        &self,
        session: &mut dyn BrowserSession,
        job: &JobRef,
    ) -> Result<(), RunnerError> {
        self.navigations.lock().unwrap().push(job.apply_url.clone());
        match self.behavior(&job.apply_url) {
            Behavior::Transient => {
                return Err(BrowserError::transport("导航", "net::ERR_CONNECTION_RESET").into())
            }
            Behavior::Hang => tokio::time::sleep(Duration::from_secs(30)).await,
            _ => {}
        }
        session.navigate(&job.apply_url).await?;
        Ok(())
    }

    async fn enumerate_fields(
        &self,
        session: &mut dyn BrowserSession,
    ) -> Result<Vec<FormField>, RunnerError> {
        let url = session.current_url().await?;
        let mut fields = vec![FormField {
            selector: "#email".to_string(),
            name: "email".to_string(),
            label: "Email".to_string(),
            kind: FieldKind::Text,
            required: true,
            current_value: None,
        }];
        if self.behavior(&url) == Behavior::Unresolved {
            fields.push(FormField {
                selector: "#salary".to_string(),
                name: "salary_expectation".to_string(),
                label: "Salary expectation".to_string(),
                kind: FieldKind::Text,
                required: true,
                current_value: None,
            });
        }
        Ok(fields)
    }

    fn document_slot(&self, _field: &FormField) -> Option<DocumentSlot> {
        None
    }

    async fn next_page(&self, _session: &mut dyn BrowserSession) -> Result<bool, RunnerError> {
        Ok(false)
    }

    async fn submit(&self, session: &mut dyn BrowserSession) -> Result<(), RunnerError> {
        let url = session.current_url().await?;
        match self.behavior(&url) {
            Behavior::Confirm => session.navigate(&self.confirmation_url(&url)).await?,
            Behavior::Reject => {
                return Err(AttemptFailure::SubmissionRejected {
                    reason: "captcha".to_string(),
                }
                .into())
            }
            _ => session.navigate(&format!("{}/thanks-maybe", url)).await?,
        }
        Ok(())
    }

    async fn read_result_signal(
        &self,
        _session: &mut dyn BrowserSession,
    ) -> Result<ResultSignal, RunnerError> {
        Ok(ResultSignal::Unknown)
    }
}

pub fn job(platform: Platform, id: &str) -> JobRef {
    let host = match platform {
        Platform::Greenhouse => "https://boards.greenhouse.io/acme/jobs",
        Platform::Workday => "https://acme.wd5.myworkdayjobs.com/en-US/careers/job",
    };
    JobRef::new(id, format!("{}/{}", host, id))
}

pub fn resolver() -> AnswerResolver {
    AnswerResolver::new(vec![auto_apply::models::AnswerEntry::global(
        "email",
        "ada@example.com",
    )])
}

/// 引擎各部件的测试装配
pub struct Harness {
    pub store: Arc<StateStore>,
    pub queue: Arc<QueueManager>,
    pub breaker: Arc<CircuitBreaker>,
    pub sessions: Arc<FakeSessionFactory>,
    pub orchestrator: BatchOrchestrator,
    pub unresolved_path: std::path::PathBuf,
    pub dir: tempfile::TempDir,
}

pub struct HarnessOptions {
    pub max_attempts: u32,
    pub threshold: u32,
    pub cooldown: Duration,
    pub settings: BatchSettings,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            threshold: 3,
            cooldown: Duration::from_secs(900),
            settings: BatchSettings {
                attempt_timeout: Duration::from_secs(5),
                suspension_wait: Duration::ZERO,
                skip_when_suspended: true,
            },
        }
    }
}

impl Harness {
    pub fn new(runners: Vec<Arc<ScriptedRunner>>, options: HarnessOptions) -> Self {
        Self::with_store(Arc::new(StateStore::in_memory()), runners, options)
    }

    pub fn with_store(
        store: Arc<StateStore>,
        runners: Vec<Arc<ScriptedRunner>>,
        options: HarnessOptions,
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let unresolved_path = dir.path().join("unresolved.txt");

        let queue = Arc::new(QueueManager::new(store.clone(), options.max_attempts));
        let breaker = Arc::new(CircuitBreaker::new(store.clone(), options.threshold, options.cooldown));
        let flow = Arc::new(ApplicationFlow::new(
            Arc::new(resolver()),
            Documents::new(dir.path().join("resume.pdf"), None),
            Arc::new(UnresolvedWriter::with_path(&unresolved_path)),
        ));

        let mut registry = RunnerRegistry::new();
        for runner in runners {
            registry.register(runner);
        }

        let sessions = Arc::new(FakeSessionFactory::default());
        let orchestrator = BatchOrchestrator::new(
            queue.clone(),
            breaker.clone(),
            Arc::new(Verifier::new()),
            flow,
            registry,
            sessions.clone(),
            options.settings,
        );

        Self {
            store,
            queue,
            breaker,
            sessions,
            orchestrator,
            unresolved_path,
            dir,
        }
    }
}
