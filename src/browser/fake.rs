//! 测试用的脚本化浏览器会话
//!
//! 按"步骤"模拟多页表单：每一步有自己的字段、按钮和 DOM 标记。

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::browser::BrowserSession;
use crate::error::BrowserError;
use crate::models::{FieldKind, FormField};

/// 表单的一步
#[derive(Debug, Clone, Default)]
pub struct FakeStep {
    pub fields: Vec<FormField>,
    pub buttons: Vec<String>,
    pub markers: HashMap<String, String>,
}

impl FakeStep {
    pub fn with_field(mut self, field: FormField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_button(mut self, selector: &str) -> Self {
        self.buttons.push(selector.to_string());
        self
    }

    pub fn with_marker(mut self, selector: &str, text: &str) -> Self {
        self.markers.insert(selector.to_string(), text.to_string());
        self
    }
}

/// 会话操作日志，测试在会话被消费后仍可检查
#[derive(Debug, Default)]
pub struct SessionLog {
    pub navigations: Vec<String>,
    pub filled: Vec<(String, String)>,
    pub uploads: Vec<(String, PathBuf)>,
    pub clicks: Vec<String>,
    pub submits: u32,
    pub closed: bool,
}

pub fn field(name: &str, kind: FieldKind, required: bool) -> FormField {
    FormField {
        selector: format!("#{}", name),
        name: name.to_string(),
        label: name.replace('_', " "),
        kind,
        required,
        current_value: None,
    }
}

pub struct ScriptedSession {
    steps: Vec<FakeStep>,
    current: usize,
    url: String,
    advance_buttons: HashSet<String>,
    submit_button: Option<String>,
    after_submit: FakeStep,
    after_submit_url: Option<String>,
    submitted: bool,
    navigate_error: Option<String>,
    failing_reads: bool,
    log: Arc<Mutex<SessionLog>>,
}

impl ScriptedSession {
    pub fn new(steps: Vec<FakeStep>) -> Self {
        Self {
            steps,
            current: 0,
            url: "about:blank".to_string(),
            advance_buttons: HashSet::new(),
            submit_button: None,
            after_submit: FakeStep::default(),
            after_submit_url: None,
            submitted: false,
            navigate_error: None,
            failing_reads: false,
            log: Arc::new(Mutex::new(SessionLog::default())),
        }
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }

    /// 点击该按钮进入下一步
    pub fn advancing_on(mut self, selector: &str) -> Self {
        self.advance_buttons.insert(selector.to_string());
        self
    }

    /// 点击该按钮等同于提交
    pub fn submit_via(mut self, selector: &str) -> Self {
        self.submit_button = Some(selector.to_string());
        self
    }

    pub fn after_submit(mut self, url: Option<&str>, step: FakeStep) -> Self {
        self.after_submit_url = url.map(str::to_string);
        self.after_submit = step;
        self
    }

    pub fn failing_navigation(mut self, detail: &str) -> Self {
        self.navigate_error = Some(detail.to_string());
        self
    }

    pub fn failing_reads(mut self) -> Self {
        self.failing_reads = true;
        self
    }

    pub fn log(&self) -> Arc<Mutex<SessionLog>> {
        self.log.clone()
    }

    fn step(&self) -> &FakeStep {
        if self.submitted {
            &self.after_submit
        } else {
            &self.steps[self.current.min(self.steps.len().saturating_sub(1))]
        }
    }

    fn has_field(&self, selector: &str) -> bool {
        self.step().fields.iter().any(|f| f.selector == selector)
    }

    fn do_submit(&mut self) {
        self.submitted = true;
        if let Some(url) = &self.after_submit_url {
            self.url = url.clone();
        }
        self.log.lock().unwrap().submits += 1;
    }
}

#[async_trait]
impl BrowserSession for ScriptedSession {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        if let Some(detail) = &self.navigate_error {
            return Err(BrowserError::transport("导航", detail));
        }
        self.url = url.to_string();
        self.log.lock().unwrap().navigations.push(url.to_string());
        Ok(())
    }

    async fn list_fields(&mut self) -> Result<Vec<FormField>, BrowserError> {
        Ok(self.step().fields.clone())
    }

    async fn fill_field(&mut self, selector: &str, value: &str) -> Result<(), BrowserError> {
        if !self.has_field(selector) {
            return Err(BrowserError::ElementNotFound {
                selector: selector.to_string(),
            });
        }
        self.log
            .lock()
            .unwrap()
            .filled
            .push((selector.to_string(), value.to_string()));
        Ok(())
    }

    async fn upload_file(&mut self, selector: &str, path: &Path) -> Result<(), BrowserError> {
        if !self.has_field(selector) {
            return Err(BrowserError::ElementNotFound {
                selector: selector.to_string(),
            });
        }
        self.log
            .lock()
            .unwrap()
            .uploads
            .push((selector.to_string(), path.to_path_buf()));
        Ok(())
    }

    async fn click(&mut self, selector: &str) -> Result<(), BrowserError> {
        self.log.lock().unwrap().clicks.push(selector.to_string());
        if !self.step().buttons.iter().any(|b| b == selector) {
            return Err(BrowserError::ElementNotFound {
                selector: selector.to_string(),
            });
        }
        // 同一个按钮既翻页又提交时，只有最后一步才算提交
        let last_step = self.current + 1 >= self.steps.len();
        if self.advance_buttons.contains(selector) && !last_step && !self.submitted {
            self.current += 1;
        } else if self.submit_button.as_deref() == Some(selector) && !self.submitted {
            self.do_submit();
        }
        Ok(())
    }

    async fn submit(&mut self) -> Result<(), BrowserError> {
        self.do_submit();
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String, BrowserError> {
        if self.failing_reads {
            return Err(BrowserError::transport("读取当前地址", "target closed"));
        }
        Ok(self.url.clone())
    }

    async fn read_marker(&mut self, selector: &str) -> Result<Option<String>, BrowserError> {
        if self.failing_reads {
            return Err(BrowserError::transport("读取标记", "target closed"));
        }
        Ok(self.step().markers.get(selector).cloned())
    }

    async fn close(self: Box<Self>) -> Result<(), BrowserError> {
        self.log.lock().unwrap().closed = true;
        Ok(())
    }
}
