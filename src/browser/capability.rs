//! 浏览器能力抽象
//!
//! 编排引擎把浏览器当作不透明能力：导航、枚举字段、填写、点击、提交、读取 URL / DOM。
//! 每次投递尝试使用一个独立会话，尝试结束（包括超时）后会话立即销毁，
//! 半途的表单状态从不复用。

use std::path::Path;

use async_trait::async_trait;

use crate::error::BrowserError;
use crate::models::FormField;

/// 一次投递尝试独占的浏览器会话
#[async_trait]
pub trait BrowserSession: Send {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError>;

    /// 枚举当前页面上的可填写字段
    async fn list_fields(&mut self) -> Result<Vec<FormField>, BrowserError>;

    async fn fill_field(&mut self, selector: &str, value: &str) -> Result<(), BrowserError>;

    /// 给文件输入框挂载本地文件
    async fn upload_file(&mut self, selector: &str, path: &Path) -> Result<(), BrowserError>;

    async fn click(&mut self, selector: &str) -> Result<(), BrowserError>;

    /// 点击页面上的提交按钮
    async fn submit(&mut self) -> Result<(), BrowserError>;

    async fn current_url(&mut self) -> Result<String, BrowserError>;

    /// 读取第一个匹配元素的文本；不存在时返回 None
    async fn read_marker(&mut self, selector: &str) -> Result<Option<String>, BrowserError>;

    /// 销毁会话
    async fn close(self: Box<Self>) -> Result<(), BrowserError>;
}

/// 会话工厂：每次尝试打开一个新会话
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self) -> Result<Box<dyn BrowserSession>, BrowserError>;
}
