//! 基于 chromiumoxide 的浏览器会话
//!
//! 字段枚举、填写、读取标记都通过 JsExecutor 执行脚本完成；
//! 导航、点击、文件上传直接走 CDP。

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::dom::SetFileInputFilesParams;
use chromiumoxide::Browser;
use serde::Deserialize;
use tracing::debug;

use crate::browser::capability::{BrowserSession, SessionFactory};
use crate::error::BrowserError;
use crate::infrastructure::JsExecutor;
use crate::models::{FieldKind, FormField};

/// 每个输入元素一条；单选按钮按组在 Rust 侧合并
const LIST_FIELDS_JS: &str = r#"
(() => {
    const quote = (v) => '"' + String(v).replace(/\\/g, '\\\\').replace(/"/g, '\\"') + '"';
    const ownLabel = (el) => {
        if (el.id) {
            const l = document.querySelector('label[for="' + CSS.escape(el.id) + '"]');
            if (l) return l.innerText;
        }
        const l = el.closest('label');
        if (l) return l.innerText;
        return el.getAttribute('aria-label') || el.placeholder || '';
    };
    const groupLabel = (el) => {
        const fieldset = el.closest('fieldset');
        const legend = fieldset && fieldset.querySelector('legend');
        if (legend) return legend.innerText;
        const group = el.closest('[role="radiogroup"]');
        if (group) {
            const by = group.getAttribute('aria-labelledby');
            const ref = by && document.getElementById(by);
            if (ref) return ref.innerText;
            return group.getAttribute('aria-label') || '';
        }
        return '';
    };

    const fields = [];
    document.querySelectorAll('input, select, textarea').forEach((el, i) => {
        const tag = el.tagName.toLowerCase();
        const type = tag === 'input' ? (el.type || 'text') : tag;
        if (['hidden', 'submit', 'button', 'reset', 'image'].includes(type)) return;
        if (el.offsetParent === null && type !== 'file') return;

        let selector;
        if (type === 'radio' && el.name) {
            selector = 'input[type="radio"][name=' + quote(el.name) + ']';
        } else if (el.id) {
            selector = '#' + CSS.escape(el.id);
        } else if (type === 'checkbox' && el.name) {
            selector = 'input[type="checkbox"][name=' + quote(el.name) + '][value=' + quote(el.value) + ']';
        } else if (el.name) {
            selector = tag + '[name=' + quote(el.name) + ']';
        } else {
            el.setAttribute('data-auto-apply-idx', String(i));
            selector = '[data-auto-apply-idx="' + i + '"]';
        }

        const checkable = type === 'checkbox' || type === 'radio';
        let currentValue = null;
        if (checkable) {
            currentValue = el.checked ? el.value : null;
        } else if (type !== 'file') {
            currentValue = el.value || null;
        }

        fields.push({
            selector,
            name: el.name || el.id || '',
            label: ownLabel(el).trim(),
            kind: type,
            required: !!el.required || el.getAttribute('aria-required') === 'true',
            currentValue,
            groupLabel: type === 'radio' ? groupLabel(el).trim() : null,
        });
    });
    return fields;
})()
"#;

const SUBMIT_JS: &str = r#"
(() => {
    const btn = document.querySelector('button[type="submit"], input[type="submit"]');
    if (!btn) return false;
    btn.click();
    return true;
})()
"#;

/// 页面返回的原始输入元素
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawField {
    #[serde(flatten)]
    field: FormField,
    #[serde(default)]
    group_label: Option<String>,
}

/// 单选组中的一个选项
#[derive(Debug, Clone, Deserialize)]
struct ChoiceOption {
    value: String,
    #[serde(default)]
    label: String,
}

#[derive(Debug, Deserialize)]
struct ChoiceProbe {
    count: usize,
    #[serde(default)]
    radio: bool,
    #[serde(default)]
    options: Vec<ChoiceOption>,
}

/// 把同名单选按钮合并成一个字段，位置取组内第一个
fn collapse_radio_groups(raw: Vec<RawField>) -> Vec<FormField> {
    let mut fields: Vec<FormField> = Vec::with_capacity(raw.len());
    for RawField { mut field, group_label } in raw {
        if field.kind == FieldKind::Radio {
            if let Some(group) = fields
                .iter_mut()
                .find(|f| f.kind == FieldKind::Radio && f.selector == field.selector)
            {
                group.required |= field.required;
                if field.current_value.is_some() {
                    group.current_value = field.current_value;
                }
                continue;
            }
            match group_label.filter(|l| !l.trim().is_empty()) {
                Some(label) => field.label = label,
                None => field.label = field.name.replace(['_', '-'], " "),
            }
        }
        fields.push(field);
    }
    fields
}

/// 按 value 或可见文字挑选单选项，忽略大小写和首尾空白
fn pick_option(options: &[ChoiceOption], answer: &str) -> Option<usize> {
    let answer = answer.trim();
    options
        .iter()
        .position(|o| o.value.trim().eq_ignore_ascii_case(answer))
        .or_else(|| {
            options
                .iter()
                .position(|o| o.label.trim().eq_ignore_ascii_case(answer))
        })
}

#[derive(Debug, Deserialize)]
struct FillResult {
    found: bool,
    #[serde(default)]
    filled: bool,
}

/// chromiumoxide 会话
pub struct ChromeSession {
    executor: JsExecutor,
}

impl ChromeSession {
    pub fn new(executor: JsExecutor) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        debug!("导航到: {}", url);
        self.executor
            .page()
            .goto(url)
            .await
            .map_err(|e| BrowserError::transport(format!("导航到 {}", url), e))?;
        Ok(())
    }

    async fn list_fields(&mut self) -> Result<Vec<FormField>, BrowserError> {
        let raw: Vec<RawField> = self.executor.eval_as(LIST_FIELDS_JS).await?;
        Ok(collapse_radio_groups(raw))
    }

    async fn fill_field(&mut self, selector: &str, value: &str) -> Result<(), BrowserError> {
        let selector_json = serde_json::to_string(selector).unwrap_or_default();
        let probe_js = format!(
            r#"
            (() => {{
                const els = Array.from(document.querySelectorAll({selector_json}));
                const radio = els.length > 0 && els[0].type === 'radio';
                const options = radio ? els.map(el => {{
                    const l = (el.id && document.querySelector('label[for="' + CSS.escape(el.id) + '"]')) || el.closest('label');
                    return {{ value: el.value, label: l ? l.innerText : '' }};
                }}) : [];
                return {{ count: els.length, radio, options }};
            }})()
            "#
        );
        let probe: ChoiceProbe = self.executor.eval_as(probe_js).await?;
        if probe.count == 0 {
            return Err(BrowserError::ElementNotFound {
                selector: selector.to_string(),
            });
        }
        if probe.radio {
            let Some(index) = pick_option(&probe.options, value) else {
                return Err(BrowserError::ElementNotFound {
                    selector: format!("{} 的选项 '{}'", selector, value),
                });
            };
            let click_js = format!(
                r#"
                (() => {{
                    const el = document.querySelectorAll({selector_json})[{index}];
                    if (!el) return false;
                    if (!el.checked) el.click();
                    el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                    return true;
                }})()
                "#
            );
            let clicked: bool = self.executor.eval_as(click_js).await?;
            return if clicked {
                Ok(())
            } else {
                Err(BrowserError::ElementNotFound {
                    selector: selector.to_string(),
                })
            };
        }

        let js_code = format!(
            r#"
            (() => {{
                const el = document.querySelector({selector});
                if (!el) return {{ found: false }};
                const value = {value};
                if (el.type === 'checkbox') {{
                    const want = ['true', 'yes', '1', 'on'].includes(value.toLowerCase()) || el.value === value;
                    if (el.checked !== want) el.click();
                }} else if (el.tagName === 'SELECT') {{
                    const opt = Array.from(el.options).find(o =>
                        o.value === value || o.text.trim().toLowerCase() === value.toLowerCase());
                    if (!opt) return {{ found: true, filled: false }};
                    el.value = opt.value;
                }} else {{
                    const proto = el.tagName === 'TEXTAREA' ? HTMLTextAreaElement.prototype : HTMLInputElement.prototype;
                    Object.getOwnPropertyDescriptor(proto, 'value').set.call(el, value);
                }}
                el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return {{ found: true, filled: true }};
            }})()
            "#,
            selector = serde_json::to_string(selector).unwrap_or_default(),
            value = serde_json::to_string(value).unwrap_or_default(),
        );

        let result: FillResult = self.executor.eval_as(js_code).await?;
        match result {
            FillResult { found: false, .. } => Err(BrowserError::ElementNotFound {
                selector: selector.to_string(),
            }),
            FillResult { filled: false, .. } => Err(BrowserError::ElementNotFound {
                selector: format!("{} 的选项 '{}'", selector, value),
            }),
            _ => Ok(()),
        }
    }

    async fn upload_file(&mut self, selector: &str, path: &Path) -> Result<(), BrowserError> {
        let page = self.executor.page();
        let element = page
            .find_element(selector)
            .await
            .map_err(|_| BrowserError::ElementNotFound {
                selector: selector.to_string(),
            })?;

        let params = SetFileInputFilesParams::builder()
            .file(path.display().to_string())
            .backend_node_id(element.backend_node_id)
            .build()
            .map_err(|e| BrowserError::transport("构建上传参数", e))?;

        page.execute(params)
            .await
            .map_err(|e| BrowserError::transport(format!("上传文件到 {}", selector), e))?;
        Ok(())
    }

    async fn click(&mut self, selector: &str) -> Result<(), BrowserError> {
        let element = self
            .executor
            .page()
            .find_element(selector)
            .await
            .map_err(|_| BrowserError::ElementNotFound {
                selector: selector.to_string(),
            })?;
        element
            .click()
            .await
            .map_err(|e| BrowserError::transport(format!("点击 {}", selector), e))?;
        Ok(())
    }

    async fn submit(&mut self) -> Result<(), BrowserError> {
        let clicked: bool = self.executor.eval_as(SUBMIT_JS).await?;
        if clicked {
            Ok(())
        } else {
            Err(BrowserError::ElementNotFound {
                selector: "submit 按钮".to_string(),
            })
        }
    }

    async fn current_url(&mut self) -> Result<String, BrowserError> {
        self.executor
            .page()
            .url()
            .await
            .map_err(|e| BrowserError::transport("读取当前地址", e))?
            .ok_or_else(|| BrowserError::transport("读取当前地址", "页面没有地址"))
    }

    async fn read_marker(&mut self, selector: &str) -> Result<Option<String>, BrowserError> {
        let js_code = format!(
            r#"
            (() => {{
                const el = document.querySelector({});
                return el ? (el.innerText || '').trim() : null;
            }})()
            "#,
            serde_json::to_string(selector).unwrap_or_default()
        );
        self.executor.eval_as(js_code).await
    }

    async fn close(self: Box<Self>) -> Result<(), BrowserError> {
        self.executor.close().await
    }
}

/// 共享同一个浏览器进程，每次尝试新开一个标签页
pub struct ChromeSessionFactory {
    browser: Arc<Browser>,
}

impl ChromeSessionFactory {
    pub fn new(browser: Browser) -> Self {
        Self {
            browser: Arc::new(browser),
        }
    }
}

#[async_trait]
impl SessionFactory for ChromeSessionFactory {
    async fn open(&self) -> Result<Box<dyn BrowserSession>, BrowserError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::PageCreationFailed {
                source: Box::new(e),
            })?;
        Ok(Box::new(ChromeSession::new(JsExecutor::new(page))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(json: serde_json::Value) -> RawField {
        serde_json::from_value(json).unwrap()
    }

    fn radio(value: &str, checked: bool, required: bool) -> RawField {
        let current = checked.then_some(value);
        raw(serde_json::json!({
            "selector": "input[type=\"radio\"][name=\"gender\"]",
            "name": "gender",
            "label": value,
            "kind": "radio",
            "required": required,
            "currentValue": current,
            "groupLabel": "Gender",
        }))
    }

    #[test]
    fn radio_group_becomes_one_field() {
        let email = raw(serde_json::json!({
            "selector": "#email", "name": "email", "label": "Email", "kind": "email", "required": true
        }));
        let fields = collapse_radio_groups(vec![
            radio("female", false, false),
            radio("male", true, true),
            radio("decline", false, false),
            email,
        ]);

        assert_eq!(fields.len(), 2);
        let group = &fields[0];
        assert_eq!(group.kind, FieldKind::Radio);
        assert_eq!(group.label, "Gender");
        assert!(group.required);
        assert_eq!(group.current_value.as_deref(), Some("male"));
        assert_eq!(fields[1].name, "email");
    }

    #[test]
    fn checkboxes_stay_separate() {
        let boxes: Vec<RawField> = ["a", "b"]
            .iter()
            .map(|v| {
                raw(serde_json::json!({
                    "selector": format!("input[type=\"checkbox\"][name=\"langs\"][value=\"{}\"]", v),
                    "name": "langs", "label": v, "kind": "checkbox"
                }))
            })
            .collect();
        let fields = collapse_radio_groups(boxes);
        assert_eq!(fields.len(), 2);
        assert_ne!(fields[0].selector, fields[1].selector);
    }

    #[test]
    fn option_is_picked_by_value_then_label() {
        let options = vec![
            ChoiceOption { value: "1".to_string(), label: "Yes".to_string() },
            ChoiceOption { value: "0".to_string(), label: "No".to_string() },
        ];
        assert_eq!(pick_option(&options, "0"), Some(1));
        assert_eq!(pick_option(&options, " no "), Some(1));
        assert_eq!(pick_option(&options, "yes"), Some(0));
        assert_eq!(pick_option(&options, "maybe"), None);
    }
}
