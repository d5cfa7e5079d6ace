use serde::{Deserialize, Serialize};

/// 表单字段类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String")]
pub enum FieldKind {
    Text,
    Textarea,
    Select,
    Checkbox,
    Radio,
    File,
    Other,
}

impl From<String> for FieldKind {
    fn from(value: String) -> Self {
        match value.to_lowercase().as_str() {
            "text" | "email" | "tel" | "url" | "number" | "date" => FieldKind::Text,
            "textarea" => FieldKind::Textarea,
            "select" | "select-one" | "select-multiple" => FieldKind::Select,
            "checkbox" => FieldKind::Checkbox,
            "radio" => FieldKind::Radio,
            "file" => FieldKind::File,
            _ => FieldKind::Other,
        }
    }
}

/// 浏览器枚举出的单个表单字段
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormField {
    /// 用于后续填写的 CSS 选择器
    pub selector: String,
    /// DOM 上的 name / id
    #[serde(default)]
    pub name: String,
    /// 字段可见标签
    #[serde(default)]
    pub label: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    /// 平台预填的值
    #[serde(default)]
    pub current_value: Option<String>,
}

impl FormField {
    /// 查询答案库时使用的字段签名：优先 name，其次 label
    pub fn signature(&self) -> &str {
        if self.name.trim().is_empty() {
            self.label.trim()
        } else {
            self.name.trim()
        }
    }

    /// 平台已经预填了非空值
    pub fn is_prefilled(&self) -> bool {
        self.current_value
            .as_deref()
            .is_some_and(|v| !v.trim().is_empty())
    }
}
