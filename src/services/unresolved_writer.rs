//! 未解析字段记录服务 - 业务能力层
//!
//! 只负责"写 unresolved_fields.txt"能力，不关心流程

use std::path::PathBuf;

use anyhow::Result;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::models::Platform;

/// 未解析字段记录服务
///
/// 职责：
/// - 把答案库中找不到的字段签名追加写入文件，方便操作者补录
/// - 只处理单个字段
/// - 不决定尝试是否继续
pub struct UnresolvedWriter {
    path: PathBuf,
}

impl UnresolvedWriter {
    pub fn new() -> Self {
        Self {
            path: PathBuf::from("unresolved_fields.txt"),
        }
    }

    /// 使用自定义文件路径创建
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// 追加一条未解析字段
    ///
    /// 格式: `平台 | 职位 | 签名 | 标签 | 是否必填`
    pub async fn write(
        &self,
        platform: Platform,
        job_id: &str,
        signature: &str,
        label: &str,
        required: bool,
    ) -> Result<()> {
        debug!("记录未解析字段: {} | {} | {}", platform, job_id, signature);

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        let line = format!(
            "{} | {} | {} | {} | {}\n",
            platform.code(),
            job_id,
            signature,
            label.trim(),
            if required { "必填" } else { "选填" }
        );
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        Ok(())
    }
}

impl Default for UnresolvedWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn appends_one_line_per_field() {
        let dir = tempfile::tempdir().unwrap();
        let writer = UnresolvedWriter::with_path(dir.path().join("unresolved.txt"));

        writer
            .write(Platform::Greenhouse, "gh-1", "salary_expectation", " Salary ", true)
            .await
            .unwrap();
        writer
            .write(Platform::Workday, "wd-9", "pronouns", "Pronouns", false)
            .await
            .unwrap();

        let content = std::fs::read_to_string(writer.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "greenhouse | gh-1 | salary_expectation | Salary | 必填");
        assert_eq!(lines[1], "workday | wd-9 | pronouns | Pronouns | 选填");
    }
}
