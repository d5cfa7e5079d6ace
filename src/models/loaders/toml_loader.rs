use crate::models::{AnswerEntry, JobRef, Platform};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

/// 答案库文件结构
///
/// ```toml
/// [global]
/// first_name = "Ada"
/// linkedin_url = "https://linkedin.com/in/ada"
///
/// [platforms.greenhouse]
/// linkedin_url = "https://linkedin.com/in/ada-gh"
/// ```
#[derive(Debug, Default, Deserialize)]
struct AnswerBankFile {
    #[serde(default)]
    global: BTreeMap<String, String>,
    #[serde(default)]
    platforms: BTreeMap<String, BTreeMap<String, String>>,
}

/// 职位种子文件中的单个职位
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JobSeed {
    pub job_id: String,
    pub apply_url: String,
    pub platform: Platform,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
}

impl JobSeed {
    pub fn job_ref(&self) -> JobRef {
        JobRef {
            job_id: self.job_id.clone(),
            apply_url: self.apply_url.clone(),
            title: self.title.clone(),
            company: self.company.clone(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct JobSeedFile {
    #[serde(default)]
    jobs: Vec<JobSeed>,
}

/// 从 TOML 文件加载答案库
pub async fn load_answer_bank(path: &Path) -> Result<Vec<AnswerEntry>> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("无法读取答案库文件: {}", path.display()))?;

    parse_answer_bank(&content).with_context(|| format!("无法解析答案库文件: {}", path.display()))
}

fn parse_answer_bank(content: &str) -> Result<Vec<AnswerEntry>> {
    let file: AnswerBankFile = toml::from_str(content)?;

    let mut entries: Vec<AnswerEntry> = file
        .global
        .into_iter()
        .map(|(signature, value)| AnswerEntry::global(signature, value))
        .collect();

    for (platform_code, answers) in file.platforms {
        let platform: Platform = match platform_code.parse() {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!("答案库中存在未知平台，已忽略: {}", e);
                continue;
            }
        };
        entries.extend(
            answers
                .into_iter()
                .map(|(signature, value)| AnswerEntry::for_platform(platform, signature, value)),
        );
    }

    Ok(entries)
}

/// 加载单个职位种子文件
pub async fn load_job_seeds(path: &Path) -> Result<Vec<JobSeed>> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("无法读取TOML文件: {}", path.display()))?;

    let file: JobSeedFile = toml::from_str(&content)
        .with_context(|| format!("无法解析TOML文件: {}", path.display()))?;

    Ok(file.jobs)
}

/// 从文件夹中加载所有职位种子文件，按文件名排序保证入队顺序稳定
pub async fn load_all_job_seeds(folder_path: &str) -> Result<Vec<JobSeed>> {
    let folder = PathBuf::from(folder_path);

    if !folder.exists() {
        anyhow::bail!("文件夹不存在: {}", folder_path);
    }

    let mut toml_files = Vec::new();
    let mut entries = fs::read_dir(&folder)
        .await
        .with_context(|| format!("无法读取文件夹: {}", folder_path))?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            toml_files.push(path);
        }
    }
    toml_files.sort();

    let mut seeds = Vec::new();
    for path in toml_files {
        tracing::info!(
            "正在加载: {}",
            path.file_name().unwrap_or_default().to_string_lossy()
        );

        match load_job_seeds(&path).await {
            Ok(jobs) => {
                tracing::info!("成功加载 {} 个职位", jobs.len());
                seeds.extend(jobs);
            }
            Err(e) => {
                tracing::warn!("加载文件失败 {}: {:#}", path.display(), e);
            }
        }
    }

    Ok(seeds)
}
