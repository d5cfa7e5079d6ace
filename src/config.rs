use std::time::Duration;

use crate::error::{AppError, ConfigError};

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    /// 浏览器调试端口（连接已启动的 Chrome）
    pub browser_debug_port: u16,
    /// 是否自行启动无头浏览器
    pub headless: bool,
    /// 无头模式下的浏览器可执行文件路径
    pub chrome_executable: Option<String>,
    /// 持久化状态文件
    pub state_file: String,
    /// 答案库 TOML 文件（由操作者维护）
    pub answer_bank_file: String,
    /// 待投递职位 TOML 文件存放目录
    pub jobs_folder: String,
    /// 简历文件
    pub resume_path: String,
    /// 求职信文件（可选）
    pub cover_letter_path: Option<String>,
    // --- 重试与熔断 ---
    /// 单个投递的最大尝试次数
    pub max_attempts: u32,
    /// 连续失败多少次触发熔断
    pub breaker_threshold: u32,
    /// 熔断冷却时间（秒）
    pub breaker_cooldown_secs: u64,
    /// 平台被熔断时编排器最多等待多久（秒）
    pub suspension_wait_secs: u64,
    /// 平台被熔断时，剩余条目标记为 skipped（false 则留在 pending 等下一轮）
    pub skip_when_suspended: bool,
    /// 单次尝试的硬超时（秒）
    pub attempt_timeout_secs: u64,
    // --- 批处理 ---
    /// 每轮最多处理的条目数
    pub max_items: usize,
    /// 同一平台的并发上限
    pub per_platform_concurrency: usize,
    // --- 输出 ---
    /// 未解析字段记录文件
    pub unresolved_log_file: String,
    /// 输出日志文件
    pub output_log_file: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            browser_debug_port: 9222,
            headless: false,
            chrome_executable: None,
            state_file: "auto_apply_state.json".to_string(),
            answer_bank_file: "answers.toml".to_string(),
            jobs_folder: "queued_jobs".to_string(),
            resume_path: "resume.pdf".to_string(),
            cover_letter_path: None,
            max_attempts: 3,
            breaker_threshold: 3,
            breaker_cooldown_secs: 900,
            suspension_wait_secs: 0,
            skip_when_suspended: true,
            attempt_timeout_secs: 180,
            max_items: 50,
            per_platform_concurrency: 1,
            unresolved_log_file: "unresolved_fields.txt".to_string(),
            output_log_file: "auto_apply_log.txt".to_string(),
            verbose_logging: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            browser_debug_port: env_parse("BROWSER_DEBUG_PORT").unwrap_or(default.browser_debug_port),
            headless: env_parse("HEADLESS").unwrap_or(default.headless),
            chrome_executable: std::env::var("CHROME_EXECUTABLE").ok().or(default.chrome_executable),
            state_file: std::env::var("STATE_FILE").unwrap_or(default.state_file),
            answer_bank_file: std::env::var("ANSWER_BANK_FILE").unwrap_or(default.answer_bank_file),
            jobs_folder: std::env::var("JOBS_FOLDER").unwrap_or(default.jobs_folder),
            resume_path: std::env::var("RESUME_PATH").unwrap_or(default.resume_path),
            cover_letter_path: std::env::var("COVER_LETTER_PATH").ok().or(default.cover_letter_path),
            max_attempts: env_parse("MAX_ATTEMPTS").unwrap_or(default.max_attempts),
            breaker_threshold: env_parse("BREAKER_THRESHOLD").unwrap_or(default.breaker_threshold),
            breaker_cooldown_secs: env_parse("BREAKER_COOLDOWN_SECS").unwrap_or(default.breaker_cooldown_secs),
            suspension_wait_secs: env_parse("SUSPENSION_WAIT_SECS").unwrap_or(default.suspension_wait_secs),
            skip_when_suspended: env_parse("SKIP_WHEN_SUSPENDED").unwrap_or(default.skip_when_suspended),
            attempt_timeout_secs: env_parse("ATTEMPT_TIMEOUT_SECS").unwrap_or(default.attempt_timeout_secs),
            max_items: env_parse("MAX_ITEMS").unwrap_or(default.max_items),
            per_platform_concurrency: env_parse("PER_PLATFORM_CONCURRENCY").unwrap_or(default.per_platform_concurrency),
            unresolved_log_file: std::env::var("UNRESOLVED_LOG_FILE").unwrap_or(default.unresolved_log_file),
            output_log_file: std::env::var("OUTPUT_LOG_FILE").unwrap_or(default.output_log_file),
            verbose_logging: env_parse("VERBOSE_LOGGING").unwrap_or(default.verbose_logging),
        }
    }

    /// 校验配置，拒绝会让状态机失效的取值
    pub fn validate(&self) -> Result<(), AppError> {
        let checks = [
            ("MAX_ATTEMPTS", self.max_attempts as usize),
            ("BREAKER_THRESHOLD", self.breaker_threshold as usize),
            ("PER_PLATFORM_CONCURRENCY", self.per_platform_concurrency),
            ("ATTEMPT_TIMEOUT_SECS", self.attempt_timeout_secs as usize),
        ];
        for (name, value) in checks {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    var_name: name.to_string(),
                    value: value.to_string(),
                    reason: "必须大于 0".to_string(),
                }
                .into());
            }
        }
        Ok(())
    }

    pub fn breaker_cooldown(&self) -> Duration {
        Duration::from_secs(self.breaker_cooldown_secs)
    }

    pub fn suspension_wait(&self) -> Duration {
        Duration::from_secs(self.suspension_wait_secs)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
