//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIVE__*` 覆盖（双下划线表示嵌套，如 `HIVE__TEAM__MAX_TURNS=30`）。
//! 凭据（API Key、Azure endpoint 等）不放在配置文件里，由 llm 模块从环境变量读取。

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub team: TeamSection,
    pub tools: ToolsSection,
    pub web: WebSection,
    pub human: HumanSection,
}

/// [app] 段：应用名、代码执行目录、调试输出目录
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 代码执行工具的工作目录
    pub work_dir: PathBuf,
    /// 设置后 WebSurfer 把抓取的页面文本写到这里
    pub debug_dir: Option<PathBuf>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            work_dir: PathBuf::from("coding"),
            debug_dir: None,
        }
    }
}

/// [llm] 段：后端选择
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// azure / openai；对应凭据缺失时回退到 Mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub azure: LlmAzureSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "azure".to_string(),
            model: "gpt-4o".to_string(),
            base_url: None,
            azure: LlmAzureSection::default(),
        }
    }
}

/// [llm.azure] 段；环境变量 AZURE_OPENAI_* 优先
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LlmAzureSection {
    pub endpoint: Option<String>,
    pub deployment: Option<String>,
    pub api_version: Option<String>,
}

/// [team] 段：编排器限制与决策服务重试
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TeamSection {
    pub max_turns: u32,
    pub max_stalls: u32,
    /// 最近一条消息包含该文本（区分大小写）即终止；空串表示不启用
    pub termination_text: String,
    pub final_answer_prompt: Option<String>,
    /// 单轮 Agent 执行超时（秒），0 表示不限
    pub turn_timeout_secs: u64,
    pub oracle_max_retries: u32,
    pub oracle_retry_delay_ms: u64,
    /// 发给决策服务的最近消息条数
    pub transcript_tail_len: usize,
}

impl Default for TeamSection {
    fn default() -> Self {
        Self {
            max_turns: 20,
            max_stalls: 3,
            termination_text: "exit".to_string(),
            final_answer_prompt: None,
            turn_timeout_secs: 300,
            oracle_max_retries: 3,
            oracle_retry_delay_ms: 500,
            transcript_tail_len: 20,
        }
    }
}

/// [tools] 段：代码执行
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    pub code_timeout_secs: u64,
    pub python: String,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            code_timeout_secs: 60,
            python: "python3".to_string(),
        }
    }
}

/// [web] 段：抓取超时、最大字符数、默认起始页
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebSection {
    pub timeout_secs: u64,
    pub max_result_chars: usize,
    pub start_page: Option<String>,
}

impl Default for WebSection {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            max_result_chars: 8000,
            start_page: None,
        }
    }
}

/// [human] 段：人类输入关键词（大小写不敏感、整行匹配）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HumanSection {
    pub abort_keywords: Vec<String>,
    pub approve_keywords: Vec<String>,
}

impl Default for HumanSection {
    fn default() -> Self {
        Self {
            abort_keywords: vec!["abort".into()],
            approve_keywords: vec!["approve".into()],
        }
    }
}

/// 从 config 目录加载配置，环境变量 HIVE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HIVE__*（双下划线表示嵌套键）
/// 把 .env 载入进程环境（已有变量不覆盖）；None 时从当前目录向上查找。
/// 返回实际载入的文件，找不到或解析失败时返回 None。
pub fn load_env_file(path: Option<&Path>) -> Option<PathBuf> {
    match path {
        Some(p) => dotenv::from_path(p).ok().map(|_| p.to_path_buf()),
        None => dotenv::dotenv().ok(),
    }
}

pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HIVE")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.team.max_turns, 20);
        assert_eq!(cfg.team.max_stalls, 3);
        assert_eq!(cfg.team.termination_text, "exit");
        assert_eq!(cfg.app.work_dir, PathBuf::from("coding"));
        assert_eq!(cfg.human.abort_keywords, vec!["abort".to_string()]);
    }

    #[test]
    fn test_file_overrides_partial_section() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[team]\nmax_turns = 7\n\n[web]\nstart_page = \"https://example.com\"").unwrap();
        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.team.max_turns, 7);
        // 未写的键保持默认
        assert_eq!(cfg.team.transcript_tail_len, 20);
        assert_eq!(cfg.web.start_page.as_deref(), Some("https://example.com"));
    }

    #[test]
    fn test_env_file_fills_missing_vars_only() {
        let mut file = tempfile::Builder::new().suffix(".env").tempfile().unwrap();
        writeln!(file, "HIVE_ENV_FILE_TEST_NEW=from-file\nHIVE_ENV_FILE_TEST_SET=from-file").unwrap();
        std::env::set_var("HIVE_ENV_FILE_TEST_SET", "from-process");

        let loaded = load_env_file(Some(file.path()));

        assert_eq!(loaded.as_deref(), Some(file.path()));
        assert_eq!(std::env::var("HIVE_ENV_FILE_TEST_NEW").unwrap(), "from-file");
        assert_eq!(std::env::var("HIVE_ENV_FILE_TEST_SET").unwrap(), "from-process");
        assert_eq!(load_env_file(Some(Path::new("/nonexistent/hive.env"))), None);
    }
}
