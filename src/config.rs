//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `SPORKY__*` 覆盖（双下划线表示嵌套，如 `SPORKY__LLM__PROVIDER=groq`）。
//! 所有客户端在进程启动时按此配置构建一次，再显式注入各组件。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub spotify: SpotifySection,
    pub agent: AgentSection,
    pub store: StoreSection,
    pub server: ServerSection,
}

/// [app] 段：Prompt 覆盖目录
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    /// 存放 `<name>.md` 的目录，同名文件覆盖内置 prompt
    pub prompts_dir: Option<PathBuf>,
}

/// [llm] 段：后端选择（openai / deepseek / groq / mock）
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model: Option<String>,
    pub base_url: Option<String>,
    /// 未设置时读取对应后端的环境变量（OPENAI_API_KEY / DEEPSEEK_API_KEY / GROQ_API_KEY）
    pub api_key: Option<String>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            base_url: None,
            api_key: None,
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}

/// [spotify] 段：Web API 地址、访问令牌、超时
#[derive(Debug, Clone, Deserialize)]
pub struct SpotifySection {
    #[serde(default = "default_spotify_api_base")]
    pub api_base: String,
    /// 未设置时读取 SPOTIFY_ACCESS_TOKEN
    pub access_token: Option<String>,
    #[serde(default = "default_spotify_timeout_secs")]
    pub timeout_secs: u64,
    /// 使用内存曲库（离线演示）
    #[serde(default)]
    pub offline: bool,
}

impl Default for SpotifySection {
    fn default() -> Self {
        Self {
            api_base: default_spotify_api_base(),
            access_token: None,
            timeout_secs: default_spotify_timeout_secs(),
            offline: false,
        }
    }
}

fn default_spotify_api_base() -> String {
    "https://api.spotify.com/v1".to_string()
}

fn default_spotify_timeout_secs() -> u64 {
    15
}

/// [agent] 段：上下文窗口、摘要长度、重规划上限
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSection {
    /// 交给 Planner 的历史条数
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    /// 每个会话持久化的最多轮数（一问一答为一轮）
    #[serde(default = "default_max_history_turns")]
    pub max_history_turns: usize,
    /// 摘要中每次搜索最多列出的曲目数
    #[serde(default = "default_summary_track_limit")]
    pub summary_track_limit: usize,
    #[serde(default = "default_search_limit")]
    pub default_search_limit: usize,
    /// 单回合最多重规划次数
    #[serde(default = "default_max_replans")]
    pub max_replans: u32,
    /// 单回合状态机最多转移次数，防止死循环
    #[serde(default = "default_max_transitions")]
    pub max_transitions: usize,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            history_window: default_history_window(),
            max_history_turns: default_max_history_turns(),
            summary_track_limit: default_summary_track_limit(),
            default_search_limit: default_search_limit(),
            max_replans: default_max_replans(),
            max_transitions: default_max_transitions(),
        }
    }
}

fn default_history_window() -> usize {
    10
}

fn default_max_history_turns() -> usize {
    50
}

fn default_summary_track_limit() -> usize {
    15
}

fn default_search_limit() -> usize {
    10
}

fn default_max_replans() -> u32 {
    2
}

fn default_max_transitions() -> usize {
    64
}

/// [store] 段：持久化后端（memory / sqlite）
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSection {
    #[serde(default = "default_store_backend")]
    pub backend: String,
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: PathBuf,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            sqlite_path: default_sqlite_path(),
        }
    }
}

fn default_store_backend() -> String {
    "memory".to_string()
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("data/sporky.db")
}

/// [server] 段：HTTP 监听地址
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

/// 从 config 目录加载配置，环境变量 SPORKY__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 SPORKY__*（双下划线表示嵌套键）
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
        config::Environment::with_prefix("SPORKY")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
