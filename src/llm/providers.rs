//! 后端选择
//!
//! 按 [llm].provider 构建客户端；DeepSeek 与 Groq 都是 OpenAI 兼容端点，只是 base_url 与默认模型不同。
//! API Key 优先取配置，其次取对应后端的环境变量，只在启动时读取一次。

use std::sync::Arc;

use crate::config::LlmSection;
use crate::core::AgentError;
use crate::llm::{LlmClient, MockLlmClient, OpenAiClient};

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEEPSEEK_CHAT: &str = "deepseek-chat";
pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const GROQ_LLAMA: &str = "llama-3.3-70b-versatile";
pub const OPENAI_DEFAULT_MODEL: &str = "gpt-4o";

/// 根据配置创建 LLM 客户端
pub fn create_llm_from_config(cfg: &LlmSection) -> Result<Arc<dyn LlmClient>, AgentError> {
    let provider = cfg.provider.to_lowercase();
    let (default_base, default_model, key_var) = match provider.as_str() {
        "openai" => (None, OPENAI_DEFAULT_MODEL, "OPENAI_API_KEY"),
        "deepseek" => (Some(DEEPSEEK_BASE_URL), DEEPSEEK_CHAT, "DEEPSEEK_API_KEY"),
        "groq" => (Some(GROQ_BASE_URL), GROQ_LLAMA, "GROQ_API_KEY"),
        "mock" => {
            tracing::warn!("Using Mock LLM");
            return Ok(Arc::new(MockLlmClient::default()));
        }
        other => {
            return Err(AgentError::ConfigError(format!(
                "unknown llm provider '{other}' (expected openai / deepseek / groq / mock)"
            )))
        }
    };

    let api_key = cfg
        .api_key
        .clone()
        .or_else(|| std::env::var(key_var).ok())
        .ok_or_else(|| {
            AgentError::ConfigError(format!("llm.api_key not set and {key_var} is missing"))
        })?;
    let model = cfg.model.clone().unwrap_or_else(|| default_model.to_string());
    let base_url = cfg.base_url.as_deref().or(default_base);

    tracing::info!(provider = %provider, model = %model, "Using LLM");
    Ok(Arc::new(OpenAiClient::new(base_url, &model, &api_key)))
}
