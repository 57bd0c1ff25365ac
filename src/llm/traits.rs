//! LLM 客户端抽象
//!
//! Planner / Replanner / Formatter / Approval Handler 共用同一个 `complete` 接口，
//! 具体后端（OpenAI 兼容 / DeepSeek / Groq / Mock）只是外部配置。

use async_trait::async_trait;
use thiserror::Error;

use crate::memory::Message;

/// LLM 调用错误
#[derive(Error, Debug, Clone)]
pub enum LlmError {
    #[error("API error: {0}")]
    ApiError(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Empty response")]
    EmptyResponse,
}

/// LLM 客户端 trait：非流式完成
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError>;

    /// 后端描述（日志用）
    fn describe(&self) -> String {
        "llm".to_string()
    }
}
