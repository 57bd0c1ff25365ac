//! 错误类型
//!
//! AgentError 是库对外的统一错误；工作流内部的故障不会直接抛给调用方，
//! 而是折叠进 RunState（needs_replan / error），最终由 Formatter 转为人话。

use thiserror::Error;

use crate::store::StoreError;

/// 运行过程中可能出现的错误（配置、解析、工具、持久化、请求）
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("JSON parse error: {0}")]
    JsonParseError(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Prompt not found: {0}")]
    PromptNotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}
