//! Sporky - 对话式音乐推荐助手
//!
//! 核心是规划执行控制环：Planner → Executor → (Approval Handler / Replanner) → Formatter。
//!
//! 模块划分：
//! - **agent**: 请求 / 响应边界，会话持久化编排与会话锁
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型与 Run State
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Groq / Mock）
//! - **memory**: 对话消息
//! - **planning**: 控制环各节点与 JSON 提取
//! - **prompts**: Prompt 模板
//! - **spotify**: 曲目模型、曲库抽象、Spotify Web API 客户端
//! - **store**: 会话持久化（内存 / SQLite）
//! - **tools**: 工具注册表、四个工具与执行器
//! - **workflow**: 状态机与引擎

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod planning;
pub mod prompts;
pub mod spotify;
pub mod store;
pub mod tools;
pub mod workflow;

pub use agent::{AgentRuntime, QueryRequest, QueryResponse};
