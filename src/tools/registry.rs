//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters_schema / execute），由 ToolRegistry 按名注册与查找，
//! ToolExecutor 在调用时记录审计日志并统一转 AgentError。
//!
//! 结果约定：`Ok(value)` 中 `success=false` 表示工具自行报告的失败（结果照常记录）；
//! `Err(ToolError)` 表示抛出的故障（不记录结果）。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("{0}")]
    Fault(String),
}

/// 工具 trait：名称、描述（供 LLM 理解）、参数 schema、异步执行（args 为 JSON 对象）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（用于 plan 中的 "tool" 字段）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    /// 参数 JSON Schema（供 LLM 生成正确的参数格式）
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    /// 是否会修改用户账号（执行前必须经过审批）
    fn requires_approval(&self) -> bool {
        false
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError>;
}

/// 把 JSON 参数解析为工具的输入结构；多余字段（如注入的 session_id）忽略
pub fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, ToolError> {
    serde_json::from_value(args).map_err(|e| ToolError::InvalidArgs(e.to_string()))
}

/// 工具注册表：按名称存储 Arc<dyn Tool>
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// 按名称排序，保证 prompt 稳定
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn requires_approval(&self, name: &str) -> bool {
        self.tools.get(name).is_some_and(|t| t.requires_approval())
    }

    /// prompt 中的 Available Tools 段落：每个工具一行描述加参数 schema
    pub fn describe_for_prompt(&self) -> String {
        self.tool_names()
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| {
                let schema = serde_json::to_string(&tool.parameters_schema())
                    .unwrap_or_else(|_| "{}".to_string());
                format!("- **{}**: {}\n  Args schema: {}", tool.name(), tool.description(), schema)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
