//! 工具执行器
//!
//! 持有 ToolRegistry，execute(tool_name, args) 查找并调用工具；未知工具返回 UnknownTool，
//! 工具抛出的故障转为 ToolExecutionFailed；每次调用输出结构化审计日志（JSON）。
//! 不加超时：外部调用挂起只会拖住当前这一轮。

use std::time::Instant;

use serde_json::Value;

use crate::core::AgentError;
use crate::tools::ToolRegistry;

pub struct ToolExecutor {
    registry: ToolRegistry,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    /// 执行指定工具；输出 JSON 审计日志
    pub async fn execute(&self, tool_name: &str, args: Value) -> Result<Value, AgentError> {
        let tool = self
            .registry
            .get(tool_name)
            .ok_or_else(|| AgentError::UnknownTool(tool_name.to_string()))?;

        let start = Instant::now();
        let args_preview = args_preview(&args);
        let result = tool.execute(args).await;

        let (ok, outcome): (bool, &str) = match &result {
            Ok(v) if v.get("success").and_then(Value::as_bool) == Some(false) => {
                (false, "reported_failure")
            }
            Ok(_) => (true, "ok"),
            Err(_) => (false, "error"),
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": duration_ms,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        result.map_err(|e| AgentError::ToolExecutionFailed(e.to_string()))
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
