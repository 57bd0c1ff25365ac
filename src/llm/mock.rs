//! Mock LLM 客户端（用于测试与离线运行，无需 API）
//!
//! 有脚本时按顺序返回预设回复（`Err` 项模拟调用失败），脚本耗尽后报错；
//! 无脚本时：规划类请求回一个「搜索最后一条用户消息」的单步计划，其余请求报错，
//! 让 Formatter / Approval Handler 走各自的确定性回退。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError};
use crate::memory::{Message, Role};

/// Mock 客户端：脚本化回复 + 调用记录
#[derive(Debug, Default)]
pub struct MockLlmClient {
    script: Option<Mutex<VecDeque<Result<String, LlmError>>>>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl MockLlmClient {
    /// 依次返回给定回复
    pub fn scripted<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_results(replies.into_iter().map(|r| Ok(r.into())))
    }

    /// 依次返回给定结果（可混入失败）
    pub fn with_results(results: impl IntoIterator<Item = Result<String, LlmError>>) -> Self {
        Self {
            script: Some(Mutex::new(results.into_iter().collect())),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// 已收到的调用次数
    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// 第 n 次调用的消息（用于断言 prompt 内容）
    pub fn call(&self, n: usize) -> Option<Vec<Message>> {
        self.calls.lock().ok().and_then(|c| c.get(n).cloned())
    }

    fn unscripted_reply(messages: &[Message]) -> Result<String, LlmError> {
        let is_planning = messages
            .iter()
            .any(|m| m.role == Role::System && m.content.contains("\"plan\""));
        if !is_planning {
            return Err(LlmError::ApiError("mock client has no reply for this prompt".into()));
        }
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("popular songs");
        let plan = serde_json::json!({
            "plan": [{
                "step": 1,
                "tool": "search_spotify",
                "args": { "query": last_user },
                "reasoning": "Search the catalog for the request"
            }]
        });
        Ok(plan.to_string())
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(messages.to_vec());
        }
        match &self.script {
            Some(script) => script
                .lock()
                .map_err(|_| LlmError::ApiError("mock script poisoned".into()))?
                .pop_front()
                .unwrap_or_else(|| Err(LlmError::ApiError("mock script exhausted".into()))),
            None => Self::unscripted_reply(messages),
        }
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}
