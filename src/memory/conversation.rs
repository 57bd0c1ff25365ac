//! 对话历史
//!
//! 单条消息（role + content），既是会话历史的存储单位，也是 LLM 请求的消息格式。

use serde::{Deserialize, Serialize};

/// 消息角色（与 LLM API 一致，序列化为小写）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// 取最近 `window` 条消息，格式化为 `role: content` 行；为空时返回固定提示
pub fn format_history(history: &[Message], window: usize) -> String {
    if history.is_empty() {
        return "No previous conversation.".to_string();
    }
    let start = history.len().saturating_sub(window);
    history[start..]
        .iter()
        .map(|m| {
            let role = match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::System => "system",
            };
            format!("{}: {}", role, m.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// 只保留最近 `max_turns` 轮（每轮一问一答）
pub fn prune_history(history: &mut Vec<Message>, max_turns: usize) {
    let keep = max_turns * 2;
    if history.len() > keep {
        history.drain(..history.len() - keep);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_history_keeps_recent_window() {
        let history: Vec<Message> = (0..15).map(|i| Message::user(format!("msg {i}"))).collect();
        let text = format_history(&history, 10);
        assert_eq!(text.lines().count(), 10);
        assert!(text.starts_with("user: msg 5"));
        assert!(text.ends_with("user: msg 14"));
    }

    #[test]
    fn test_prune_history_keeps_latest_turns() {
        let mut history: Vec<Message> = (0..7).map(|i| Message::user(format!("msg {i}"))).collect();
        prune_history(&mut history, 2);
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].content, "msg 3");

        let mut short = vec![Message::user("a"), Message::assistant("b")];
        prune_history(&mut short, 2);
        assert_eq!(short.len(), 2);
    }

    #[test]
    fn test_format_history_empty() {
        assert_eq!(format_history(&[], 10), "No previous conversation.");
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&Message::assistant("hi")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);
    }
}
