//! 从模型回复中提取 JSON
//!
//! 回复常被散文或代码块包裹。找到第一个 `{` / `[`，按括号深度扫描到与之匹配的闭括号，
//! 扫描时跳过字符串内部（含转义），因此曲目元数据里的括号不会截断结果。
//! 若该片段不是合法 JSON，则从下一个起始括号继续尝试，最多尝试 `MAX_CANDIDATES` 个起点；
//! 全部失败时返回 JsonParseError。

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::core::AgentError;

/// 每个起点最多扫描一遍全文，起点数有上限以保证线性开销
const MAX_CANDIDATES: usize = 32;

/// 从 `start`（必须是 `{` 或 `[`）开始，返回与之平衡的片段
fn balanced_span(text: &str, start: usize) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    let end = start + offset + c.len_utf8();
                    return Some(&text[start..end]);
                }
            }
            _ => {}
        }
    }
    None
}

/// 第一个平衡的顶层 JSON 片段（不校验合法性）
pub fn first_json_span(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    balanced_span(text, start)
}

/// 提取并解析第一个合法的 JSON 值
pub fn extract_json(text: &str) -> Result<Value, AgentError> {
    for (start, _) in text.match_indices(['{', '[']).take(MAX_CANDIDATES) {
        if let Some(span) = balanced_span(text, start) {
            if let Ok(value) = serde_json::from_str::<Value>(span) {
                return Ok(value);
            }
        }
    }
    let preview: String = text.chars().take(200).collect();
    Err(AgentError::JsonParseError(format!("no JSON found in model output: {preview}")))
}

/// 提取 JSON 对象并反序列化为 `T`
pub fn parse_json<T: DeserializeOwned>(text: &str) -> Result<T, AgentError> {
    let value = extract_json(text)?;
    serde_json::from_value(value).map_err(|e| AgentError::JsonParseError(e.to_string()))
}
