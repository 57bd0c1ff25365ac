//! 参数解析：把 `RESULT_STEP_<n>` 回引替换为第 n 步的结果，并注入 session_id
//!
//! 被引用的结果带 `tracks` 时只替换曲目列表，否则替换整个结果；
//! 执行时引用不存在则替换为空列表并记录警告，不使该步失败。
//! 执行前（审批提问）只替换已有的结果，其余回引原样保留。

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::core::StepResults;

fn back_ref_pattern() -> Option<&'static Regex> {
    static BACK_REF: OnceLock<Option<Regex>> = OnceLock::new();
    BACK_REF
        .get_or_init(|| Regex::new(r"^\s*RESULT_STEP_(\d+)\s*$").ok())
        .as_ref()
}

/// 字符串参数若是回引，返回引用的步号
pub fn back_reference(value: &str) -> Option<usize> {
    back_ref_pattern()?
        .captures(value)?
        .get(1)?
        .as_str()
        .parse()
        .ok()
}

fn resolve_value(value: &Value, results: &StepResults, keep_pending: bool) -> Value {
    let Some(index) = value.as_str().and_then(back_reference) else {
        return value.clone();
    };
    match results.get_step(index) {
        Some(result) => result
            .get("tracks")
            .cloned()
            .unwrap_or_else(|| result.clone()),
        None if keep_pending => value.clone(),
        None => {
            tracing::warn!(
                reference = %StepResults::key_for(index),
                "back-reference to a missing step result, substituting an empty list"
            );
            Value::Array(Vec::new())
        }
    }
}

fn resolve_with(
    args: &Map<String, Value>,
    results: &StepResults,
    session_id: &str,
    keep_pending: bool,
) -> Map<String, Value> {
    let mut resolved: Map<String, Value> = args
        .iter()
        .map(|(k, v)| (k.clone(), resolve_value(v, results, keep_pending)))
        .collect();
    if !resolved.contains_key("session_id") {
        resolved.insert("session_id".to_string(), Value::String(session_id.to_string()));
    }
    resolved
}

/// 解析一步的参数（只处理顶层字符串值）
pub fn resolve_args(
    args: &Map<String, Value>,
    results: &StepResults,
    session_id: &str,
) -> Map<String, Value> {
    resolve_with(args, results, session_id, false)
}

/// 同 `resolve_args`，但引用尚无结果的回引原样保留
pub fn resolve_available_args(
    args: &Map<String, Value>,
    results: &StepResults,
    session_id: &str,
) -> Map<String, Value> {
    resolve_with(args, results, session_id, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_back_reference_pattern() {
        assert_eq!(back_reference("RESULT_STEP_3"), Some(3));
        assert_eq!(back_reference(" RESULT_STEP_12 "), Some(12));
        assert_eq!(back_reference("RESULT_STEP_"), None);
        assert_eq!(back_reference("see RESULT_STEP_1"), None);
        assert_eq!(back_reference("rock"), None);
    }

    #[test]
    fn test_substitutes_tracks_not_envelope() {
        let mut results = StepResults::new();
        results.record(1, json!({ "success": true, "query": "rock", "tracks": [{"uri": "u1"}] }));
        results.record(2, json!({ "success": true, "playlist_name": "Mix", "track_count": 1 }));

        let out = resolve_args(
            &args(json!({
                "tracks": "RESULT_STEP_1",
                "previous": "RESULT_STEP_2",
                "playlist_name": "Mix"
            })),
            &results,
            "s1",
        );
        assert_eq!(out["tracks"], json!([{"uri": "u1"}]));
        assert_eq!(out["previous"]["playlist_name"], json!("Mix"));
        assert_eq!(out["playlist_name"], json!("Mix"));
        assert_eq!(out["session_id"], json!("s1"));
    }

    #[test]
    fn test_missing_reference_becomes_empty_list() {
        let out = resolve_args(
            &args(json!({ "tracks": "RESULT_STEP_7" })),
            &StepResults::new(),
            "s1",
        );
        assert_eq!(out["tracks"], json!([]));
    }

    #[test]
    fn test_available_resolution_keeps_pending_reference() {
        let mut results = StepResults::new();
        results.record(1, json!({ "success": true, "tracks": [{"uri": "u1"}] }));

        let out = resolve_available_args(
            &args(json!({ "tracks": "RESULT_STEP_2", "seed": "RESULT_STEP_1" })),
            &results,
            "s1",
        );
        assert_eq!(out["tracks"], json!("RESULT_STEP_2"));
        assert_eq!(out["seed"], json!([{"uri": "u1"}]));
        assert_eq!(out["session_id"], json!("s1"));
    }

    #[test]
    fn test_existing_session_id_kept() {
        let out = resolve_args(&args(json!({ "session_id": "other" })), &StepResults::new(), "s1");
        assert_eq!(out["session_id"], json!("other"));
    }
}
