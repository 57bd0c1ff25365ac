//! Run State：一次对话回合贯穿所有节点的唯一可变记录
//!
//! 审批暂停时整个 RunState 序列化交给持久化层；恢复时从持久化副本原样重建，
//! 仅将用户的新回复替换进 `query`。所有字段都可独立序列化。

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::memory::Message;

/// 计划中的一步：1-based 序号、工具名、参数、理由
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    #[serde(default)]
    pub step: usize,
    pub tool: String,
    #[serde(default)]
    pub args: Map<String, Value>,
    #[serde(default, alias = "rationale")]
    pub reasoning: String,
}

/// 等待用户审批的动作
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAction {
    pub tool: String,
    pub args: Map<String, Value>,
    /// 被拦截步骤在 plan 中的 0-based 下标
    pub step_index: usize,
    pub description: String,
}

/// 步骤结果表：`step_<n>` -> 工具原始输出
///
/// 只追加、不重排；序列化为 JSON 对象时保持写入顺序（`step_10` 不会排到 `step_2` 前面）。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepResults {
    entries: Vec<(String, Value)>,
}

impl StepResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key_for(index: usize) -> String {
        format!("step_{index}")
    }

    /// 记录第 `index` 步（1-based）的结果；已存在的键不会被覆盖，返回是否写入
    pub fn record(&mut self, index: usize, result: Value) -> bool {
        let key = Self::key_for(index);
        if self.contains(&key) {
            tracing::warn!(key = %key, "step result already recorded, keeping the earlier one");
            return false;
        }
        self.entries.push((key, result));
        true
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_step(&self, index: usize) -> Option<&Value> {
        self.get(&Self::key_for(index))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 已记录的最大步号（没有记录时为 0）
    pub fn highest_index(&self) -> usize {
        self.entries
            .iter()
            .filter_map(|(k, _)| k.strip_prefix("step_")?.parse::<usize>().ok())
            .max()
            .unwrap_or(0)
    }
}

impl Serialize for StepResults {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for StepResults {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct StepResultsVisitor;

        impl<'de> Visitor<'de> for StepResultsVisitor {
            type Value = StepResults;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of step keys to tool results")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::new();
                while let Some((k, v)) = access.next_entry::<String, Value>()? {
                    entries.push((k, v));
                }
                Ok(StepResults { entries })
            }
        }

        deserializer.deserialize_map(StepResultsVisitor)
    }
}

/// 一次运行的完整状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunState {
    /// 当前输入：原始请求，或恢复时用户对审批提问的回复
    pub query: String,
    pub history: Vec<Message>,
    pub session_id: String,
    /// 调用方附带的当前歌单文本（可为空）
    pub playlist_context: Option<String>,

    pub plan: Vec<PlanStep>,
    /// Planner 原始输出，便于排查
    pub plan_string: Option<String>,
    /// plan 内 0-based 游标：即将执行的步骤
    pub current_step: usize,
    /// 当前 plan 的结果键偏移：第 i 步（0-based）的结果存于 `step_{result_offset + i + 1}`
    pub result_offset: usize,
    pub step_results: StepResults,
    pub execution_complete: bool,

    pub awaiting_approval: bool,
    pub pending_action: Option<PendingAction>,
    pub user_approved: Option<bool>,

    pub needs_replan: bool,
    pub replan_reason: Option<String>,
    /// 本回合已发生的重规划次数
    pub replans: u32,

    pub formatted_response: String,
    pub error: Option<String>,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            query: String::new(),
            history: Vec::new(),
            session_id: String::new(),
            playlist_context: None,
            plan: Vec::new(),
            plan_string: None,
            current_step: 0,
            result_offset: 0,
            step_results: StepResults::new(),
            execution_complete: false,
            awaiting_approval: false,
            pending_action: None,
            user_approved: None,
            needs_replan: false,
            replan_reason: None,
            replans: 0,
            formatted_response: String::new(),
            error: None,
        }
    }
}

impl RunState {
    /// 为一条新请求创建初始状态
    pub fn new(
        query: impl Into<String>,
        session_id: impl Into<String>,
        history: Vec<Message>,
    ) -> Self {
        Self {
            query: query.into(),
            session_id: session_id.into(),
            history,
            ..Self::default()
        }
    }

    /// 从持久化的暂停状态重建，并把用户回复替换进 query
    pub fn resume_from(
        pending: Value,
        reply: impl Into<String>,
    ) -> Result<Self, serde_json::Error> {
        let mut state: RunState = serde_json::from_value(pending)?;
        state.query = reply.into();
        Ok(state)
    }

    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// 当前 plan 第 `step` 步（0-based）对应的全局结果序号（1-based）
    pub fn result_index(&self, step: usize) -> usize {
        self.result_offset + step + 1
    }

    pub fn current(&self) -> Option<&PlanStep> {
        self.plan.get(self.current_step)
    }

    pub fn plan_exhausted(&self) -> bool {
        self.current_step >= self.plan.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_step_results_keep_insertion_order() {
        let mut results = StepResults::new();
        for i in [1, 2, 10, 3] {
            results.record(i, json!({ "success": true, "n": i }));
        }
        let json = serde_json::to_string(&results).unwrap();
        let p1 = json.find("step_1\"").unwrap();
        let p2 = json.find("step_2\"").unwrap();
        let p10 = json.find("step_10\"").unwrap();
        let p3 = json.find("step_3\"").unwrap();
        assert!(p1 < p2 && p2 < p10 && p10 < p3);

        let back: StepResults = serde_json::from_str(&json).unwrap();
        assert_eq!(back, results);
        assert_eq!(back.highest_index(), 10);
    }

    #[test]
    fn test_record_never_overwrites() {
        let mut results = StepResults::new();
        assert!(results.record(1, json!({ "success": true, "first": true })));
        assert!(!results.record(1, json!({ "success": true, "first": false })));
        assert_eq!(results.get("step_1").unwrap()["first"], json!(true));
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_resume_replaces_query_only() {
        let mut state = RunState::new("save it", "s1", vec![Message::user("hi")]);
        state.plan = vec![PlanStep {
            step: 1,
            tool: "save_playlist_to_spotify".into(),
            args: Map::new(),
            reasoning: "save".into(),
        }];
        state.awaiting_approval = true;
        state.step_results.record(1, json!({ "success": true, "tracks": [] }));

        let persisted = state.to_value().unwrap();
        let resumed = RunState::resume_from(persisted, "yes do it").unwrap();

        assert_eq!(resumed.query, "yes do it");
        let mut expected = state.clone();
        expected.query = "yes do it".into();
        assert_eq!(resumed, expected);
    }

    #[test]
    fn test_plan_step_accepts_rationale_alias() {
        let step: PlanStep = serde_json::from_value(json!({
            "step": 1, "tool": "search_spotify", "args": {"query": "rock"}, "rationale": "find rock"
        }))
        .unwrap();
        assert_eq!(step.reasoning, "find rock");
    }

    #[test]
    fn test_partial_state_deserializes_with_defaults() {
        let state: RunState =
            serde_json::from_value(json!({ "query": "hi", "session_id": "s" })).unwrap();
        assert_eq!(state.current_step, 0);
        assert!(state.step_results.is_empty());
        assert!(!state.awaiting_approval);
    }
}
