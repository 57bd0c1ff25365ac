//! Executor：每次调用推进计划中的一步
//!
//! 顺序：计划耗尽则标记完成 → 解析回引参数 → 审批闸门（用户尚未同意则挂起，不调用工具）
//! → 调用工具 → 记录结果并前移游标，或置 needs_replan 交给 Replanner。
//! 工具报告的失败会记录结果；抛出的故障（含未知工具）不记录。

use std::sync::Arc;

use serde_json::Value;

use crate::core::{AgentError, PendingAction, RunState};
use crate::planning::approval::describe_save;
use crate::planning::args::resolve_args;
use crate::tools::ToolExecutor;

pub struct Executor {
    tools: Arc<ToolExecutor>,
}

impl Executor {
    pub fn new(tools: Arc<ToolExecutor>) -> Self {
        Self { tools }
    }

    pub async fn step(&self, state: &mut RunState) {
        let Some(step) = state.current().cloned() else {
            tracing::info!("execution complete, all steps finished");
            state.execution_complete = true;
            return;
        };
        let index = state.current_step;
        let result_index = state.result_index(index);
        tracing::info!(
            step = index + 1,
            of = state.plan.len(),
            result_key = result_index,
            tool = %step.tool,
            "executing step"
        );

        let args = resolve_args(&step.args, &state.step_results, &state.session_id);

        let needs_approval = self.tools.registry().requires_approval(&step.tool);
        if needs_approval && state.user_approved != Some(true) {
            let (description, prompt) = describe_save(&args);
            tracing::info!(tool = %step.tool, description = %description, "pausing for approval");
            state.awaiting_approval = true;
            state.pending_action = Some(PendingAction {
                tool: step.tool.clone(),
                args,
                step_index: index,
                description,
            });
            state.formatted_response = prompt;
            return;
        }

        match self.tools.execute(&step.tool, Value::Object(args)).await {
            Ok(result) if result.get("success").and_then(Value::as_bool) == Some(false) => {
                let error = result
                    .get("error")
                    .and_then(Value::as_str)
                    .unwrap_or("Tool execution failed")
                    .to_string();
                tracing::warn!(tool = %step.tool, error = %error, "tool reported failure");
                state.step_results.record(result_index, result);
                state.needs_replan = true;
                state.replan_reason =
                    Some(format!("Step {result_index} ({}) failed: {error}", step.tool));
            }
            Ok(result) => {
                state.step_results.record(result_index, result);
                state.current_step += 1;
                if state.plan_exhausted() {
                    state.execution_complete = true;
                }
            }
            Err(AgentError::UnknownTool(name)) => {
                tracing::error!(tool = %name, "unknown tool in plan");
                state.needs_replan = true;
                state.replan_reason = Some(format!("Step {result_index}: tool '{name}' not found"));
            }
            Err(e) => {
                tracing::error!(tool = %step.tool, error = %e, "tool raised a fault");
                state.needs_replan = true;
                state.replan_reason =
                    Some(format!("Step {result_index} ({}) error: {e}", step.tool));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::core::PlanStep;
    use crate::spotify::{CatalogError, InMemoryCatalog, Track};
    use crate::store::{MemoryStore, SessionMemory};
    use crate::tools::default_registry;

    fn executor(catalog: Arc<InMemoryCatalog>) -> Executor {
        let memory = SessionMemory::new(Arc::new(MemoryStore::new()));
        Executor::new(Arc::new(ToolExecutor::new(default_registry(catalog, memory, 10))))
    }

    fn step(n: usize, tool: &str, args: Value) -> PlanStep {
        PlanStep {
            step: n,
            tool: tool.into(),
            args: args.as_object().cloned().unwrap_or_default(),
            reasoning: String::new(),
        }
    }

    fn catalog() -> Arc<InMemoryCatalog> {
        let t = |id: &str| Track {
            name: format!("song {id}"),
            artist: "artist".into(),
            album: "album".into(),
            uri: format!("spotify:track:{id}"),
            release_date: "2010".into(),
        };
        Arc::new(InMemoryCatalog::new(vec![t("a"), t("b"), t("c")]))
    }

    fn search_then_save() -> RunState {
        let mut state = RunState::new("save workout songs", "s1", vec![]);
        state.plan = vec![
            step(1, "search_spotify", json!({ "query": "song" })),
            step(
                2,
                "save_playlist_to_spotify",
                json!({ "playlist_name": "Workout Mix", "tracks": "RESULT_STEP_1" }),
            ),
        ];
        state
    }

    #[tokio::test]
    async fn test_runs_and_advances() {
        let exec = executor(catalog());
        let mut state = RunState::new("q", "s1", vec![]);
        state.plan = vec![step(1, "search_spotify", json!({ "query": "song" }))];

        exec.step(&mut state).await;
        assert_eq!(state.current_step, 1);
        assert_eq!(state.step_results.get("step_1").unwrap()["count"], json!(3));
        assert!(state.execution_complete);

        // 计划已耗尽：再次调用只标记完成
        exec.step(&mut state).await;
        assert_eq!(state.step_results.len(), 1);
    }

    #[tokio::test]
    async fn test_approval_gate_is_idempotent() {
        let catalog = catalog();
        let exec = executor(catalog.clone());
        let mut state = search_then_save();
        exec.step(&mut state).await;
        state.user_approved = Some(false);

        let mut seen = Vec::new();
        for _ in 0..3 {
            let mut attempt = state.clone();
            exec.step(&mut attempt).await;
            assert!(attempt.awaiting_approval);
            assert_eq!(attempt.current_step, 1);
            seen.push(attempt.pending_action.clone().unwrap());
        }
        assert!(catalog.created_playlists().is_empty());
        assert!(seen.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(seen[0].description, "Create 'Workout Mix' (3 tracks) on your Spotify");
        assert_eq!(seen[0].step_index, 1);
        assert_eq!(seen[0].args["tracks"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_approved_save_runs() {
        let catalog = catalog();
        let exec = executor(catalog.clone());
        let mut state = search_then_save();
        state.user_approved = Some(true);
        exec.step(&mut state).await;
        exec.step(&mut state).await;

        assert!(!state.awaiting_approval);
        assert_eq!(state.step_results.get("step_2").unwrap()["track_count"], json!(3));
        assert_eq!(catalog.created_playlists().len(), 1);
        assert!(state.execution_complete);
    }

    #[tokio::test]
    async fn test_reported_failure_recorded_and_replans() {
        let catalog = Arc::new(
            InMemoryCatalog::new(vec![])
                .failing_search(CatalogError::Request("connection reset".into())),
        );
        let exec = executor(catalog);
        let mut state = RunState::new("q", "s1", vec![]);
        state.plan = vec![step(1, "search_spotify", json!({ "query": "rock" }))];

        exec.step(&mut state).await;
        assert!(state.needs_replan);
        assert_eq!(state.current_step, 0);
        assert_eq!(state.step_results.get("step_1").unwrap()["success"], json!(false));
        let reason = state.replan_reason.unwrap();
        assert!(reason.starts_with("Step 1 (search_spotify) failed:"));
        assert!(reason.contains("connection reset"));
    }

    #[tokio::test]
    async fn test_faults_do_not_record() {
        let exec = executor(catalog());
        let mut state = RunState::new("q", "s1", vec![]);
        state.plan = vec![step(1, "play_music", json!({}))];
        exec.step(&mut state).await;
        assert!(state.needs_replan);
        assert!(state.error.is_none());
        assert!(state.replan_reason.as_deref().unwrap().contains("play_music"));
        assert!(state.step_results.is_empty());

        let mut state = RunState::new("q", "s1", vec![]);
        state.plan = vec![step(1, "search_spotify", json!({ "limit": 5 }))];
        exec.step(&mut state).await;
        assert!(state.needs_replan);
        let reason = state.replan_reason.as_deref().unwrap();
        assert!(reason.starts_with("Step 1 (search_spotify) error:"));
        assert!(state.step_results.is_empty());
    }

    #[tokio::test]
    async fn test_result_keys_follow_offset() {
        let exec = executor(catalog());
        let mut state = RunState::new("q", "s1", vec![]);
        state.step_results.record(1, json!({ "success": true, "tracks": [] }));
        state.result_offset = 1;
        state.plan = vec![step(2, "search_spotify", json!({ "query": "song" }))];

        exec.step(&mut state).await;
        assert!(state.step_results.contains("step_1"));
        assert!(state.step_results.contains("step_2"));
        assert_eq!(state.current_step, 1);
    }
}
