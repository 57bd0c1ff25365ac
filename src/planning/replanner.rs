//! Replanner：某步失败后，基于已完成的结果为剩余工作生成新计划
//!
//! 新计划整体替换旧计划，游标归零；已记录的结果全部保留，新计划的结果键从已记录的最大步号之后开始，
//! 旧结果仍可用原键回引。模型判定无法完成时直接结束本轮。
//! 解析失败或调用故障不会再次进入 Replanner：本轮以道歉消息终止。重规划次数受 max_replans 限制。

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;

use crate::core::{PlanStep, RunState};
use crate::llm::LlmClient;
use crate::memory::Message;
use crate::planning::extract::parse_json;
use crate::prompts::{PromptLibrary, REPLANNER};
use crate::tools::ToolExecutor;

pub const RECOVERY_FAILED_RESPONSE: &str =
    "Sorry, I encountered an error and couldn't recover. Please try again.";

#[derive(Debug, Deserialize)]
struct ReplannerReply {
    #[serde(default)]
    plan: Vec<PlanStep>,
    #[serde(default)]
    message: String,
    #[serde(default)]
    cannot_fulfill: bool,
}

fn unrecoverable(reason: &str) -> String {
    format!("Sorry, I ran into an issue: {reason}. Please try rephrasing your request.")
}

pub struct Replanner {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLibrary>,
    tools: Arc<ToolExecutor>,
    max_replans: u32,
}

impl Replanner {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        prompts: Arc<PromptLibrary>,
        tools: Arc<ToolExecutor>,
        max_replans: u32,
    ) -> Self {
        Self {
            llm,
            prompts,
            tools,
            max_replans,
        }
    }

    fn build_prompt(
        &self,
        state: &RunState,
        reason: &str,
    ) -> Result<String, crate::core::AgentError> {
        let completed: Vec<_> = state.plan[..state.current_step.min(state.plan.len())]
            .iter()
            .enumerate()
            .map(|(i, step)| {
                let index = state.result_index(i);
                let success = state
                    .step_results
                    .get_step(index)
                    .map(|r| r.get("success").and_then(|s| s.as_bool()).unwrap_or(true))
                    .unwrap_or(false);
                json!({ "step": index, "tool": step.tool, "success": success })
            })
            .collect();
        let failed = state.current().map(|s| json!(s)).unwrap_or_else(|| json!({}));
        let recorded = if state.step_results.is_empty() {
            "none".to_string()
        } else {
            state.step_results.iter().map(|(k, _)| k).collect::<Vec<_>>().join(", ")
        };
        let next_step = (state.step_results.highest_index() + 1).to_string();

        let original_plan = serde_json::to_string_pretty(&state.plan)?;
        let completed = serde_json::to_string_pretty(&completed)?;
        let failed = serde_json::to_string_pretty(&failed)?;
        let tools = self.tools.registry().describe_for_prompt();

        self.prompts.get_prompt(
            REPLANNER,
            &[
                ("query", state.query.as_str()),
                ("original_plan", original_plan.as_str()),
                ("completed_steps", completed.as_str()),
                ("failed_step", failed.as_str()),
                ("error", reason),
                ("recorded_results", recorded.as_str()),
                ("next_step", next_step.as_str()),
                ("tools", tools.as_str()),
            ],
        )
    }

    fn give_up(state: &mut RunState, error: String, response: String) {
        state.error = Some(error);
        state.execution_complete = true;
        state.needs_replan = false;
        state.formatted_response = response;
    }

    pub async fn run(&self, state: &mut RunState) {
        let reason = state
            .replan_reason
            .clone()
            .unwrap_or_else(|| "Unknown error".to_string());
        tracing::info!(reason = %reason, attempt = state.replans + 1, "replanner invoked");

        if state.replans >= self.max_replans {
            tracing::warn!(max = self.max_replans, "replan limit reached");
            Self::give_up(state, format!("Replan limit reached: {reason}"), unrecoverable(&reason));
            return;
        }
        state.replans += 1;

        let prompt = match self.build_prompt(state, &reason) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(error = %e, "could not build replanner prompt");
                Self::give_up(
                    state,
                    format!("Replanning failed: {e}"),
                    RECOVERY_FAILED_RESPONSE.to_string(),
                );
                return;
            }
        };

        let raw = match self
            .llm
            .complete(&[
                Message::system(prompt),
                Message::user(format!("Replan to handle the failure: {reason}")),
            ])
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                tracing::error!(error = %e, "replanner model call failed");
                Self::give_up(
                    state,
                    format!("Replanning failed: {e}"),
                    RECOVERY_FAILED_RESPONSE.to_string(),
                );
                return;
            }
        };
        tracing::debug!(raw = %raw, "replanner raw output");

        let reply: ReplannerReply = match parse_json(&raw) {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(error = %e, "failed to parse replanner response");
                Self::give_up(
                    state,
                    format!("Could not recover from error: {reason}"),
                    unrecoverable(&reason),
                );
                return;
            }
        };

        if reply.cannot_fulfill || reply.plan.is_empty() {
            let message = match reply.message.trim() {
                "" => "Unable to fulfill the request".to_string(),
                m => m.to_string(),
            };
            tracing::info!(message = %message, "replanner determined goal cannot be fulfilled");
            state.execution_complete = true;
            state.needs_replan = false;
            state.formatted_response = message;
            return;
        }

        let offset = state.step_results.highest_index();
        tracing::info!(
            steps = reply.plan.len(),
            offset,
            message = %reply.message,
            "replanner created new plan"
        );
        state.plan = reply
            .plan
            .into_iter()
            .enumerate()
            .map(|(i, mut step)| {
                if step.step == 0 {
                    step.step = offset + i + 1;
                }
                step
            })
            .collect();
        state.current_step = 0;
        state.result_offset = offset;
        state.needs_replan = false;
        state.replan_reason = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    use crate::llm::{LlmError, MockLlmClient};
    use crate::spotify::InMemoryCatalog;
    use crate::store::{MemoryStore, SessionMemory};
    use crate::tools::default_registry;

    fn replanner(llm: Arc<MockLlmClient>, max_replans: u32) -> Replanner {
        let memory = SessionMemory::new(Arc::new(MemoryStore::new()));
        let tools = default_registry(Arc::new(InMemoryCatalog::demo()), memory, 10);
        Replanner::new(
            llm,
            Arc::new(PromptLibrary::new()),
            Arc::new(ToolExecutor::new(tools)),
            max_replans,
        )
    }

    fn step(tool: &str, args: Value) -> PlanStep {
        PlanStep {
            step: 0,
            tool: tool.into(),
            args: args.as_object().cloned().unwrap_or_default(),
            reasoning: String::new(),
        }
    }

    /// 第 1 步成功、第 2 步失败后的状态
    fn failed_at_step_two() -> RunState {
        let mut state = RunState::new("make me a rock playlist", "s1", vec![]);
        state.plan = vec![
            step("search_spotify", json!({ "query": "rock" })),
            step("search_spotify", json!({ "query": "classic rock" })),
            step(
                "commit_playlist_to_memory",
                json!({ "playlist_name": "Rock", "tracks": "RESULT_STEP_1" }),
            ),
        ];
        state.step_results.record(1, json!({ "success": true, "tracks": [{"uri": "u1"}] }));
        state
            .step_results
            .record(2, json!({ "success": false, "error": "rate limited", "tracks": [] }));
        state.current_step = 1;
        state.needs_replan = true;
        state.replan_reason = Some("Step 2 (search_spotify) failed: rate limited".into());
        state
    }

    #[tokio::test]
    async fn test_new_plan_keeps_prior_results() {
        let llm = Arc::new(MockLlmClient::scripted([r#"{"plan": [
            {"tool": "commit_playlist_to_memory",
             "args": {"playlist_name": "Rock", "tracks": "RESULT_STEP_1"}}
        ], "message": "Skip the second search"}"#]));
        let mut state = failed_at_step_two();
        replanner(llm.clone(), 2).run(&mut state).await;

        assert_eq!(state.plan.len(), 1);
        assert_eq!(state.plan[0].step, 3);
        assert_eq!(state.current_step, 0);
        assert_eq!(state.result_offset, 2);
        assert_eq!(state.result_index(0), 3);
        assert!(!state.needs_replan);
        assert!(state.replan_reason.is_none());
        assert_eq!(state.replans, 1);
        assert_eq!(state.step_results.get("step_1").unwrap()["tracks"][0]["uri"], json!("u1"));
        assert!(state.step_results.contains("step_2"));

        let system = &llm.call(0).unwrap()[0].content;
        assert!(system.contains("rate limited"));
        assert!(system.contains("step_1, step_2"));
        assert!(system.contains("starting at step 3"));
        assert!(system.contains("\"classic rock\""));
    }

    #[tokio::test]
    async fn test_cannot_fulfill_ends_run() {
        let llm = Arc::new(MockLlmClient::scripted([
            r#"{"plan": [], "message": "Spotify is unreachable right now.",
                "cannot_fulfill": true}"#,
        ]));
        let mut state = failed_at_step_two();
        replanner(llm, 2).run(&mut state).await;

        assert!(state.execution_complete);
        assert!(!state.needs_replan);
        assert!(state.error.is_none());
        assert_eq!(state.formatted_response, "Spotify is unreachable right now.");
    }

    #[tokio::test]
    async fn test_unparseable_reply_terminates() {
        let llm = Arc::new(MockLlmClient::scripted(["I am not sure what to do."]));
        let mut state = failed_at_step_two();
        replanner(llm, 2).run(&mut state).await;

        assert!(state.execution_complete);
        assert!(state.error.is_some());
        assert_eq!(
            state.formatted_response,
            "Sorry, I ran into an issue: Step 2 (search_spotify) failed: rate limited. \
             Please try rephrasing your request."
        );
    }

    #[tokio::test]
    async fn test_model_fault_terminates() {
        let llm =
            Arc::new(MockLlmClient::with_results([Err(LlmError::ApiError("timeout".into()))]));
        let mut state = failed_at_step_two();
        replanner(llm, 2).run(&mut state).await;

        assert!(state.execution_complete);
        assert_eq!(state.formatted_response, RECOVERY_FAILED_RESPONSE);
    }

    #[tokio::test]
    async fn test_limit_reached_skips_model() {
        let llm = Arc::new(MockLlmClient::scripted([
            r#"{"plan": [{"tool": "search_spotify", "args": {}}]}"#,
        ]));
        let mut state = failed_at_step_two();
        state.replans = 1;
        replanner(llm.clone(), 1).run(&mut state).await;

        assert_eq!(llm.call_count(), 0);
        assert!(state.execution_complete);
        assert!(state.error.as_deref().unwrap().starts_with("Replan limit reached"));
    }
}
