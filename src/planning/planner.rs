//! Planner：把用户请求转为基于工具集的多步计划
//!
//! 上下文 = 最近 N 轮对话 + 会话已保存歌单快照 + 调用方附带的当前歌单；
//! 模型回复中提取一个含 `plan` 数组的 JSON 对象。解析失败或空计划是终止性错误，不重试。
//! 若模型声明 `requires_approval` 且计划含需审批的工具，立即暂停等待确认，不执行任何步骤。

use std::sync::Arc;

use serde::Deserialize;

use crate::core::{AgentError, PendingAction, PlanStep, RunState, StepResults};
use crate::llm::LlmClient;
use crate::memory::{format_history, Message};
use crate::planning::approval::describe_save;
use crate::planning::args::resolve_available_args;
use crate::planning::extract::parse_json;
use crate::prompts::{PromptLibrary, PLANNER};
use crate::store::SessionMemory;
use crate::tools::ToolExecutor;

/// 模型输出的计划
#[derive(Debug, Deserialize)]
struct PlannerReply {
    plan: Vec<PlanStep>,
    #[serde(default)]
    requires_approval: bool,
    #[serde(default)]
    approval_message: String,
}

pub struct Planner {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLibrary>,
    tools: Arc<ToolExecutor>,
    memory: SessionMemory,
    history_window: usize,
}

impl Planner {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        prompts: Arc<PromptLibrary>,
        tools: Arc<ToolExecutor>,
        memory: SessionMemory,
        history_window: usize,
    ) -> Self {
        Self {
            llm,
            prompts,
            tools,
            memory,
            history_window,
        }
    }

    /// 已保存歌单快照：`- name (N tracks)` 行
    async fn saved_playlists(&self, session_id: &str) -> String {
        match self.memory.playlists(session_id).await {
            Ok(playlists) if playlists.is_empty() => "No saved playlists yet.".to_string(),
            Ok(playlists) => playlists
                .iter()
                .map(|p| format!("- {} ({} tracks)", p.name, p.track_count))
                .collect::<Vec<_>>()
                .join("\n"),
            Err(e) => {
                tracing::warn!(error = %e, "could not fetch saved playlists");
                "Unable to fetch saved playlists.".to_string()
            }
        }
    }

    async fn build_prompt(&self, state: &RunState) -> Result<String, AgentError> {
        let history = format_history(&state.history, self.history_window);
        let saved = self.saved_playlists(&state.session_id).await;
        let current = state
            .playlist_context
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or("No current playlist.");
        let tools = self.tools.registry().describe_for_prompt();
        self.prompts.get_prompt(
            PLANNER,
            &[
                ("tools", tools.as_str()),
                ("history", history.as_str()),
                ("saved_playlists", saved.as_str()),
                ("current_playlist", current),
                ("query", state.query.as_str()),
            ],
        )
    }

    pub async fn run(&self, state: &mut RunState) {
        tracing::info!(query = %state.query, "planner processing query");

        let prompt = match self.build_prompt(state).await {
            Ok(p) => p,
            Err(e) => {
                state.error = Some(format!("Planner failed: {e}"));
                return;
            }
        };

        let raw = match self
            .llm
            .complete(&[Message::system(prompt), Message::user(state.query.clone())])
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                tracing::error!(error = %e, "planner model call failed");
                state.error = Some(format!("Planner failed: {e}"));
                return;
            }
        };
        tracing::debug!(raw = %raw, "planner raw output");
        state.plan_string = Some(raw.clone());

        let reply: PlannerReply = match parse_json(&raw) {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(error = %e, "failed to parse plan");
                state.error = Some("Failed to parse plan from LLM response".to_string());
                return;
            }
        };
        if reply.plan.is_empty() {
            state.error = Some("Planner returned an empty plan".to_string());
            return;
        }

        let plan: Vec<PlanStep> = reply
            .plan
            .into_iter()
            .enumerate()
            .map(|(i, mut step)| {
                if step.step == 0 {
                    step.step = i + 1;
                }
                step
            })
            .collect();
        tracing::info!(
            steps = plan.len(),
            requires_approval = reply.requires_approval,
            "planner created plan"
        );

        state.plan = plan;
        state.current_step = 0;
        state.result_offset = 0;
        state.step_results = StepResults::new();
        state.execution_complete = false;

        if reply.requires_approval {
            self.gate_before_execution(state, &reply.approval_message);
        }
    }

    /// 计划声明需要审批时，在执行前就挂起到第一个需审批的步骤
    fn gate_before_execution(&self, state: &mut RunState, approval_message: &str) {
        let registry = self.tools.registry();
        let Some((index, step)) = state
            .plan
            .iter()
            .enumerate()
            .find(|(_, s)| registry.requires_approval(&s.tool))
        else {
            return;
        };

        // 尚未执行的步骤的回引保持原样，提问里不报曲目数
        let args = resolve_available_args(&step.args, &state.step_results, &state.session_id);
        let (description, prompt) = describe_save(&args);
        let (description, prompt) = match approval_message.trim() {
            "" => (description, prompt),
            message => (message.to_string(), message.to_string()),
        };

        tracing::info!(
            step = index + 1,
            tool = %step.tool,
            "plan requires approval before execution"
        );
        state.pending_action = Some(PendingAction {
            tool: step.tool.clone(),
            args,
            step_index: index,
            description,
        });
        state.awaiting_approval = true;
        state.formatted_response = prompt;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::llm::MockLlmClient;
    use crate::spotify::InMemoryCatalog;
    use crate::store::{MemoryStore, SavedPlaylist};
    use crate::tools::default_registry;

    fn planner(llm: Arc<MockLlmClient>, memory: SessionMemory) -> Planner {
        let tools = default_registry(Arc::new(InMemoryCatalog::demo()), memory.clone(), 10);
        Planner::new(
            llm,
            Arc::new(PromptLibrary::new()),
            Arc::new(ToolExecutor::new(tools)),
            memory,
            10,
        )
    }

    fn memory() -> SessionMemory {
        SessionMemory::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_single_step_plan() {
        let llm = Arc::new(MockLlmClient::scripted([
            r#"Here you go: {"plan": [{"step": 1, "tool": "search_spotify",
                "args": {"query": "upbeat pop"}, "reasoning": "find songs"}],
                "requires_approval": false}"#,
        ]));
        let mut state = RunState::new("find me upbeat pop songs", "s1", vec![]);
        planner(llm.clone(), memory()).run(&mut state).await;

        assert!(state.error.is_none());
        assert_eq!(state.plan.len(), 1);
        assert_eq!(state.plan[0].tool, "search_spotify");
        assert_eq!(state.plan[0].args["query"], "upbeat pop");
        assert!(!state.awaiting_approval);
        assert!(state.plan_string.as_deref().unwrap().starts_with("Here you go"));

        let sent = llm.call(0).unwrap();
        assert!(sent[0].content.contains("search_spotify"));
        assert!(sent[0].content.contains("No previous conversation."));
        assert!(sent[0].content.contains("No saved playlists yet."));
        assert_eq!(sent[1], Message::user("find me upbeat pop songs"));
    }

    #[tokio::test]
    async fn test_context_includes_history_playlists_and_current_playlist() {
        let memory = memory();
        memory
            .save_playlist(
                "s1",
                SavedPlaylist {
                    name: "Chill".into(),
                    tracks: vec![],
                    description: String::new(),
                    track_count: 4,
                    saved_at: Utc::now(),
                },
            )
            .await
            .unwrap();
        let history: Vec<Message> = (0..12).map(|i| Message::user(format!("turn {i}"))).collect();
        let llm = Arc::new(MockLlmClient::scripted([
            r#"{"plan": [{"tool": "search_spotify", "args": {"query": "x"}}]}"#,
        ]));

        let mut state = RunState::new("more like this", "s1", history);
        state.playlist_context = Some("1. Levitating - Dua Lipa".into());
        planner(llm.clone(), memory).run(&mut state).await;

        let system = &llm.call(0).unwrap()[0].content;
        assert!(system.contains("- Chill (4 tracks)"));
        assert!(system.contains("1. Levitating - Dua Lipa"));
        assert!(system.contains("user: turn 11"));
        assert!(system.contains("user: turn 2"));
        assert!(!system.contains("user: turn 1\n"));
        assert_eq!(state.plan[0].step, 1);
    }

    #[tokio::test]
    async fn test_approval_short_circuit() {
        let llm = Arc::new(MockLlmClient::scripted([r#"{
            "plan": [
                {"step": 1, "tool": "search_spotify", "args": {"query": "workout"}},
                {"step": 2, "tool": "save_playlist_to_spotify",
                    "args": {"playlist_name": "Workout Mix", "tracks": "RESULT_STEP_1"}}
            ],
            "requires_approval": true,
            "approval_message": "Shall I create 'Workout Mix' on your Spotify?"
        }"#]));
        let mut state = RunState::new("save this as 'Workout Mix' to my Spotify", "s1", vec![]);
        planner(llm, memory()).run(&mut state).await;

        assert!(state.awaiting_approval);
        let pending = state.pending_action.as_ref().unwrap();
        assert_eq!(pending.tool, "save_playlist_to_spotify");
        assert_eq!(pending.step_index, 1);
        assert_eq!(pending.args["session_id"], "s1");
        assert_eq!(pending.description, "Shall I create 'Workout Mix' on your Spotify?");
        assert_eq!(state.formatted_response, "Shall I create 'Workout Mix' on your Spotify?");
        assert_eq!(state.current_step, 0);
        assert!(state.step_results.is_empty());
    }

    #[tokio::test]
    async fn test_approval_prompt_without_message_skips_unknown_count() {
        let llm = Arc::new(MockLlmClient::scripted([r#"{
            "plan": [
                {"step": 1, "tool": "search_spotify", "args": {"query": "workout"}},
                {"step": 2, "tool": "save_playlist_to_spotify",
                 "args": {"playlist_name": "Workout Mix", "tracks": "RESULT_STEP_1"}}
            ],
            "requires_approval": true
        }"#]));
        let mut state = RunState::new("save this as 'Workout Mix' to my Spotify", "s1", vec![]);
        planner(llm, memory()).run(&mut state).await;

        assert!(state.awaiting_approval);
        assert!(!state.formatted_response.contains("0 tracks"));
        assert!(state.formatted_response.contains("from the search results"));
        let pending = state.pending_action.as_ref().unwrap();
        assert_eq!(pending.args["tracks"], "RESULT_STEP_1");
        assert_eq!(pending.args["session_id"], "s1");
        assert_eq!(
            pending.description,
            "Create 'Workout Mix' on your Spotify from the earlier results"
        );
    }

    #[tokio::test]
    async fn test_approval_flag_without_gated_step_is_ignored() {
        let llm = Arc::new(MockLlmClient::scripted([
            r#"{"plan": [{"tool": "search_spotify", "args": {"query": "x"}}],
                "requires_approval": true}"#,
        ]));
        let mut state = RunState::new("x", "s1", vec![]);
        planner(llm, memory()).run(&mut state).await;
        assert!(!state.awaiting_approval);
        assert!(state.pending_action.is_none());
    }

    #[tokio::test]
    async fn test_parse_failures_are_terminal() {
        for reply in ["I'd love to help!", r#"{"steps": []}"#, r#"{"plan": []}"#] {
            let llm = Arc::new(MockLlmClient::scripted([reply]));
            let mut state = RunState::new("x", "s1", vec![]);
            planner(llm.clone(), memory()).run(&mut state).await;
            assert!(state.error.is_some(), "reply {reply:?} should fail");
            assert!(state.plan.is_empty());
            assert_eq!(llm.call_count(), 1);
        }
    }
}
