//! 工作流引擎：按路由逐个驱动节点，直到结束或挂起
//!
//! 同一 RunState 上任何时刻只有一个节点在运行；节点数超过 max_transitions 时强制转入 Formatter 并报错结束。

use std::sync::Arc;

use crate::config::AgentSection;
use crate::core::RunState;
use crate::llm::LlmClient;
use crate::planning::{ApprovalHandler, Executor, Formatter, Planner, Replanner};
use crate::prompts::PromptLibrary;
use crate::store::SessionMemory;
use crate::tools::ToolExecutor;
use crate::workflow::route::{self, Node};

/// 一次运行的结局
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    /// 等待用户审批，RunState 需外置保存
    Suspended,
}

pub struct Workflow {
    planner: Planner,
    executor: Executor,
    approval: ApprovalHandler,
    replanner: Replanner,
    formatter: Formatter,
    max_transitions: usize,
}

impl Workflow {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        tools: Arc<ToolExecutor>,
        prompts: Arc<PromptLibrary>,
        memory: SessionMemory,
        cfg: &AgentSection,
    ) -> Self {
        Self {
            planner: Planner::new(
                llm.clone(),
                prompts.clone(),
                tools.clone(),
                memory,
                cfg.history_window,
            ),
            executor: Executor::new(tools.clone()),
            approval: ApprovalHandler::new(llm.clone(), prompts.clone()),
            replanner: Replanner::new(llm.clone(), prompts.clone(), tools, cfg.max_replans),
            formatter: Formatter::new(llm, prompts, cfg.summary_track_limit),
            max_transitions: cfg.max_transitions,
        }
    }

    async fn dispatch(&self, node: Node, state: &mut RunState) {
        match node {
            Node::Planner => self.planner.run(state).await,
            Node::ApprovalHandler => self.approval.run(state).await,
            Node::Executor => self.executor.step(state).await,
            Node::Replanner => self.replanner.run(state).await,
            Node::Formatter => self.formatter.run(state).await,
            Node::Suspend | Node::End => {}
        }
    }

    /// 运行到结束或挂起；新请求从 Planner 开始，审批恢复从 Approval Handler 开始
    pub async fn run(&self, mut state: RunState) -> (RunState, RunOutcome) {
        let mut node = route::entry(&state);
        let mut transitions = 0usize;

        while !node.is_terminal() {
            transitions += 1;
            if transitions > self.max_transitions && node != Node::Formatter {
                tracing::error!(max = self.max_transitions, "run exceeded transition limit");
                state.error = Some(format!(
                    "Stopped after {} steps without finishing",
                    self.max_transitions
                ));
                state.formatted_response.clear();
                node = Node::Formatter;
            }
            tracing::info!(node = ?node, step = state.current_step, "workflow transition");
            self.dispatch(node, &mut state).await;
            node = route::next(node, &state);
        }

        let outcome = match node {
            Node::Suspend => RunOutcome::Suspended,
            _ => RunOutcome::Completed,
        };
        tracing::info!(?outcome, session_id = %state.session_id, "run finished");
        (state, outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::spotify::InMemoryCatalog;
    use crate::store::MemoryStore;
    use crate::tools::default_registry;

    fn workflow(llm: MockLlmClient, cfg: AgentSection) -> Workflow {
        let memory = SessionMemory::new(Arc::new(MemoryStore::new()));
        let tools = default_registry(Arc::new(InMemoryCatalog::demo()), memory.clone(), 10);
        Workflow::new(
            Arc::new(llm),
            Arc::new(ToolExecutor::new(tools)),
            Arc::new(PromptLibrary::new()),
            memory,
            &cfg,
        )
    }

    #[tokio::test]
    async fn test_search_run_completes() {
        let llm = MockLlmClient::scripted([
            r#"{"plan": [{"step": 1, "tool": "search_spotify", "args": {"query": "queen"}}]}"#,
            "Queen it is!",
        ]);
        let (state, outcome) = workflow(llm, AgentSection::default())
            .run(RunState::new("play some queen", "s1", vec![]))
            .await;

        assert_eq!(outcome, RunOutcome::Completed);
        assert!(state.execution_complete);
        assert_eq!(state.formatted_response, "Queen it is!");
        assert!(state.step_results.contains("step_1"));
    }

    #[tokio::test]
    async fn test_transition_limit_stops_run() {
        let plan = (1..=10)
            .map(|i| {
                format!(r#"{{"step": {i}, "tool": "search_spotify", "args": {{"query": "q{i}"}}}}"#)
            })
            .collect::<Vec<_>>()
            .join(",");
        let llm = MockLlmClient::scripted([format!(r#"{{"plan": [{plan}]}}"#)]);
        let cfg = AgentSection {
            max_transitions: 4,
            ..AgentSection::default()
        };
        let (state, outcome) = workflow(llm, cfg).run(RunState::new("lots", "s1", vec![])).await;

        assert_eq!(outcome, RunOutcome::Completed);
        assert!(state.error.as_deref().unwrap().starts_with("Stopped after 4 steps"));
        assert!(state.formatted_response.starts_with("Oops! I ran into a problem:"));
        assert_eq!(state.step_results.len(), 3);
    }
}
