//! Agent 运行时：请求 / 响应边界
//!
//! 供终端客户端与 HTTP 服务调用：handle_query 接收一条请求，
//! 决定是新回合还是审批恢复，跑完工作流后写回对话历史与待审批状态，并返回响应。
//! 同一会话的请求由进程内会话锁串行化；跨进程的并发仍可能交错。

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::config::{AgentSection, AppConfig};
use crate::core::{AgentError, RunState};
use crate::llm::{create_llm_from_config, LlmClient};
use crate::memory::{prune_history, Message};
use crate::prompts::PromptLibrary;
use crate::spotify::{collect_tracks, Catalog, InMemoryCatalog, SpotifyClient, Track};
use crate::store::{create_store, SessionMemory, SessionStore};
use crate::tools::{default_registry, ToolExecutor};
use crate::workflow::{RunOutcome, Workflow};

const FALLBACK_RESPONSE: &str = "Sorry, I don't have a response for that. Could you try again?";

/// 请求
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    pub session_id: String,
    /// 调用方自带的历史；缺省时使用会话存储中的历史
    #[serde(default)]
    pub history: Option<Vec<Message>>,
    /// 当前歌单文本，作为 Planner 上下文
    #[serde(default)]
    pub playlist: Option<String>,
    /// 上次响应返回的待审批状态；缺省时从会话存储读取
    #[serde(default)]
    pub pending_state: Option<Value>,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            session_id: session_id.into(),
            ..Self::default()
        }
    }
}

/// 响应
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub response: String,
    pub state: Value,
    /// 本回合所有结果中的曲目（按 URI 去重）
    pub playlist: Vec<Track>,
    pub awaiting_approval: bool,
    /// 仅在等待审批时返回，调用方需原样带回
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_state: Option<Value>,
}

pub struct AgentRuntime {
    workflow: Workflow,
    memory: SessionMemory,
    max_history_turns: usize,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl AgentRuntime {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        catalog: Arc<dyn Catalog>,
        store: Arc<dyn SessionStore>,
        prompts: PromptLibrary,
        cfg: &AgentSection,
    ) -> Self {
        let memory = SessionMemory::new(store);
        let tools = Arc::new(ToolExecutor::new(default_registry(
            catalog,
            memory.clone(),
            cfg.default_search_limit,
        )));
        let workflow = Workflow::new(llm, tools, Arc::new(prompts), memory.clone(), cfg);
        Self {
            workflow,
            memory,
            max_history_turns: cfg.max_history_turns,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// 按配置构建全部客户端（进程启动时调用一次）
    pub fn from_config(cfg: &AppConfig) -> Result<Self, AgentError> {
        let llm = create_llm_from_config(&cfg.llm)?;
        tracing::info!(llm = %llm.describe(), "LLM client ready");

        let catalog: Arc<dyn Catalog> = if cfg.spotify.offline {
            tracing::info!("Spotify offline mode: using the built-in demo catalog");
            Arc::new(InMemoryCatalog::demo())
        } else {
            let token = cfg
                .spotify
                .access_token
                .clone()
                .or_else(|| std::env::var("SPOTIFY_ACCESS_TOKEN").ok())
                .filter(|t| !t.is_empty());
            if token.is_none() {
                tracing::warn!(
                    "no Spotify access token configured, catalog calls will be rejected"
                );
            }
            Arc::new(SpotifyClient::new(
                cfg.spotify.api_base.clone(),
                token,
                cfg.spotify.timeout_secs,
            ))
        };

        let store = create_store(&cfg.store)?;
        let prompts = PromptLibrary::load(cfg.app.prompts_dir.as_deref())
            .map_err(|e| AgentError::ConfigError(format!("failed to load prompts: {e}")))?;

        Ok(Self::new(llm, catalog, store, prompts, &cfg.agent))
    }

    pub fn memory(&self) -> &SessionMemory {
        &self.memory
    }

    async fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .await
            .entry(session_id.to_string())
            .or_default()
            .clone()
    }

    async fn release_lock(&self, session_id: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        // 只剩映射表与当前持有者时移除
        if Arc::strong_count(&lock) <= 2 {
            locks.remove(session_id);
        }
    }

    pub async fn handle_query(&self, req: QueryRequest) -> Result<QueryResponse, AgentError> {
        if req.session_id.trim().is_empty() {
            return Err(AgentError::InvalidRequest("session_id is required".into()));
        }
        let lock = self.session_lock(&req.session_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.process(req.clone()).await
        };
        self.release_lock(&req.session_id, lock).await;
        result
    }

    async fn process(&self, req: QueryRequest) -> Result<QueryResponse, AgentError> {
        let session_id = req.session_id.as_str();
        let history = match req.history {
            Some(h) => h,
            None => self.memory.history(session_id).await?,
        };
        let pending = match req.pending_state {
            Some(p) => Some(p),
            None => self.memory.pending_state(session_id).await?,
        };

        let resumed = match pending {
            Some(p) => {
                Some(RunState::resume_from(p, req.query.clone())?).filter(|s| s.awaiting_approval)
            }
            None => None,
        };
        let state = match resumed {
            Some(mut state) => {
                tracing::info!(session_id = %session_id, "resuming run paused for approval");
                state.session_id = session_id.to_string();
                state
            }
            None => {
                let mut state = RunState::new(req.query.clone(), session_id, history.clone());
                state.playlist_context = req.playlist.clone().filter(|p| !p.trim().is_empty());
                state
            }
        };

        let (state, outcome) = self.workflow.run(state).await;

        let response = match state.formatted_response.trim() {
            "" => FALLBACK_RESPONSE.to_string(),
            text => text.to_string(),
        };
        let playlist = collect_tracks(state.step_results.iter().map(|(_, v)| v));
        let state_value = state.to_value()?;

        let mut history = history;
        history.push(Message::user(req.query));
        history.push(Message::assistant(response.clone()));
        prune_history(&mut history, self.max_history_turns);
        self.memory.set_history(session_id, &history).await?;

        let awaiting_approval = outcome == RunOutcome::Suspended;
        let pending_state = if awaiting_approval {
            self.memory.set_pending_state(session_id, state_value.clone()).await?;
            Some(state_value.clone())
        } else {
            self.memory.clear_pending_state(session_id).await?;
            None
        };

        Ok(QueryResponse {
            response,
            state: state_value,
            playlist,
            awaiting_approval,
            pending_state,
        })
    }
}
