//! Approval Handler：解读用户对审批提问的自由文本回复
//!
//! 先让模型判定 approve / reject / other；模型调用失败或输出无法解析时退回关键词判定。
//! 判定不明确永远不是错误：保持暂停并换一种更窄的问法再问一次。

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::core::RunState;
use crate::llm::LlmClient;
use crate::memory::Message;
use crate::planning::args::back_reference;
use crate::planning::extract::parse_json;
use crate::prompts::{PromptLibrary, APPROVAL};
use crate::spotify::{dedup_by_uri, tracks_from_value};

pub const REJECTED_RESPONSE: &str =
    "No problem! Your playlist is still saved in memory if you change your mind.";
pub const CLARIFY_RESPONSE: &str = "Before I create the playlist on your Spotify, can you confirm \
     you want me to proceed? Just say 'yes' or 'no'.";

const DEFAULT_ACTION: &str = "create a playlist on Spotify";

/// 出现即拒绝，优先于肯定词
const REFUSAL: &[&[&str]] = &[
    &["don't"],
    &["dont"],
    &["cancel"],
    &["stop"],
    &["never", "mind"],
];
/// 仅在没有肯定词时算拒绝（"yes, no problem"）
const NEGATIVE: &[&[&str]] = &[&["no"], &["nope"], &["nah"]];
const AFFIRMATIVE: &[&[&str]] = &[
    &["yes"],
    &["yeah"],
    &["yep"],
    &["sure"],
    &["ok"],
    &["okay"],
    &["do", "it"],
    &["go", "ahead"],
];

/// 审批判定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approve,
    Reject,
    Other,
}

impl ApprovalDecision {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "approve" => Some(Self::Approve),
            "reject" => Some(Self::Reject),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Verdict {
    decision: String,
    #[serde(default)]
    reason: String,
}

fn tokens(reply: &str) -> Vec<String> {
    reply
        .to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '\u{2019}'))
        .filter(|t| !t.is_empty())
        .map(|t| t.replace('\u{2019}', "'"))
        .collect()
}

fn contains_phrase(tokens: &[String], phrases: &[&[&str]]) -> bool {
    phrases.iter().any(|phrase| {
        tokens
            .windows(phrase.len())
            .any(|w| w.iter().zip(phrase.iter()).all(|(t, p)| t == p))
    })
}

/// 关键词判定：明确拒绝 > 肯定 > 单独的否定词 > Other
pub fn keyword_decision(reply: &str) -> ApprovalDecision {
    let tokens = tokens(reply);
    if contains_phrase(&tokens, REFUSAL) {
        ApprovalDecision::Reject
    } else if contains_phrase(&tokens, AFFIRMATIVE) {
        ApprovalDecision::Approve
    } else if contains_phrase(&tokens, NEGATIVE) {
        ApprovalDecision::Reject
    } else {
        ApprovalDecision::Other
    }
}

/// 保存动作的 (描述, 提问)；曲目数为按 URI 去重后的数量
///
/// `tracks` 仍是尚未执行步骤的回引时不报数量，只说明曲目来自前面的结果。
pub fn describe_save(args: &Map<String, Value>) -> (String, String) {
    let name = args
        .get("playlist_name")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or("playlist");
    let tracks = args.get("tracks");
    let pending = tracks
        .and_then(Value::as_str)
        .and_then(back_reference)
        .is_some();
    if pending {
        return (
            format!("Create '{name}' on your Spotify from the earlier results"),
            format!(
                "I'm ready to create '{name}' on your Spotify account from the search results. \
                 Want me to go ahead?"
            ),
        );
    }
    let count = tracks
        .map(|t| dedup_by_uri(tracks_from_value(t)).len())
        .unwrap_or(0);
    (
        format!("Create '{name}' ({count} tracks) on your Spotify"),
        format!(
            "I'm ready to create '{name}' with {count} tracks on your Spotify account. \
             Want me to go ahead?"
        ),
    )
}

pub struct ApprovalHandler {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLibrary>,
}

impl ApprovalHandler {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<PromptLibrary>) -> Self {
        Self { llm, prompts }
    }

    /// 模型判定；任何失败都退回关键词判定
    pub async fn classify(&self, action: &str, reply: &str) -> ApprovalDecision {
        let prompt = match self
            .prompts
            .get_prompt(APPROVAL, &[("pending_action", action), ("user_reply", reply)])
        {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, "approval prompt unavailable, using keyword fallback");
                return keyword_decision(reply);
            }
        };

        let raw = match self.llm.complete(&[Message::user(prompt)]).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "approval classification failed, using keyword fallback"
                );
                return keyword_decision(reply);
            }
        };
        tracing::debug!(raw = %raw, "approval classifier output");

        match parse_json::<Verdict>(&raw)
            .ok()
            .and_then(|v| ApprovalDecision::parse(&v.decision).map(|d| (d, v.reason)))
        {
            Some((decision, reason)) => {
                tracing::info!(?decision, reason = %reason, "approval decision");
                decision
            }
            None => {
                tracing::warn!("unparseable approval verdict, using keyword fallback");
                keyword_decision(reply)
            }
        }
    }

    pub async fn run(&self, state: &mut RunState) {
        let action = state
            .pending_action
            .as_ref()
            .map(|p| p.description.clone())
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| DEFAULT_ACTION.to_string());

        match self.classify(&action, &state.query).await {
            ApprovalDecision::Approve => {
                tracing::info!(step = state.current_step, "user approved, resuming execution");
                state.user_approved = Some(true);
                state.awaiting_approval = false;
                state.pending_action = None;
                state.formatted_response.clear();
            }
            ApprovalDecision::Reject => {
                tracing::info!("user declined, execution cancelled");
                state.user_approved = Some(false);
                state.awaiting_approval = false;
                state.pending_action = None;
                state.execution_complete = true;
                state.formatted_response = REJECTED_RESPONSE.to_string();
            }
            ApprovalDecision::Other => {
                tracing::info!("approval reply unclear, asking again");
                state.awaiting_approval = true;
                state.formatted_response = CLARIFY_RESPONSE.to_string();
            }
        }
    }
}
