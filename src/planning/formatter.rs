//! Response Formatter：把各步结果汇总为一条面向用户的回复
//!
//! 前面的节点已给出最终消息（执行完成且 formatted_response 非空）时不做任何事。
//! 否则：有 error 用固定道歉模板；无结果用固定提示；其余先生成确定性摘要，再交给模型改写，
//! 改写失败时原样返回摘要。

use std::sync::Arc;

use serde_json::Value;

use crate::core::{RunState, StepResults};
use crate::llm::LlmClient;
use crate::memory::Message;
use crate::prompts::{PromptLibrary, FORMAT};

pub const EMPTY_RESULTS_RESPONSE: &str =
    "Hmm, I didn't find anything. Could you try rephrasing your request?";

const END_MARKER: &str = "<END_CONVERSATION>";

fn text<'a>(value: &'a Value, key: &str, default: &'a str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or(default)
}

fn summarize_one(result: &Value, track_limit: usize, lines: &mut Vec<String>) {
    if !result.is_object() {
        lines.push(result.to_string());
        return;
    }
    let failed = result.get("success").and_then(Value::as_bool) == Some(false);

    if let (true, Some(err)) = (failed, result.get("error")) {
        let message = err.as_str().map(str::to_string).unwrap_or_else(|| err.to_string());
        lines.push(format!("Error: {message}"));
    } else if let Some(tracks) = result.get("tracks").and_then(Value::as_array) {
        match result.get("playlist_name").and_then(Value::as_str) {
            Some(name) => lines.push(format!("Playlist '{name}': {} tracks", tracks.len())),
            None => lines.push(format!(
                "Search for '{}': Found {} tracks",
                text(result, "query", "search"),
                tracks.len()
            )),
        }
        for (i, track) in tracks.iter().take(track_limit).enumerate() {
            lines.push(format!(
                "  {}. {} - {} ({})",
                i + 1,
                text(track, "name", "Unknown"),
                text(track, "artist", "Unknown"),
                text(track, "album", "Unknown Album"),
            ));
        }
    } else if let Some(playlists) = result.get("playlists").and_then(Value::as_array) {
        lines.push(format!("Saved playlists: {} found", playlists.len()));
        for p in playlists {
            lines.push(format!(
                "  - {} ({} tracks)",
                text(p, "name", "Unnamed"),
                p.get("track_count").and_then(Value::as_u64).unwrap_or(0)
            ));
        }
    } else if let (Some(name), Some(count)) = (
        result.get("playlist_name").and_then(Value::as_str),
        result.get("track_count").and_then(Value::as_u64),
    ) {
        let to_spotify = result.get("spotify_url").is_some();
        let action = if to_spotify { "Saved to Spotify" } else { "Saved to memory" };
        lines.push(format!("{action}: '{name}' with {count} tracks"));
        if let Some(url) = result.get("spotify_url").and_then(Value::as_str) {
            lines.push(format!("  URL: {url}"));
        }
    } else if let Some(err) = result.get("error").and_then(Value::as_str) {
        lines.push(format!("Error: {err}"));
    } else if let Some(message) = result.get("message").and_then(Value::as_str) {
        lines.push(message.to_string());
    }
}

/// 确定性摘要，按结果记录顺序
pub fn summarize_results(results: &StepResults, track_limit: usize) -> String {
    let mut lines = Vec::new();
    for (_, result) in results.iter() {
        summarize_one(result, track_limit, &mut lines);
    }
    if lines.is_empty() {
        "No results to display.".to_string()
    } else {
        lines.join("\n")
    }
}

/// 去掉模型输出中的会话结束标记
pub fn clean_model_text(raw: &str) -> String {
    raw.replace(END_MARKER, "").trim().to_string()
}

pub struct Formatter {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLibrary>,
    track_limit: usize,
}

impl Formatter {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<PromptLibrary>, track_limit: usize) -> Self {
        Self {
            llm,
            prompts,
            track_limit,
        }
    }

    async fn rewrite(&self, query: &str, summary: &str) -> Option<String> {
        let prompt = self
            .prompts
            .get_prompt(FORMAT, &[("query", query), ("results", summary)])
            .map_err(|e| tracing::warn!(error = %e, "format prompt unavailable"))
            .ok()?;
        let raw = self
            .llm
            .complete(&[
                Message::system(prompt),
                Message::user("Format the results above into a friendly response."),
            ])
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "formatter model call failed, using plain summary")
            })
            .ok()?;
        Some(clean_model_text(&raw)).filter(|t| !t.is_empty())
    }

    pub async fn run(&self, state: &mut RunState) {
        if state.execution_complete && !state.formatted_response.is_empty() {
            return;
        }
        if let Some(error) = &state.error {
            tracing::warn!(error = %error, "formatting error response");
            state.formatted_response =
                format!("Oops! I ran into a problem: {error}. Want to try again?");
            return;
        }
        if state.step_results.is_empty() {
            state.formatted_response = EMPTY_RESULTS_RESPONSE.to_string();
            return;
        }

        let summary = summarize_results(&state.step_results, self.track_limit);
        state.formatted_response = match self.rewrite(&state.query, &summary).await {
            Some(text) => text,
            None => format!("Here's what I found:\n\n{summary}"),
        };
    }
}
