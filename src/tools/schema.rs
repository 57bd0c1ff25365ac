//! 工具输入 JSON Schema（schemars 自动生成）
//!
//! 每个工具的输入结构同时用于参数反序列化与 prompt 中的 schema 展示，二者不会漂移。
//! `session_id` 由执行器注入，不暴露给 LLM。

use schemars::{schema_for, JsonSchema};
use serde::Deserialize;
use serde_json::Value;

/// search_spotify 输入
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SearchSpotifyInput {
    /// Search query: artist name, song title, genre, mood, or any combination
    pub query: String,
    /// Maximum number of tracks to return (1-50, default 10)
    #[serde(default)]
    pub limit: Option<usize>,
    /// Only return tracks released in or before this year
    #[serde(default)]
    pub max_year: Option<i32>,
}

/// commit_playlist_to_memory 输入
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CommitPlaylistInput {
    /// Name for the playlist
    pub playlist_name: String,
    /// List of track objects to save
    pub tracks: Vec<Value>,
    /// Optional playlist description
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    #[schemars(skip)]
    pub session_id: String,
}

/// read_playlist_from_memory 输入
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ReadPlaylistInput {
    /// Name of the saved playlist to retrieve
    #[serde(default)]
    pub playlist_name: Option<String>,
    /// If true, list all saved playlists instead of retrieving one
    #[serde(default)]
    pub list_all: bool,
    #[serde(default)]
    #[schemars(skip)]
    pub session_id: String,
}

/// save_playlist_to_spotify 输入
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SaveToSpotifyInput {
    /// Name for the Spotify playlist
    pub playlist_name: String,
    /// List of track objects with URIs
    pub tracks: Vec<Value>,
    /// Playlist description
    #[serde(default)]
    pub description: String,
}

/// 生成输入结构的 schema（JSON 值）
pub fn input_schema<T: JsonSchema>() -> Value {
    serde_json::to_value(schema_for!(T)).unwrap_or_else(|_| serde_json::json!({ "type": "object" }))
}
