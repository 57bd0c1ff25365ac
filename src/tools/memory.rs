//! 歌单记忆工具：commit_playlist_to_memory / read_playlist_from_memory
//!
//! 以 session_id 为作用域读写已保存歌单；不触碰用户的 Spotify 账号，无需审批。

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use crate::spotify::tracks_from_value;
use crate::store::{SavedPlaylist, SessionMemory};
use crate::tools::registry::{parse_args, Tool, ToolError};
use crate::tools::schema::{input_schema, CommitPlaylistInput, ReadPlaylistInput};

pub const COMMIT_TOOL: &str = "commit_playlist_to_memory";
pub const READ_TOOL: &str = "read_playlist_from_memory";

pub struct CommitPlaylistTool {
    memory: SessionMemory,
}

impl CommitPlaylistTool {
    pub fn new(memory: SessionMemory) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Tool for CommitPlaylistTool {
    fn name(&self) -> &str {
        COMMIT_TOOL
    }

    fn description(&self) -> &str {
        "Save a named playlist to memory for later, without touching the user's Spotify account."
    }

    fn parameters_schema(&self) -> Value {
        input_schema::<CommitPlaylistInput>()
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let input: CommitPlaylistInput = parse_args(args)?;
        if input.session_id.is_empty() {
            return Ok(json!({
                "success": false,
                "error": "Session ID is required to save playlist to memory"
            }));
        }

        let tracks = tracks_from_value(&Value::Array(input.tracks));
        let count = tracks.len();
        let playlist = SavedPlaylist {
            name: input.playlist_name.clone(),
            tracks,
            description: input.description,
            track_count: count,
            saved_at: Utc::now(),
        };
        if let Err(e) = self.memory.save_playlist(&input.session_id, playlist).await {
            return Ok(json!({ "success": false, "error": e.to_string() }));
        }

        Ok(json!({
            "success": true,
            "playlist_name": input.playlist_name,
            "track_count": count,
            "message": format!("Playlist '{}' saved with {} tracks", input.playlist_name, count),
        }))
    }
}

pub struct ReadPlaylistTool {
    memory: SessionMemory,
}

impl ReadPlaylistTool {
    pub fn new(memory: SessionMemory) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Tool for ReadPlaylistTool {
    fn name(&self) -> &str {
        READ_TOOL
    }

    fn description(&self) -> &str {
        "Read a previously saved playlist by name, or list all saved playlists with list_all=true."
    }

    fn parameters_schema(&self) -> Value {
        input_schema::<ReadPlaylistInput>()
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let input: ReadPlaylistInput = parse_args(args)?;
        if input.session_id.is_empty() {
            return Ok(json!({
                "success": false,
                "error": "Session ID is required to read playlists from memory"
            }));
        }

        if input.list_all {
            let playlists = match self.memory.playlists(&input.session_id).await {
                Ok(p) => p,
                Err(e) => return Ok(json!({ "success": false, "error": e.to_string() })),
            };
            let listed: Vec<Value> = playlists
                .iter()
                .map(|p| {
                    json!({
                        "name": p.name,
                        "track_count": p.track_count,
                        "description": p.description,
                    })
                })
                .collect();
            return Ok(json!({ "success": true, "count": listed.len(), "playlists": listed }));
        }

        let Some(name) = input.playlist_name.filter(|n| !n.trim().is_empty()) else {
            return Ok(json!({
                "success": false,
                "error": "Please provide a playlist name or set list_all=true"
            }));
        };
        match self.memory.playlist(&input.session_id, &name).await {
            Ok(Some(p)) => Ok(json!({
                "success": true,
                "playlist_name": p.name,
                "tracks": p.tracks,
                "description": p.description,
                "track_count": p.track_count,
            })),
            Ok(None) => Ok(json!({
                "success": false,
                "error": format!("Playlist '{name}' not found"),
            })),
            Err(e) => Ok(json!({ "success": false, "error": e.to_string() })),
        }
    }
}
