//! save_playlist_to_spotify：在用户 Spotify 账号下创建歌单
//!
//! 会修改用户账号，`requires_approval` 为 true；执行器在用户明确同意前不会调用它。
//! 曲目按 URI 去重后按原顺序加入。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::spotify::{dedup_by_uri, tracks_from_value, Catalog};
use crate::tools::registry::{parse_args, Tool, ToolError};
use crate::tools::schema::{input_schema, SaveToSpotifyInput};

pub const SAVE_TOOL: &str = "save_playlist_to_spotify";

pub struct SaveToSpotifyTool {
    catalog: Arc<dyn Catalog>,
}

impl SaveToSpotifyTool {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl Tool for SaveToSpotifyTool {
    fn name(&self) -> &str {
        SAVE_TOOL
    }

    fn description(&self) -> &str {
        "Create a playlist in the user's Spotify account. \
         Changes the account, so it always needs the user's approval."
    }

    fn parameters_schema(&self) -> Value {
        input_schema::<SaveToSpotifyInput>()
    }

    fn requires_approval(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let input: SaveToSpotifyInput = parse_args(args)?;
        let tracks = dedup_by_uri(tracks_from_value(&Value::Array(input.tracks)));
        if tracks.is_empty() {
            return Ok(json!({
                "success": false,
                "error": "No tracks with a Spotify URI to add to the playlist"
            }));
        }
        let uris: Vec<String> = tracks.into_iter().map(|t| t.uri).collect();

        match self
            .catalog
            .create_playlist(&input.playlist_name, &input.description, &uris)
            .await
        {
            Ok(created) => {
                tracing::info!(
                    playlist = %created.name,
                    id = %created.id,
                    tracks = created.track_count,
                    "playlist created"
                );
                Ok(json!({
                    "success": true,
                    "playlist_name": input.playlist_name,
                    "track_count": created.track_count,
                    "spotify_url": created.url,
                    "message": format!("Playlist '{}' created on Spotify!", input.playlist_name),
                }))
            }
            Err(e) => Ok(json!({ "success": false, "error": e.to_string() })),
        }
    }
}
