//! search_spotify：按关键词搜索曲目，可按发行年份过滤
//!
//! 有年份过滤时向曲库多要一倍结果再过滤截断；曲库故障以 `success=false` 报告，不抛出。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::spotify::{dedup_by_uri, filter_by_year, Catalog};
use crate::tools::registry::{parse_args, Tool, ToolError};
use crate::tools::schema::{input_schema, SearchSpotifyInput};

pub const SEARCH_TOOL: &str = "search_spotify";

const MAX_LIMIT: usize = 50;

pub struct SearchTool {
    catalog: Arc<dyn Catalog>,
    default_limit: usize,
}

impl SearchTool {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self {
            catalog,
            default_limit: 10,
        }
    }

    /// 未指定 limit 时使用的条数
    pub fn with_default_limit(mut self, limit: usize) -> Self {
        self.default_limit = limit.clamp(1, MAX_LIMIT);
        self
    }
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        SEARCH_TOOL
    }

    fn description(&self) -> &str {
        "Search Spotify for tracks by artist, song title, genre or mood. \
         Returns tracks with name, artist, album, uri and release_date."
    }

    fn parameters_schema(&self) -> Value {
        input_schema::<SearchSpotifyInput>()
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let input: SearchSpotifyInput = parse_args(args)?;
        let query = input.query.trim();
        if query.is_empty() {
            return Ok(json!({ "success": false, "error": "Search query is empty", "tracks": [] }));
        }
        let limit = input.limit.unwrap_or(self.default_limit).clamp(1, MAX_LIMIT);
        let fetch = match input.max_year {
            Some(_) => (limit * 2).min(MAX_LIMIT),
            None => limit,
        };

        let found = match self.catalog.search_tracks(query, fetch).await {
            Ok(tracks) => tracks,
            Err(e) => {
                tracing::warn!(query = %query, error = %e, "catalog search failed");
                return Ok(json!({ "success": false, "error": e.to_string(), "tracks": [] }));
            }
        };

        let filtered = match input.max_year {
            Some(year) => filter_by_year(found, year),
            None => found,
        };
        let mut tracks = dedup_by_uri(filtered);
        tracks.truncate(limit);

        Ok(json!({
            "success": true,
            "query": query,
            "count": tracks.len(),
            "tracks": tracks,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spotify::{CatalogError, InMemoryCatalog, Track};

    fn track(id: &str, name: &str, date: &str) -> Track {
        Track {
            name: name.into(),
            artist: "Band".into(),
            album: "Album".into(),
            uri: format!("spotify:track:{id}"),
            release_date: date.into(),
        }
    }

    #[tokio::test]
    async fn test_search_with_year_filter() {
        let catalog = Arc::new(InMemoryCatalog::new(vec![
            track("1", "rock one", "1979-01-01"),
            track("2", "rock two", "2005-01-01"),
            track("3", "rock three", "1988"),
            track("4", "rock four", "1999-12-31"),
        ]));
        let tool = SearchTool::new(catalog.clone());
        let out = tool
            .execute(json!({ "query": "rock", "limit": 2, "max_year": 1990 }))
            .await
            .unwrap();

        assert_eq!(out["success"], json!(true));
        assert_eq!(out["count"], json!(2));
        let names: Vec<&str> = out["tracks"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["rock one", "rock three"]);
        assert_eq!(catalog.searches(), vec!["rock"]);
    }

    #[tokio::test]
    async fn test_catalog_fault_is_reported() {
        let catalog = Arc::new(
            InMemoryCatalog::new(vec![])
                .failing_search(CatalogError::Request("connection refused".into())),
        );
        let out = SearchTool::new(catalog).execute(json!({ "query": "jazz" })).await.unwrap();
        assert_eq!(out["success"], json!(false));
        assert!(out["error"].as_str().unwrap().contains("connection refused"));
        assert_eq!(out["tracks"], json!([]));
    }

    #[tokio::test]
    async fn test_default_limit() {
        let tool = SearchTool::new(Arc::new(InMemoryCatalog::demo())).with_default_limit(3);
        let out = tool.execute(json!({ "query": "zzz-no-match" })).await.unwrap();
        assert_eq!(out["count"], json!(3));
    }

    #[tokio::test]
    async fn test_missing_query_is_invalid() {
        let tool = SearchTool::new(Arc::new(InMemoryCatalog::demo()));
        let err = tool.execute(json!({ "limit": 3 })).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArgs(_)));
    }
}
