//! 曲库抽象：搜索曲目、在用户账号下创建歌单
//!
//! 工具只依赖 Catalog trait；真实实现为 SpotifyClient，测试与离线模式用 InMemoryCatalog。

use async_trait::async_trait;
use thiserror::Error;

use crate::spotify::Track;

#[derive(Error, Debug, Clone)]
pub enum CatalogError {
    #[error("Catalog request failed: {0}")]
    Request(String),

    #[error("Catalog HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Catalog is not authorized: {0}")]
    Unauthorized(String),

    #[error("Unexpected catalog response: {0}")]
    Decode(String),
}

/// 新建歌单的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedPlaylist {
    pub id: String,
    pub name: String,
    pub url: Option<String>,
    pub track_count: usize,
}

#[async_trait]
pub trait Catalog: Send + Sync {
    /// 关键词搜索曲目，最多返回 `limit` 条
    async fn search_tracks(&self, query: &str, limit: usize) -> Result<Vec<Track>, CatalogError>;

    /// 在当前用户账号下创建歌单并加入曲目（按给定顺序，调用方负责去重）
    async fn create_playlist(
        &self,
        name: &str,
        description: &str,
        uris: &[String],
    ) -> Result<CreatedPlaylist, CatalogError>;
}
