//! 会话持久化
//!
//! 三个相互独立的键空间（对话历史 / 待审批状态 / 已保存歌单），均以 session_id 为键、JSON 为值。
//! SessionStore 只提供 get / set / delete；SessionMemory 在其上提供带类型的读写。
//!
//! 读-改-写（取历史、计算、写回）本身不加锁，同一会话的并发请求由 agent 层的会话锁串行化。

pub mod memory;
pub mod sqlite;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::StoreSection;
use crate::memory::Message;
use crate::spotify::Track;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store backend unavailable: {0}")]
    Unavailable(String),
}

/// 键空间
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyspace {
    History,
    Pending,
    Playlists,
}

impl Keyspace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Keyspace::History => "chat_history",
            Keyspace::Pending => "pending_approvals",
            Keyspace::Playlists => "saved_playlists",
        }
    }
}

/// 持久化后端
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, keyspace: Keyspace, session_id: &str) -> Result<Option<Value>, StoreError>;

    async fn set(
        &self,
        keyspace: Keyspace,
        session_id: &str,
        value: Value,
    ) -> Result<(), StoreError>;

    async fn delete(&self, keyspace: Keyspace, session_id: &str) -> Result<(), StoreError>;
}

/// 记忆中保存的命名歌单
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedPlaylist {
    pub name: String,
    pub tracks: Vec<Track>,
    #[serde(default)]
    pub description: String,
    pub track_count: usize,
    pub saved_at: DateTime<Utc>,
}

/// 带类型的会话记忆访问
#[derive(Clone)]
pub struct SessionMemory {
    store: Arc<dyn SessionStore>,
}

impl SessionMemory {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    pub async fn history(&self, session_id: &str) -> Result<Vec<Message>, StoreError> {
        match self.store.get(Keyspace::History, session_id).await? {
            Some(v) => Ok(serde_json::from_value(v)?),
            None => Ok(Vec::new()),
        }
    }

    pub async fn set_history(
        &self,
        session_id: &str,
        history: &[Message],
    ) -> Result<(), StoreError> {
        self.store
            .set(Keyspace::History, session_id, serde_json::to_value(history)?)
            .await
    }

    pub async fn pending_state(&self, session_id: &str) -> Result<Option<Value>, StoreError> {
        self.store.get(Keyspace::Pending, session_id).await
    }

    pub async fn set_pending_state(
        &self,
        session_id: &str,
        state: Value,
    ) -> Result<(), StoreError> {
        self.store.set(Keyspace::Pending, session_id, state).await
    }

    pub async fn clear_pending_state(&self, session_id: &str) -> Result<(), StoreError> {
        self.store.delete(Keyspace::Pending, session_id).await
    }

    async fn playlist_map(
        &self,
        session_id: &str,
    ) -> Result<BTreeMap<String, SavedPlaylist>, StoreError> {
        match self.store.get(Keyspace::Playlists, session_id).await? {
            Some(v) => Ok(serde_json::from_value(v)?),
            None => Ok(BTreeMap::new()),
        }
    }

    /// 会话下全部已保存歌单（按名称排序）
    pub async fn playlists(&self, session_id: &str) -> Result<Vec<SavedPlaylist>, StoreError> {
        Ok(self.playlist_map(session_id).await?.into_values().collect())
    }

    pub async fn playlist(
        &self,
        session_id: &str,
        name: &str,
    ) -> Result<Option<SavedPlaylist>, StoreError> {
        Ok(self.playlist_map(session_id).await?.remove(name))
    }

    /// 保存（同名覆盖）
    pub async fn save_playlist(
        &self,
        session_id: &str,
        playlist: SavedPlaylist,
    ) -> Result<(), StoreError> {
        let mut map = self.playlist_map(session_id).await?;
        map.insert(playlist.name.clone(), playlist);
        self.store
            .set(Keyspace::Playlists, session_id, serde_json::to_value(map)?)
            .await
    }
}

/// 按 [store].backend 创建持久化后端
pub fn create_store(cfg: &StoreSection) -> Result<Arc<dyn SessionStore>, StoreError> {
    match cfg.backend.to_lowercase().as_str() {
        "sqlite" => {
            tracing::info!("Using SQLite session store: {:?}", cfg.sqlite_path);
            Ok(Arc::new(SqliteStore::open(&cfg.sqlite_path)?))
        }
        "memory" => {
            tracing::info!("Using in-memory session store");
            Ok(Arc::new(MemoryStore::new()))
        }
        other => Err(StoreError::Unavailable(format!("unknown store backend '{other}'"))),
    }
}
