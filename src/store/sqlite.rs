//! SQLite 持久化
//!
//! 单表 `session_kv(keyspace, session_id, value, updated_at)`，主键 (keyspace, session_id)；
//! 值为 JSON 文本。连接放在 Mutex 里同步访问，每次操作都很短。

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use super::{Keyspace, SessionStore, StoreError};

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// 打开（必要时创建）数据库文件并建表
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS session_kv (
                keyspace TEXT NOT NULL,
                session_id TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (keyspace, session_id)
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("sqlite connection poisoned".into()))
    }
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn get(&self, keyspace: Keyspace, session_id: &str) -> Result<Option<Value>, StoreError> {
        let conn = self.lock()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT value FROM session_kv WHERE keyspace = ?1 AND session_id = ?2",
                params![keyspace.as_str(), session_id],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    async fn set(
        &self,
        keyspace: Keyspace,
        session_id: &str,
        value: Value,
    ) -> Result<(), StoreError> {
        let text = serde_json::to_string(&value)?;
        let now = chrono::Utc::now().to_rfc3339();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO session_kv (keyspace, session_id, value, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(keyspace, session_id)
              DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![keyspace.as_str(), session_id, text, now],
        )?;
        Ok(())
    }

    async fn delete(&self, keyspace: Keyspace, session_id: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM session_kv WHERE keyspace = ?1 AND session_id = ?2",
            params![keyspace.as_str(), session_id],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.get(Keyspace::Pending, "s1").await.unwrap().is_none());

        store.set(Keyspace::Pending, "s1", json!({"a": 1})).await.unwrap();
        store.set(Keyspace::Pending, "s1", json!({"a": 2})).await.unwrap();
        assert_eq!(store.get(Keyspace::Pending, "s1").await.unwrap(), Some(json!({"a": 2})));
        assert!(store.get(Keyspace::History, "s1").await.unwrap().is_none());

        store.delete(Keyspace::Pending, "s1").await.unwrap();
        assert!(store.get(Keyspace::Pending, "s1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("sporky.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store
                .set(Keyspace::History, "s1", json!([{"role": "user", "content": "hi"}]))
                .await
                .unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        let value = store.get(Keyspace::History, "s1").await.unwrap().unwrap();
        assert_eq!(value[0]["content"], json!("hi"));
    }
}
