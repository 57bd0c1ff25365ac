//! 内存持久化：进程内 HashMap，重启即丢失

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{Keyspace, SessionStore, StoreError};

#[derive(Default)]
pub struct MemoryStore {
    data: RwLock<HashMap<(Keyspace, String), Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn get(&self, keyspace: Keyspace, session_id: &str) -> Result<Option<Value>, StoreError> {
        Ok(self
            .data
            .read()
            .await
            .get(&(keyspace, session_id.to_string()))
            .cloned())
    }

    async fn set(
        &self,
        keyspace: Keyspace,
        session_id: &str,
        value: Value,
    ) -> Result<(), StoreError> {
        self.data
            .write()
            .await
            .insert((keyspace, session_id.to_string()), value);
        Ok(())
    }

    async fn delete(&self, keyspace: Keyspace, session_id: &str) -> Result<(), StoreError> {
        self.data
            .write()
            .await
            .remove(&(keyspace, session_id.to_string()));
        Ok(())
    }
}
