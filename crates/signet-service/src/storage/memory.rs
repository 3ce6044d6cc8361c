//! In-memory storage backend.
//!
//! Reference implementation of [`Storage`] used by tests and standalone
//! operation. A `BTreeMap` behind an async `RwLock` gives per-key atomicity
//! and ordered prefix scans for `list`.

use super::{Storage, StorageError};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<BTreeMap<String, Bytes>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, path: &str) -> Result<Option<Bytes>, StorageError> {
        let entries = self.entries.read().await;
        Ok(entries.get(path).cloned())
    }

    async fn put(&self, path: &str, value: Vec<u8>) -> Result<(), StorageError> {
        let mut entries = self.entries.write().await;
        entries.insert(path.to_string(), Bytes::from(value));
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.write().await;
        entries.remove(path);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let entries = self.entries.read().await;
        let names = entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .filter_map(|(key, _)| key.strip_prefix(prefix))
            .map(|name| name.to_string())
            .collect();
        Ok(names)
    }
}
